//! Hardware socket lifecycle management
//!
//! The chip owns the TCP state machine; this module only issues commands and
//! reads the status the hardware reports back. Every command follows the
//! same completion protocol: write the command code to Sn_CR, then poll the
//! register until the chip clears it or the timeout elapses.

use crate::error::{Error, Result};
use crate::registers::{
    rx_buf_addr, socket_reg, tx_buf_addr, Registers, BUF_MASK, BUF_SIZE, MAX_SOCKETS, SN_CR,
    SN_DIPR0, SN_DPORT0, SN_MR, SN_PORT0, SN_RX_RD0, SN_RX_RSR0, SN_SR, SN_TX_FSR0, SN_TX_WR0,
};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Default per-socket buffer bookkeeping (KiB)
pub const DEFAULT_BUF_KB: u8 = 2;

/// Socket protocol mode (written to Sn_MR)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketMode {
    Closed = 0x00,
    Tcp = 0x01,
    Udp = 0x02,
    IpRaw = 0x03,
    MacRaw = 0x04,
    Pppoe = 0x05,
}

/// Socket command codes (written to Sn_CR)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketCommand {
    Open = 0x01,
    Listen = 0x02,
    Connect = 0x04,
    Disconnect = 0x08,
    Close = 0x10,
    Send = 0x20,
    SendMac = 0x21,
    SendKeepalive = 0x22,
    Receive = 0x40,
}

/// Hardware-reported socket status (read from Sn_SR)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketStatus {
    Closed = 0x00,
    Init = 0x13,
    Listen = 0x14,
    SynSent = 0x15,
    SynRecv = 0x16,
    Established = 0x17,
    FinWait = 0x18,
    Closing = 0x1A,
    TimeWait = 0x1B,
    CloseWait = 0x1C,
    LastAck = 0x1D,
    Udp = 0x22,
    IpRaw = 0x32,
    MacRaw = 0x42,
    Pppoe = 0x5F,
}

impl SocketStatus {
    /// Decode a raw status byte; unknown values are reported as `None`
    pub fn from_raw(raw: u8) -> Option<SocketStatus> {
        use SocketStatus::*;
        match raw {
            0x00 => Some(Closed),
            0x13 => Some(Init),
            0x14 => Some(Listen),
            0x15 => Some(SynSent),
            0x16 => Some(SynRecv),
            0x17 => Some(Established),
            0x18 => Some(FinWait),
            0x1A => Some(Closing),
            0x1B => Some(TimeWait),
            0x1C => Some(CloseWait),
            0x1D => Some(LastAck),
            0x22 => Some(Udp),
            0x32 => Some(IpRaw),
            0x42 => Some(MacRaw),
            0x5F => Some(Pppoe),
            _ => None,
        }
    }
}

/// Bookkeeping for one hardware socket
///
/// `id` is the descriptor's index in the manager's array and never changes.
/// `status` is only ever written after a register read.
#[derive(Debug, Clone)]
pub struct SocketDescriptor {
    pub id: usize,
    pub mode: SocketMode,
    pub status: SocketStatus,
    pub local_port: u16,
    pub tx_buffer_kb: u8,
    pub rx_buffer_kb: u8,
    pub last_activity: Instant,
    pub error_count: u32,
}

impl SocketDescriptor {
    fn new(id: usize) -> Self {
        SocketDescriptor {
            id,
            mode: SocketMode::Closed,
            status: SocketStatus::Closed,
            local_port: 0,
            tx_buffer_kb: DEFAULT_BUF_KB,
            rx_buffer_kb: DEFAULT_BUF_KB,
            last_activity: Instant::now(),
            error_count: 0,
        }
    }

    fn reset(&mut self) {
        self.mode = SocketMode::Closed;
        self.status = SocketStatus::Closed;
        self.local_port = 0;
        self.tx_buffer_kb = DEFAULT_BUF_KB;
        self.rx_buffer_kb = DEFAULT_BUF_KB;
        self.last_activity = Instant::now();
        self.error_count = 0;
    }
}

/// Command-completion timing
#[derive(Debug, Clone, Copy)]
pub struct CommandTiming {
    /// Deadline for the command register to clear
    pub timeout: Duration,
    /// Sleep between completion polls
    pub poll_interval: Duration,
}

impl Default for CommandTiming {
    fn default() -> Self {
        CommandTiming {
            timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Manager for the chip's fixed array of hardware sockets
///
/// Socket-level operations return booleans or optional values, never panic;
/// failures increment the affected descriptor's error count and are logged.
/// No second command is issued to a socket while a completion poll for the
/// first is outstanding (all operations are synchronous on one caller).
pub struct SocketManager {
    regs: Registers,
    sockets: [SocketDescriptor; MAX_SOCKETS],
    timing: CommandTiming,
}

impl SocketManager {
    pub fn new(regs: Registers, timing: CommandTiming) -> Self {
        SocketManager {
            regs,
            sockets: std::array::from_fn(SocketDescriptor::new),
            timing,
        }
    }

    /// Access to the underlying register gate (diagnostics, link monitor)
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Descriptor snapshot for a socket
    pub fn descriptor(&self, id: usize) -> Option<&SocketDescriptor> {
        self.sockets.get(id)
    }

    /// All descriptors, in id order
    pub fn descriptors(&self) -> &[SocketDescriptor] {
        &self.sockets
    }

    fn check_id(&self, id: usize) -> Result<()> {
        if id < MAX_SOCKETS {
            Ok(())
        } else {
            Err(Error::InvalidSocketId(id))
        }
    }

    fn bump_error(&mut self, id: usize) {
        if let Some(descriptor) = self.sockets.get_mut(id) {
            descriptor.error_count += 1;
        }
    }

    /// Write a command code and poll Sn_CR until the chip consumes it
    ///
    /// Returns `CommandTimeout` if the register has not cleared when the
    /// deadline passes. Never retries.
    fn issue_command(&mut self, id: usize, command: SocketCommand) -> Result<()> {
        self.check_id(id)?;
        let cr = socket_reg(id, SN_CR);
        self.regs.write_byte(cr, command as u8)?;

        let deadline = Instant::now() + self.timing.timeout;
        loop {
            if self.regs.read_byte(cr)? == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "Socket {}: command {:#04x} not consumed within {:?}",
                    id,
                    command as u8,
                    self.timing.timeout
                );
                return Err(Error::CommandTimeout { socket: id });
            }
            std::thread::sleep(self.timing.poll_interval);
        }
    }

    /// Read Sn_SR and refresh the cached descriptor status
    ///
    /// This is the only path that updates the cached status; callers that
    /// need a fresh value must come through here instead of caching their
    /// own copy.
    pub fn get_status(&mut self, id: usize) -> SocketStatus {
        if self.check_id(id).is_err() {
            log::warn!("get_status: invalid socket id {}", id);
            return SocketStatus::Closed;
        }
        match self.regs.read_byte(socket_reg(id, SN_SR)) {
            Ok(raw) => {
                let status = match SocketStatus::from_raw(raw) {
                    Some(status) => status,
                    None => {
                        log::warn!("Socket {}: unknown status byte {:#04x}", id, raw);
                        self.sockets[id].status
                    }
                };
                self.sockets[id].status = status;
                self.sockets[id].last_activity = Instant::now();
                status
            }
            Err(e) => {
                log::warn!("Socket {}: status read failed: {}", id, e);
                self.bump_error(id);
                self.sockets[id].status
            }
        }
    }

    /// Whether the socket is usable for I/O in its configured mode
    pub fn is_ready(&mut self, id: usize) -> bool {
        if self.check_id(id).is_err() {
            return false;
        }
        let mode = self.sockets[id].mode;
        let status = self.get_status(id);
        match mode {
            SocketMode::Tcp => {
                matches!(status, SocketStatus::Established | SocketStatus::CloseWait)
            }
            SocketMode::Udp => status == SocketStatus::Udp,
            SocketMode::IpRaw => status == SocketStatus::IpRaw,
            _ => false,
        }
    }

    /// Open a socket in the given mode on a local port
    ///
    /// Closes the socket first as defensive cleanup (a close timeout is
    /// ignored), then writes mode and port, issues Open and waits for
    /// completion. Success means the resulting status is not Closed; on
    /// failure the descriptor mode is reset to Closed.
    pub fn init_socket(&mut self, id: usize, mode: SocketMode, port: u16) -> bool {
        match self.try_init_socket(id, mode, port) {
            Ok(ready) => ready,
            Err(e) => {
                log::warn!("Socket {}: init failed: {}", id, e);
                self.bump_error(id);
                if let Some(descriptor) = self.sockets.get_mut(id) {
                    descriptor.mode = SocketMode::Closed;
                }
                false
            }
        }
    }

    fn try_init_socket(&mut self, id: usize, mode: SocketMode, port: u16) -> Result<bool> {
        self.check_id(id)?;

        if let Err(e) = self.issue_command(id, SocketCommand::Close) {
            log::debug!("Socket {}: pre-init close: {}", id, e);
        }

        self.regs.write_byte(socket_reg(id, SN_MR), mode as u8)?;
        // 16-bit port big-endian across the two source-port byte registers
        self.regs.write_u16(socket_reg(id, SN_PORT0), port)?;
        self.issue_command(id, SocketCommand::Open)?;

        let status = self.get_status(id);
        let descriptor = &mut self.sockets[id];
        descriptor.mode = mode;
        descriptor.local_port = port;
        descriptor.last_activity = Instant::now();
        descriptor.error_count = 0;

        if status == SocketStatus::Closed {
            descriptor.mode = SocketMode::Closed;
            log::warn!("Socket {}: still closed after Open", id);
            Ok(false)
        } else {
            log::debug!("Socket {}: opened {:?} on port {}", id, mode, port);
            Ok(true)
        }
    }

    /// Put an opened TCP socket into the listening state
    pub fn listen(&mut self, id: usize) -> bool {
        if self.check_id(id).is_err() {
            return false;
        }
        let status = self.get_status(id);
        if status != SocketStatus::Init {
            let e = Error::UnsupportedModeTransition {
                expected: SocketStatus::Init as u8,
                actual: status as u8,
            };
            log::warn!("Socket {}: cannot listen: {}", id, e);
            self.bump_error(id);
            return false;
        }
        match self.issue_command(id, SocketCommand::Listen) {
            Ok(()) => self.get_status(id) == SocketStatus::Listen,
            Err(e) => {
                log::warn!("Socket {}: listen failed: {}", id, e);
                self.bump_error(id);
                false
            }
        }
    }

    /// Actively connect an opened TCP socket to a remote endpoint
    pub fn connect(&mut self, id: usize, ip: Ipv4Addr, port: u16) -> bool {
        match self.try_connect(id, ip, port) {
            Ok(ok) => ok,
            Err(e) => {
                log::warn!("Socket {}: connect failed: {}", id, e);
                self.bump_error(id);
                false
            }
        }
    }

    fn try_connect(&mut self, id: usize, ip: Ipv4Addr, port: u16) -> Result<bool> {
        self.check_id(id)?;
        self.regs.write_block(socket_reg(id, SN_DIPR0), &ip.octets())?;
        self.regs.write_u16(socket_reg(id, SN_DPORT0), port)?;
        self.issue_command(id, SocketCommand::Connect)?;
        Ok(self.get_status(id) != SocketStatus::Closed)
    }

    /// Issue a graceful TCP disconnect
    pub fn disconnect(&mut self, id: usize) -> bool {
        match self.issue_command(id, SocketCommand::Disconnect) {
            Ok(()) => {
                self.get_status(id);
                true
            }
            Err(e) => {
                log::warn!("Socket {}: disconnect failed: {}", id, e);
                self.bump_error(id);
                false
            }
        }
    }

    /// Close a socket and reset its descriptor to defaults
    ///
    /// The descriptor is reset regardless of the command outcome; the return
    /// value reports whether the chip acknowledged the close in time.
    pub fn close(&mut self, id: usize) -> bool {
        if self.check_id(id).is_err() {
            return false;
        }
        let ok = match self.issue_command(id, SocketCommand::Close) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Socket {}: close failed: {}", id, e);
                false
            }
        };
        self.sockets[id].reset();
        ok
    }

    /// Send a TCP keepalive probe
    pub fn send_keepalive(&mut self, id: usize) -> bool {
        match self.issue_command(id, SocketCommand::SendKeepalive) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Socket {}: keepalive failed: {}", id, e);
                self.bump_error(id);
                false
            }
        }
    }

    /// Close every socket
    pub fn close_all(&mut self) {
        for id in 0..MAX_SOCKETS {
            self.close(id);
        }
    }

    /// Close every socket and re-apply default buffer-size bookkeeping
    ///
    /// Buffer sizing is tracked in software state only; the chip's buffer
    /// memory is never reallocated while sockets may be in use.
    pub fn reset_all(&mut self) {
        self.close_all();
        for descriptor in self.sockets.iter_mut() {
            descriptor.tx_buffer_kb = DEFAULT_BUF_KB;
            descriptor.rx_buffer_kb = DEFAULT_BUF_KB;
        }
        log::info!("All sockets reset");
    }

    /// Remote endpoint recorded in a socket's destination registers
    pub fn remote_endpoint(&mut self, id: usize) -> Option<(Ipv4Addr, u16)> {
        self.check_id(id).ok()?;
        let mut octets = [0u8; 4];
        self.regs
            .read_block(socket_reg(id, SN_DIPR0), &mut octets)
            .ok()?;
        let port = self.regs.read_u16(socket_reg(id, SN_DPORT0)).ok()?;
        Some((Ipv4Addr::from(octets), port))
    }

    /// Queue bytes on a socket's transmit buffer and issue Send
    ///
    /// Accepts at most the free space the chip reports; the accepted count
    /// is returned so the caller can see a partial write. `None` means a
    /// bus or command failure.
    pub fn send(&mut self, id: usize, data: &[u8]) -> Option<usize> {
        match self.try_send(id, data) {
            Ok(accepted) => Some(accepted),
            Err(e) => {
                log::warn!("Socket {}: send failed: {}", id, e);
                self.bump_error(id);
                None
            }
        }
    }

    fn try_send(&mut self, id: usize, data: &[u8]) -> Result<usize> {
        self.check_id(id)?;
        if data.is_empty() {
            return Ok(0);
        }

        let free = self.regs.read_u16_stable(socket_reg(id, SN_TX_FSR0))?;
        let accepted = data.len().min(free as usize);
        if accepted == 0 {
            return Ok(0);
        }

        let cursor = self.regs.read_u16(socket_reg(id, SN_TX_WR0))?;
        // the cursor wraps inside the 2 KiB window; split the write in two
        // when it crosses the wrap point
        let until_wrap = (BUF_SIZE - (cursor & BUF_MASK)) as usize;
        let first = accepted.min(until_wrap);
        self.regs.write_block(tx_buf_addr(id, cursor), &data[..first])?;
        if accepted > first {
            self.regs.write_block(
                tx_buf_addr(id, cursor.wrapping_add(first as u16)),
                &data[first..accepted],
            )?;
        }
        self.regs.write_u16(
            socket_reg(id, SN_TX_WR0),
            cursor.wrapping_add(accepted as u16),
        )?;
        self.issue_command(id, SocketCommand::Send)?;

        self.sockets[id].last_activity = Instant::now();
        Ok(accepted)
    }

    /// Drain up to `max_len` pending bytes from a socket's receive buffer
    ///
    /// Returns an empty vector when nothing is pending, `None` on a bus or
    /// command failure. Consumption is acknowledged to the chip with the
    /// Receive command.
    pub fn receive(&mut self, id: usize, max_len: usize) -> Option<Vec<u8>> {
        match self.try_receive(id, max_len) {
            Ok(data) => Some(data),
            Err(e) => {
                log::warn!("Socket {}: receive failed: {}", id, e);
                self.bump_error(id);
                None
            }
        }
    }

    fn try_receive(&mut self, id: usize, max_len: usize) -> Result<Vec<u8>> {
        self.check_id(id)?;
        let pending = self.regs.read_u16_stable(socket_reg(id, SN_RX_RSR0))?;
        let count = (pending as usize).min(max_len);
        if count == 0 {
            return Ok(Vec::new());
        }

        let cursor = self.regs.read_u16(socket_reg(id, SN_RX_RD0))?;
        let mut data = vec![0u8; count];
        let until_wrap = (BUF_SIZE - (cursor & BUF_MASK)) as usize;
        let first = count.min(until_wrap);
        self.regs.read_block(rx_buf_addr(id, cursor), &mut data[..first])?;
        if count > first {
            self.regs.read_block(
                rx_buf_addr(id, cursor.wrapping_add(first as u16)),
                &mut data[first..],
            )?;
        }
        self.regs.write_u16(
            socket_reg(id, SN_RX_RD0),
            cursor.wrapping_add(count as u16),
        )?;
        self.issue_command(id, SocketCommand::Receive)?;

        self.sockets[id].last_activity = Instant::now();
        Ok(data)
    }
}
