//! Mock NIC for testing
//!
//! Simulates the chip's register space behind the [`SpiBus`] trait: socket
//! commands written to Sn_CR are consumed (optionally after a configurable
//! number of polls), status registers follow the TCP lifecycle the chip
//! reports, and the TX/RX buffer windows behave as real cursor-addressed
//! ring memory. Tests hold a cloned handle to inspect and steer the
//! simulated chip from outside.

use super::{SpiBus, CONTROL_READ, CONTROL_WRITE, HEADER_LEN};
use crate::error::{Error, Result};
use crate::registers::{
    rx_buf_addr, socket_reg, tx_buf_addr, BUF_SIZE, CHIP_VERSION, MAX_SOCKETS, PHYSR, PHYSR_LINK,
    SN_CR, SN_DIPR0, SN_DPORT0, SN_MR, SN_RX_RD0, SN_RX_RSR0, SN_RX_WR0, SN_SR, SN_TX_FSR0,
    SN_TX_RD0, SN_TX_WR0, VERSIONR,
};
use crate::socket::{SocketCommand, SocketStatus};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// Simulated NIC register space for unit testing
#[derive(Clone)]
pub struct MockNic {
    inner: Arc<Mutex<NicState>>,
}

struct NicState {
    mem: Vec<u8>,
    /// Remaining polls before a pending command register reads back zero
    cmd_polls: [u8; MAX_SOCKETS],
    /// Polls a freshly written command stays visible for
    command_delay: u8,
    /// Never clear command registers (forces CommandTimeout in callers)
    hang_commands: bool,
    /// Pin Sn_TX_FSR instead of restoring it after Send
    forced_tx_free: [bool; MAX_SOCKETS],
    sent: [Vec<Vec<u8>>; MAX_SOCKETS],
    send_count: [usize; MAX_SOCKETS],
}

impl NicState {
    fn new() -> Self {
        let mut mem = vec![0u8; 0x1_0000];
        mem[VERSIONR as usize] = CHIP_VERSION;
        mem[PHYSR as usize] = PHYSR_LINK;
        let mut state = NicState {
            mem,
            cmd_polls: [0; MAX_SOCKETS],
            command_delay: 0,
            hang_commands: false,
            forced_tx_free: [false; MAX_SOCKETS],
            sent: Default::default(),
            send_count: [0; MAX_SOCKETS],
        };
        for socket in 0..MAX_SOCKETS {
            state.put_u16(socket_reg(socket, SN_TX_FSR0), BUF_SIZE);
        }
        state
    }

    fn get_u16(&self, addr: u16) -> u16 {
        u16::from_be_bytes([self.mem[addr as usize], self.mem[addr as usize + 1]])
    }

    fn put_u16(&mut self, addr: u16, value: u16) {
        let bytes = value.to_be_bytes();
        self.mem[addr as usize] = bytes[0];
        self.mem[addr as usize + 1] = bytes[1];
    }

    /// Map an address to the socket whose command register it is
    fn command_register_socket(addr: u16) -> Option<usize> {
        use crate::registers::{SOCKET_BASE, SOCKET_STRIDE};
        if addr < SOCKET_BASE {
            return None;
        }
        let rel = addr - SOCKET_BASE;
        let index = (rel / SOCKET_STRIDE) as usize;
        if index < MAX_SOCKETS && rel % SOCKET_STRIDE == SN_CR {
            Some(index)
        } else {
            None
        }
    }

    fn read(&mut self, addr: u16) -> u8 {
        if let Some(socket) = Self::command_register_socket(addr) {
            let pending = self.mem[addr as usize];
            if pending != 0 && !self.hang_commands {
                if self.cmd_polls[socket] == 0 {
                    self.mem[addr as usize] = 0;
                } else {
                    self.cmd_polls[socket] -= 1;
                }
            }
        }
        self.mem[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        match Self::command_register_socket(addr) {
            Some(socket) => self.command(socket, value),
            None => self.mem[addr as usize] = value,
        }
    }

    /// Apply the semantic effect of a socket command
    fn command(&mut self, socket: usize, code: u8) {
        self.mem[socket_reg(socket, SN_CR) as usize] = code;
        self.cmd_polls[socket] = self.command_delay;

        let status_addr = socket_reg(socket, SN_SR) as usize;
        match code {
            c if c == SocketCommand::Open as u8 => {
                let mode = self.mem[socket_reg(socket, SN_MR) as usize] & 0x0F;
                self.mem[status_addr] = match mode {
                    0x01 => SocketStatus::Init as u8,
                    0x02 => SocketStatus::Udp as u8,
                    0x03 => SocketStatus::IpRaw as u8,
                    0x04 => SocketStatus::MacRaw as u8,
                    0x05 => SocketStatus::Pppoe as u8,
                    _ => SocketStatus::Closed as u8,
                };
                self.put_u16(socket_reg(socket, SN_TX_RD0), 0);
                self.put_u16(socket_reg(socket, SN_TX_WR0), 0);
                self.put_u16(socket_reg(socket, SN_RX_RD0), 0);
                self.put_u16(socket_reg(socket, SN_RX_WR0), 0);
                self.put_u16(socket_reg(socket, SN_RX_RSR0), 0);
                if !self.forced_tx_free[socket] {
                    self.put_u16(socket_reg(socket, SN_TX_FSR0), BUF_SIZE);
                }
            }
            c if c == SocketCommand::Listen as u8 => {
                if self.mem[status_addr] == SocketStatus::Init as u8 {
                    self.mem[status_addr] = SocketStatus::Listen as u8;
                }
            }
            c if c == SocketCommand::Connect as u8 => {
                self.mem[status_addr] = SocketStatus::Established as u8;
            }
            c if c == SocketCommand::Disconnect as u8 || c == SocketCommand::Close as u8 => {
                self.mem[status_addr] = SocketStatus::Closed as u8;
            }
            c if c == SocketCommand::Send as u8 => {
                let rd = self.get_u16(socket_reg(socket, SN_TX_RD0));
                let wr = self.get_u16(socket_reg(socket, SN_TX_WR0));
                let len = wr.wrapping_sub(rd);
                let mut payload = Vec::with_capacity(len as usize);
                for i in 0..len {
                    payload.push(self.mem[tx_buf_addr(socket, rd.wrapping_add(i)) as usize]);
                }
                self.sent[socket].push(payload);
                self.send_count[socket] += 1;
                self.put_u16(socket_reg(socket, SN_TX_RD0), wr);
                if !self.forced_tx_free[socket] {
                    self.put_u16(socket_reg(socket, SN_TX_FSR0), BUF_SIZE);
                }
            }
            c if c == SocketCommand::Receive as u8 => {
                let rd = self.get_u16(socket_reg(socket, SN_RX_RD0));
                let wr = self.get_u16(socket_reg(socket, SN_RX_WR0));
                self.put_u16(socket_reg(socket, SN_RX_RSR0), wr.wrapping_sub(rd));
            }
            _ => {}
        }
    }
}

impl MockNic {
    /// Create a fresh simulated chip (link up, version register populated)
    pub fn new() -> Self {
        MockNic {
            inner: Arc::new(Mutex::new(NicState::new())),
        }
    }

    /// Number of polls a command register stays pending before clearing
    pub fn set_command_delay(&self, polls: u8) {
        self.inner.lock().unwrap().command_delay = polls;
    }

    /// Make command registers never clear
    pub fn set_hang_commands(&self, hang: bool) {
        self.inner.lock().unwrap().hang_commands = hang;
    }

    /// Set the PHY link state
    pub fn set_link(&self, up: bool) {
        let mut inner = self.inner.lock().unwrap();
        if up {
            inner.mem[PHYSR as usize] |= PHYSR_LINK;
        } else {
            inner.mem[PHYSR as usize] &= !PHYSR_LINK;
        }
    }

    /// Force a socket's status register
    pub fn set_status(&self, socket: usize, status: SocketStatus) {
        let mut inner = self.inner.lock().unwrap();
        inner.mem[socket_reg(socket, SN_SR) as usize] = status as u8;
    }

    /// Populate a socket's destination registers (peer of a connection)
    pub fn set_remote(&self, socket: usize, ip: Ipv4Addr, port: u16) {
        let mut inner = self.inner.lock().unwrap();
        let base = socket_reg(socket, SN_DIPR0) as usize;
        inner.mem[base..base + 4].copy_from_slice(&ip.octets());
        inner.put_u16(socket_reg(socket, SN_DPORT0), port);
    }

    /// Pin a socket's reported TX free size
    pub fn set_tx_free(&self, socket: usize, free: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.forced_tx_free[socket] = true;
        inner.put_u16(socket_reg(socket, SN_TX_FSR0), free);
    }

    /// Queue inbound bytes on a socket's RX buffer
    pub fn inject_rx(&self, socket: usize, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let mut wr = inner.get_u16(socket_reg(socket, SN_RX_WR0));
        for &byte in data {
            let addr = rx_buf_addr(socket, wr) as usize;
            inner.mem[addr] = byte;
            wr = wr.wrapping_add(1);
        }
        inner.put_u16(socket_reg(socket, SN_RX_WR0), wr);
        let pending = inner.get_u16(socket_reg(socket, SN_RX_RSR0));
        inner.put_u16(
            socket_reg(socket, SN_RX_RSR0),
            pending.wrapping_add(data.len() as u16),
        );
    }

    /// Payloads captured from completed Send commands
    pub fn sent(&self, socket: usize) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().sent[socket].clone()
    }

    /// Number of Send commands the socket has consumed
    pub fn send_count(&self, socket: usize) -> usize {
        self.inner.lock().unwrap().send_count[socket]
    }

    /// Raw register inspection
    pub fn peek(&self, addr: u16) -> u8 {
        self.inner.lock().unwrap().mem[addr as usize]
    }

    /// Raw register override
    pub fn poke(&self, addr: u16, value: u8) {
        self.inner.lock().unwrap().mem[addr as usize] = value;
    }
}

impl Default for MockNic {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiBus for MockNic {
    fn transfer(&mut self, frame: &mut [u8]) -> Result<()> {
        if frame.len() < HEADER_LEN {
            return Err(Error::Other("frame shorter than header".to_string()));
        }
        let addr = u16::from_be_bytes([frame[0], frame[1]]);
        let control = frame[2];
        let mut inner = self.inner.lock().unwrap();

        match control {
            CONTROL_WRITE => {
                for (i, &byte) in frame[HEADER_LEN..].iter().enumerate() {
                    inner.write(addr.wrapping_add(i as u16), byte);
                }
            }
            CONTROL_READ => {
                for i in 0..frame.len() - HEADER_LEN {
                    frame[HEADER_LEN + i] = inner.read(addr.wrapping_add(i as u16));
                }
            }
            other => {
                return Err(Error::Other(format!("unknown control byte {:#04x}", other)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::SocketMode;

    fn write_byte(nic: &mut MockNic, addr: u16, value: u8) {
        let mut frame = vec![(addr >> 8) as u8, addr as u8, CONTROL_WRITE, value];
        nic.transfer(&mut frame).unwrap();
    }

    fn read_byte(nic: &mut MockNic, addr: u16) -> u8 {
        let mut frame = vec![(addr >> 8) as u8, addr as u8, CONTROL_READ, 0];
        nic.transfer(&mut frame).unwrap();
        frame[3]
    }

    #[test]
    fn test_open_reports_init_for_tcp() {
        let mut nic = MockNic::new();
        write_byte(&mut nic, socket_reg(0, SN_MR), SocketMode::Tcp as u8);
        write_byte(&mut nic, socket_reg(0, SN_CR), SocketCommand::Open as u8);
        assert_eq!(
            read_byte(&mut nic, socket_reg(0, SN_SR)),
            SocketStatus::Init as u8
        );
        // command consumed immediately with no delay configured
        assert_eq!(read_byte(&mut nic, socket_reg(0, SN_CR)), 0);
    }

    #[test]
    fn test_command_clears_after_configured_polls() {
        let mut nic = MockNic::new();
        nic.set_command_delay(2);
        write_byte(&mut nic, socket_reg(3, SN_MR), SocketMode::Tcp as u8);
        write_byte(&mut nic, socket_reg(3, SN_CR), SocketCommand::Open as u8);

        let cr = socket_reg(3, SN_CR);
        assert_ne!(read_byte(&mut nic, cr), 0);
        assert_ne!(read_byte(&mut nic, cr), 0);
        assert_eq!(read_byte(&mut nic, cr), 0);
    }

    #[test]
    fn test_hung_command_never_clears() {
        let mut nic = MockNic::new();
        nic.set_hang_commands(true);
        write_byte(&mut nic, socket_reg(0, SN_CR), SocketCommand::Close as u8);
        for _ in 0..10 {
            assert_ne!(read_byte(&mut nic, socket_reg(0, SN_CR)), 0);
        }
    }

    #[test]
    fn test_rx_injection_updates_received_size() {
        let mut nic = MockNic::new();
        nic.inject_rx(2, b"abc");
        let rsr = socket_reg(2, SN_RX_RSR0);
        assert_eq!(read_byte(&mut nic, rsr), 0);
        assert_eq!(read_byte(&mut nic, rsr + 1), 3);
    }
}
