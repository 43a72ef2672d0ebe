//! Register map and semantic register access
//!
//! All addresses are absolute 16-bit offsets in the chip's single register
//! space. Per-socket registers are computed as
//! `SOCKET_BASE + socket * SOCKET_STRIDE + offset`; there is no block-select
//! field in the SPI frame. Getting this computation wrong does not fail
//! loudly, it silently addresses a neighboring socket's block, so every
//! socket-relative access in the crate goes through [`socket_reg`].
//!
//! Address layout grounded against the chip datasheet register tables.

use crate::error::{Error, Result};
use crate::transport::Transport;
use std::net::Ipv4Addr;

/// Number of hardware sockets on the chip
pub const MAX_SOCKETS: usize = 8;

// ===== Common registers =====

/// Mode register (bit 7 = software reset)
pub const MR: u16 = 0x0000;
/// Gateway address, 4 bytes
pub const GAR0: u16 = 0x0001;
/// Subnet mask, 4 bytes
pub const SUBR0: u16 = 0x0005;
/// Source hardware (MAC) address, 6 bytes
pub const SHAR0: u16 = 0x0009;
/// Source IP address, 4 bytes
pub const SIPR0: u16 = 0x000F;
/// Interrupt register
pub const IR: u16 = 0x0015;
/// Interrupt mask register
pub const IMR: u16 = 0x0016;
/// Retry time-value, 2 bytes (100us units)
pub const RTR0: u16 = 0x0017;
/// Retry count
pub const RCR: u16 = 0x0019;
/// PHY status register
pub const PHYSR: u16 = 0x003C;
/// Chip version register
pub const VERSIONR: u16 = 0x0080;

/// MR bit: software reset
pub const MR_RESET: u8 = 0x80;
/// PHYSR bit: link up
pub const PHYSR_LINK: u8 = 0x01;
/// Expected VERSIONR value for this chip variant
pub const CHIP_VERSION: u8 = 0x51;

// ===== Per-socket register block =====

/// First socket register block
pub const SOCKET_BASE: u16 = 0x0400;
/// Distance between consecutive socket blocks
pub const SOCKET_STRIDE: u16 = 0x0100;

/// Socket mode (protocol select)
pub const SN_MR: u16 = 0x00;
/// Socket command; cleared by the chip once the command is consumed
pub const SN_CR: u16 = 0x01;
/// Socket interrupt
pub const SN_IR: u16 = 0x02;
/// Socket status (hardware-reported lifecycle value)
pub const SN_SR: u16 = 0x03;
/// Source port, high byte
pub const SN_PORT0: u16 = 0x04;
/// Source port, low byte
pub const SN_PORT1: u16 = 0x05;
/// Destination hardware address, 6 bytes
pub const SN_DHAR0: u16 = 0x06;
/// Destination IP address, 4 bytes
pub const SN_DIPR0: u16 = 0x0C;
/// Destination port, 2 bytes
pub const SN_DPORT0: u16 = 0x10;
/// RX buffer size register
pub const SN_RXBUF_SIZE: u16 = 0x1E;
/// TX buffer size register
pub const SN_TXBUF_SIZE: u16 = 0x1F;
/// TX free size, 2 bytes
pub const SN_TX_FSR0: u16 = 0x20;
/// TX read pointer, 2 bytes
pub const SN_TX_RD0: u16 = 0x22;
/// TX write pointer, 2 bytes
pub const SN_TX_WR0: u16 = 0x24;
/// RX received size, 2 bytes
pub const SN_RX_RSR0: u16 = 0x26;
/// RX read pointer, 2 bytes
pub const SN_RX_RD0: u16 = 0x28;
/// RX write pointer, 2 bytes
pub const SN_RX_WR0: u16 = 0x2A;

// ===== Socket buffer memory =====

/// Base of the TX buffer window
pub const TX_BUF_BASE: u16 = 0x4000;
/// Base of the RX buffer window
pub const RX_BUF_BASE: u16 = 0x8000;
/// Per-socket buffer capacity (2 KiB)
pub const BUF_SIZE: u16 = 0x0800;
/// Cursor wrap mask within a socket's buffer
pub const BUF_MASK: u16 = 0x07FF;

/// Resolve a per-socket register to its absolute address
///
/// The caller must have validated `socket < MAX_SOCKETS`; the computation is
/// injective for in-range `(socket, offset)` pairs with `offset` inside one
/// block.
#[inline]
pub fn socket_reg(socket: usize, offset: u16) -> u16 {
    SOCKET_BASE + socket as u16 * SOCKET_STRIDE + offset
}

/// Absolute address of a TX buffer cursor position for a socket
#[inline]
pub fn tx_buf_addr(socket: usize, cursor: u16) -> u16 {
    TX_BUF_BASE + socket as u16 * BUF_SIZE + (cursor & BUF_MASK)
}

/// Absolute address of an RX buffer cursor position for a socket
#[inline]
pub fn rx_buf_addr(socket: usize, cursor: u16) -> u16 {
    RX_BUF_BASE + socket as u16 * BUF_SIZE + (cursor & BUF_MASK)
}

/// 48-bit hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Parse from colon-separated hex notation ("02:08:DC:01:02:03")
    pub fn parse(s: &str) -> Result<Self> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(':') {
            if count == 6 {
                return Err(Error::InvalidParameter(format!("bad MAC address: {}", s)));
            }
            octets[count] = u8::from_str_radix(part, 16)
                .map_err(|_| Error::InvalidParameter(format!("bad MAC address: {}", s)))?;
            count += 1;
        }
        if count != 6 {
            return Err(Error::InvalidParameter(format!("bad MAC address: {}", s)));
        }
        Ok(MacAddress(octets))
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Semantic register access over a [`Transport`]
///
/// Sole gate to the chip's register space. All accessors are synchronous and
/// blocking; none retries; failures propagate the transport error verbatim.
pub struct Registers {
    transport: Transport,
}

impl Registers {
    pub fn new(transport: Transport) -> Self {
        Registers { transport }
    }

    /// Read a single register byte
    pub fn read_byte(&mut self, addr: u16) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.transport.read(addr, &mut buf)?;
        Ok(buf[0])
    }

    /// Write a single register byte
    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.transport.write(addr, &[value])
    }

    /// Read a contiguous register block into `buf`
    pub fn read_block(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        self.transport.read(addr, buf)
    }

    /// Write a contiguous register block
    pub fn write_block(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        self.transport.write(addr, data)
    }

    /// Read a big-endian 16-bit value spread across two byte registers
    pub fn read_u16(&mut self, addr: u16) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.transport.read(addr, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Write a big-endian 16-bit value across two byte registers
    pub fn write_u16(&mut self, addr: u16, value: u16) -> Result<()> {
        self.transport.write(addr, &value.to_be_bytes())
    }

    /// Read a 16-bit counter the chip updates asynchronously
    ///
    /// The two bytes are not latched, so a single read can tear. Re-read
    /// until two consecutive reads agree.
    pub fn read_u16_stable(&mut self, addr: u16) -> Result<u16> {
        let mut prev = self.read_u16(addr)?;
        loop {
            let next = self.read_u16(addr)?;
            if next == prev {
                return Ok(next);
            }
            prev = next;
        }
    }

    // ===== Chip-wide semantic accessors =====

    /// Issue a software reset through the mode register
    pub fn soft_reset(&mut self) -> Result<()> {
        self.write_byte(MR, MR_RESET)
    }

    /// Chip version register
    pub fn version(&mut self) -> Result<u8> {
        self.read_byte(VERSIONR)
    }

    /// PHY link state
    pub fn link_up(&mut self) -> Result<bool> {
        Ok(self.read_byte(PHYSR)? & PHYSR_LINK != 0)
    }

    /// Chip-wide interrupt mask; the driver polls, so this stays zero
    pub fn set_interrupt_mask(&mut self, mask: u8) -> Result<()> {
        self.write_byte(IMR, mask)
    }

    pub fn set_gateway(&mut self, addr: Ipv4Addr) -> Result<()> {
        self.write_block(GAR0, &addr.octets())
    }

    pub fn gateway(&mut self) -> Result<Ipv4Addr> {
        let mut buf = [0u8; 4];
        self.read_block(GAR0, &mut buf)?;
        Ok(Ipv4Addr::from(buf))
    }

    pub fn set_subnet(&mut self, addr: Ipv4Addr) -> Result<()> {
        self.write_block(SUBR0, &addr.octets())
    }

    pub fn subnet(&mut self) -> Result<Ipv4Addr> {
        let mut buf = [0u8; 4];
        self.read_block(SUBR0, &mut buf)?;
        Ok(Ipv4Addr::from(buf))
    }

    pub fn set_mac(&mut self, mac: MacAddress) -> Result<()> {
        self.write_block(SHAR0, &mac.0)
    }

    pub fn mac(&mut self) -> Result<MacAddress> {
        let mut buf = [0u8; 6];
        self.read_block(SHAR0, &mut buf)?;
        Ok(MacAddress(buf))
    }

    pub fn set_ip(&mut self, addr: Ipv4Addr) -> Result<()> {
        self.write_block(SIPR0, &addr.octets())
    }

    pub fn ip(&mut self) -> Result<Ipv4Addr> {
        let mut buf = [0u8; 4];
        self.read_block(SIPR0, &mut buf)?;
        Ok(Ipv4Addr::from(buf))
    }
}

/// Network identity for [`configure_identity`]
#[derive(Debug, Clone)]
pub struct Identity {
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// Write the network identity and read each value back for confirmation
pub fn configure_identity(regs: &mut Registers, id: &Identity) -> Result<()> {
    regs.set_mac(id.mac)?;
    regs.set_ip(id.ip)?;
    regs.set_subnet(id.subnet)?;
    regs.set_gateway(id.gateway)?;

    if regs.mac()? != id.mac {
        return Err(Error::InitializationFailed(
            "MAC readback mismatch".to_string(),
        ));
    }
    if regs.ip()? != id.ip {
        return Err(Error::InitializationFailed(
            "IP readback mismatch".to_string(),
        ));
    }
    if regs.subnet()? != id.subnet {
        return Err(Error::InitializationFailed(
            "subnet readback mismatch".to_string(),
        ));
    }
    if regs.gateway()? != id.gateway {
        return Err(Error::InitializationFailed(
            "gateway readback mismatch".to_string(),
        ));
    }

    log::info!(
        "Network identity configured: mac={} ip={} subnet={} gw={}",
        id.mac,
        id.ip,
        id.subnet,
        id.gateway
    );
    Ok(())
}
