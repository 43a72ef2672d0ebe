//! SPI transport layer
//!
//! Frame format: [ADDR_HI] [ADDR_LO] [CONTROL] [PAYLOAD...]
//!
//! The control byte encodes direction only; there is no block-select field.
//! Every register, common or per-socket, is resolved to an absolute 16-bit
//! offset before it reaches this layer (see `registers`).

use crate::error::Result;
use std::time::Duration;

pub mod mock;
#[cfg(target_os = "linux")]
mod spidev;
#[cfg(target_os = "linux")]
pub use spidev::SpidevBus;

/// Control byte for a register-space read
pub const CONTROL_READ: u8 = 0x0F;
/// Control byte for a register-space write
pub const CONTROL_WRITE: u8 = 0xF0;
/// Header length: address high, address low, control
pub const HEADER_LEN: usize = 3;

/// Raw SPI bus trait
///
/// One `transfer` call is one chip-select-bracketed full-duplex exchange:
/// the implementation must keep chip select asserted for the whole buffer.
pub trait SpiBus: Send {
    /// Full-duplex exchange; `frame` is transmitted and overwritten in place
    /// with the bytes clocked back from the chip.
    fn transfer(&mut self, frame: &mut [u8]) -> Result<()>;
}

/// Register transaction framing over a raw SPI bus
///
/// Owns the settle delay bracketing each exchange. Does not retry; bus
/// failures propagate to the caller verbatim.
pub struct Transport {
    bus: Box<dyn SpiBus>,
    settle: Duration,
}

impl Transport {
    /// Wrap a bus with the default settle delay
    pub fn new<B: SpiBus + 'static>(bus: B) -> Self {
        Self::with_settle(bus, Duration::from_micros(5))
    }

    /// Wrap a bus with an explicit settle delay
    pub fn with_settle<B: SpiBus + 'static>(bus: B, settle: Duration) -> Self {
        Transport {
            bus: Box::new(bus),
            settle,
        }
    }

    /// Read `buf.len()` bytes starting at `addr`
    ///
    /// Payload positions are clocked out as zero and replaced with the
    /// response.
    pub fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        let mut frame = Self::frame(addr, CONTROL_READ, buf.len());
        self.exchange(&mut frame)?;
        buf.copy_from_slice(&frame[HEADER_LEN..]);
        Ok(())
    }

    /// Write `data` starting at `addr`
    pub fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        let mut frame = Self::frame(addr, CONTROL_WRITE, data.len());
        frame[HEADER_LEN..].copy_from_slice(data);
        self.exchange(&mut frame)
    }

    fn frame(addr: u16, control: u8, payload_len: usize) -> Vec<u8> {
        let mut frame = vec![0u8; HEADER_LEN + payload_len];
        frame[0] = (addr >> 8) as u8;
        frame[1] = addr as u8;
        frame[2] = control;
        frame
    }

    /// One atomic register transaction: settle, exchange, settle
    fn exchange(&mut self, frame: &mut [u8]) -> Result<()> {
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        let result = self.bus.transfer(frame);
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        result
    }
}
