//! Linux spidev bus implementation

use super::SpiBus;
use crate::error::{Error, Result};
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};

/// SPI bus backed by a Linux `/dev/spidevX.Y` device
///
/// The kernel asserts chip select for the duration of each transfer, so one
/// `transfer` call is one chip-select-bracketed exchange.
pub struct SpidevBus {
    dev: Spidev,
}

impl SpidevBus {
    /// Open and configure a spidev device
    ///
    /// # Arguments
    /// * `path` - Device path (e.g., "/dev/spidev0.0")
    /// * `speed_hz` - Clock speed (e.g., 8_000_000)
    pub fn open(path: &str, speed_hz: u32) -> Result<Self> {
        let mut dev = Spidev::open(path).map_err(Error::Spi)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        dev.configure(&options).map_err(Error::Spi)?;

        log::info!("Opened SPI device: {} at {} Hz", path, speed_hz);

        Ok(SpidevBus { dev })
    }
}

impl SpiBus for SpidevBus {
    fn transfer(&mut self, frame: &mut [u8]) -> Result<()> {
        let tx = frame.to_vec();
        {
            let mut xfer = SpidevTransfer::read_write(&tx, frame);
            self.dev.transfer(&mut xfer).map_err(Error::Spi)?;
        }
        Ok(())
    }
}
