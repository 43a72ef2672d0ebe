//! SetuNet - network control daemon for the controller
//!
//! Brings up the SPI-attached TCP/IP offload chip, configures the network
//! identity, and runs the cooperative main loop: PHY link monitoring and
//! TCP server processing. All other controller subsystems (relays, sensor
//! polling, display) run from the same loop but do not touch the NIC.

mod config;
mod diag;
mod error;
mod link;
mod registers;
mod server;
mod socket;
mod transport;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::link::{wait_for_link, LinkMonitor};
use crate::registers::{configure_identity, Registers, CHIP_VERSION};
use crate::server::TcpServer;
use crate::socket::SocketManager;
use crate::transport::Transport;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `setu-net <path>` (positional)
/// - `setu-net --config <path>` (flag-based)
/// - `setu-net -c <path>` (short flag)
///
/// Defaults to `/etc/setunet.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/setunet.toml".to_string()
}

#[cfg(target_os = "linux")]
fn open_transport(config: &AppConfig) -> Result<Transport> {
    let bus = transport::SpidevBus::open(
        &config.hardware.spi_device,
        config.hardware.spi_speed_hz,
    )?;
    Ok(Transport::with_settle(
        bus,
        Duration::from_micros(config.hardware.settle_micros),
    ))
}

#[cfg(not(target_os = "linux"))]
fn open_transport(_config: &AppConfig) -> Result<Transport> {
    Err(Error::Other(
        "no SPI bus backend for this platform".to_string(),
    ))
}

/// Reset the chip, verify the version register, wait for link, and write
/// the network identity.
fn bring_up(regs: &mut Registers, config: &AppConfig) -> Result<()> {
    regs.soft_reset()?;
    std::thread::sleep(Duration::from_millis(10));

    let version = regs.version()?;
    if version != CHIP_VERSION {
        return Err(Error::InitializationFailed(format!(
            "unexpected chip version {:#04x} (want {:#04x})",
            version, CHIP_VERSION
        )));
    }
    log::info!("Chip version {:#04x}", version);

    if !wait_for_link(regs, config.timing.link_wait()) {
        return Err(Error::InitializationFailed(
            "no link within startup window".to_string(),
        ));
    }

    // polled operation: all chip interrupts masked off
    regs.set_interrupt_mask(0x00)?;

    configure_identity(regs, &config.network.identity()?)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("SetuNet v0.3.0 starting...");

    let config_path = parse_config_path();
    log::info!("Using config: {}", config_path);
    let config = match AppConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Config load failed ({}), using defaults", e);
            AppConfig::controller_defaults()
        }
    };

    let mut regs = Registers::new(open_transport(&config)?);

    // Link-level failure here is surfaced to the operator; the network
    // subsystem stays uninitialized rather than limping along.
    bring_up(&mut regs, &config)?;

    let mgr = SocketManager::new(regs, config.timing.command_timing());
    let mut server = TcpServer::new(mgr, config.server.settings());
    server.start()?;
    server.set_data_streaming(
        config.server.stream_interval_ms > 0,
        Duration::from_millis(config.server.stream_interval_ms),
    );

    server.on_connect(|client, remote| {
        log::info!("Client {} connected from {}", client, remote);
    });
    server.on_disconnect(|client| {
        log::info!("Client {} disconnected", client);
    });
    server.on_data_received(|client, data| {
        log::debug!("Client {}: {} bytes received", client, data.len());
    });

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut link = LinkMonitor::new(config.timing.link_poll_interval());
    log::info!("SetuNet running. Press Ctrl-C to stop.");

    while running.load(Ordering::Relaxed) {
        link.poll(server.manager_mut().registers_mut());
        server.process();
        std::thread::sleep(Duration::from_millis(10));
    }

    log::info!("Shutting down...");
    server.shutdown();
    log::info!("{}", diag::stats_report(&server));
    log::info!("SetuNet stopped");
    Ok(())
}
