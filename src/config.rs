//! Configuration for the SetuNet daemon
//!
//! Loads configuration from a TOML file with the parameters needed for NIC
//! bring-up and the TCP server.

use crate::error::Result;
use crate::registers::{Identity, MacAddress};
use crate::server::ServerSettings;
use crate::socket::CommandTiming;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub hardware: HardwareConfig,
    pub network: NetworkConfig,
    pub server: ServerConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

/// Hardware configuration (SPI bus)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    /// NIC SPI device node
    pub spi_device: String,
    /// SPI clock speed in Hz
    pub spi_speed_hz: u32,
    /// Settle delay bracketing each chip-select window, in microseconds
    pub settle_micros: u64,
}

/// Network identity written to the chip at startup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Hardware address, colon-separated hex
    pub mac: String,
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// TCP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Hardware socket reserved for the listener
    pub listener_socket: usize,
    /// Idle client timeout in milliseconds
    pub client_timeout_ms: u64,
    /// Minimum spacing between server processing ticks, in milliseconds
    pub process_interval_ms: u64,
    /// Echo a fixed acknowledgment after each received payload
    pub echo_ack: bool,
    /// Interval of the periodic status broadcast, in milliseconds
    pub stream_interval_ms: u64,
}

/// Command-completion and link-poll timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Deadline for a socket command register to clear, in milliseconds
    pub command_timeout_ms: u64,
    /// Sleep between command-completion polls, in milliseconds
    pub poll_interval_ms: u64,
    /// PHY link poll interval, in milliseconds
    pub link_poll_ms: u64,
    /// How long to wait for link up at startup, in milliseconds
    pub link_wait_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log output (stdout, stderr, or file path)
    pub output: String,
}

impl NetworkConfig {
    /// Parse into the identity written to the chip
    pub fn identity(&self) -> Result<Identity> {
        Ok(Identity {
            mac: MacAddress::parse(&self.mac)?,
            ip: self.ip,
            subnet: self.subnet,
            gateway: self.gateway,
        })
    }
}

impl ServerConfig {
    pub fn settings(&self) -> ServerSettings {
        ServerSettings {
            port: self.port,
            listener_socket: self.listener_socket,
            client_timeout: Duration::from_millis(self.client_timeout_ms),
            process_interval: Duration::from_millis(self.process_interval_ms),
            echo_ack: self.echo_ack,
        }
    }
}

impl TimingConfig {
    pub fn command_timing(&self) -> CommandTiming {
        CommandTiming {
            timeout: Duration::from_millis(self.command_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn link_poll_interval(&self) -> Duration {
        Duration::from_millis(self.link_poll_ms)
    }

    pub fn link_wait(&self) -> Duration {
        Duration::from_millis(self.link_wait_ms)
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Default configuration for the controller board
    ///
    /// Suitable for testing and development. Production deployments should
    /// use a proper TOML configuration file.
    pub fn controller_defaults() -> Self {
        Self {
            hardware: HardwareConfig {
                spi_device: "/dev/spidev0.0".to_string(),
                spi_speed_hz: 8_000_000,
                settle_micros: 5,
            },
            network: NetworkConfig {
                mac: "02:08:DC:01:02:03".to_string(),
                ip: Ipv4Addr::new(192, 168, 1, 50),
                subnet: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(192, 168, 1, 1),
            },
            server: ServerConfig {
                port: 8080,
                listener_socket: 0,
                client_timeout_ms: 30_000,
                process_interval_ms: 100,
                echo_ack: false,
                stream_interval_ms: 1_000,
            },
            timing: TimingConfig {
                command_timeout_ms: 1_000,
                poll_interval_ms: 1,
                link_poll_ms: 1_000,
                link_wait_ms: 5_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                output: "stdout".to_string(),
            },
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::controller_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::controller_defaults();
        assert_eq!(config.hardware.spi_device, "/dev/spidev0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.listener_socket, 0);
        assert_eq!(config.timing.command_timeout_ms, 1_000);
        assert_eq!(config.network.ip, Ipv4Addr::new(192, 168, 1, 50));
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::controller_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[hardware]"));
        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[server]"));
        assert!(toml_string.contains("[timing]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("spi_device = \"/dev/spidev0.0\""));
        assert!(toml_string.contains("port = 8080"));
        assert!(toml_string.contains("ip = \"192.168.1.50\""));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[hardware]
spi_device = "/dev/spidev1.0"
spi_speed_hz = 4000000
settle_micros = 10

[network]
mac = "02:08:DC:AA:BB:CC"
ip = "10.0.0.20"
subnet = "255.255.255.0"
gateway = "10.0.0.1"

[server]
port = 9000
listener_socket = 0
client_timeout_ms = 15000
process_interval_ms = 50
echo_ack = true
stream_interval_ms = 2000

[timing]
command_timeout_ms = 500
poll_interval_ms = 1
link_poll_ms = 1000
link_wait_ms = 3000

[logging]
level = "debug"
output = "stdout"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.hardware.spi_device, "/dev/spidev1.0");
        assert_eq!(config.server.port, 9000);
        assert!(config.server.echo_ack);
        assert_eq!(config.network.ip, Ipv4Addr::new(10, 0, 0, 20));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_derived_settings() {
        let config = AppConfig::controller_defaults();
        let settings = config.server.settings();
        assert_eq!(settings.client_timeout, Duration::from_millis(30_000));
        assert_eq!(settings.process_interval, Duration::from_millis(100));

        let timing = config.timing.command_timing();
        assert_eq!(timing.timeout, Duration::from_millis(1_000));

        let identity = config.network.identity().unwrap();
        assert_eq!(identity.mac.0, [0x02, 0x08, 0xDC, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_bad_mac_rejected() {
        let mut config = AppConfig::controller_defaults();
        config.network.mac = "not-a-mac".to_string();
        assert!(config.network.identity().is_err());
    }
}
