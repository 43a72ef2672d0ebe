//! Error types for SetuNet

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SetuNet error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// SPI bus error
    #[error("SPI bus error: {0}")]
    Spi(#[source] std::io::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A socket command register never cleared within the timeout
    #[error("Command timeout on socket {socket}")]
    CommandTimeout {
        /// Socket the command was issued to
        socket: usize,
    },

    /// Socket index outside the fixed hardware range
    #[error("Invalid socket id: {0}")]
    InvalidSocketId(usize),

    /// Socket reported an unexpected status after a lifecycle command
    #[error("Unexpected socket status: expected {expected:#04x}, got {actual:#04x}")]
    UnsupportedModeTransition {
        /// Status the command should have produced
        expected: u8,
        /// Status actually read back
        actual: u8,
    },

    /// Chip or link bring-up failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration file parse error
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration file serialize error
    #[error("Config error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
