/// Result alias that carries the custom [`StairlightError`] type.
pub type Result<T> = std::result::Result<T, StairlightError>;

/// Common error type for the core crate.
///
/// Only [`StairlightError::NoWorkingMultiplexer`] is fatal; every other
/// variant describes a fault the control loop degrades around (excluded
/// hardware, a failed bus write, a rejected configuration).
#[derive(Debug, thiserror::Error)]
pub enum StairlightError {
    /// No multiplexer answered its presence probe at startup. Raised before
    /// the control loop runs; the installation cannot start without a bus.
    #[error("no working multiplexer at any configured address")]
    NoWorkingMultiplexer,
    /// A global channel index outside the configured channel range.
    #[error("channel {0} is outside the configured channel range")]
    ChannelInvalid(usize),
    /// The multiplexer owning the requested channel failed its startup probe.
    #[error("multiplexer 0x{0:02x} is not working")]
    MultiplexerDown(u8),
    /// A channel-mask write to a multiplexer was rejected by the bus.
    #[error("bus write to multiplexer 0x{0:02x} failed")]
    BusWrite(u8),
    /// The configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The configuration file could not be parsed.
    #[error("{0}")]
    Parse(#[from] serde_json::Error),
}

impl StairlightError {
    /// Creates a configuration error from any displayable message.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}
