use thiserror::Error;

/// Runtime failures of pump operations.
///
/// None of these are fatal: the pump logs them where they happen and the
/// caller may ignore the returned value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DoserError {
    #[error("pump '{0}' has no output assigned")]
    NoActuator(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("invalid calibration result ({0:.2} mL)")]
    InvalidMeasurement(f32),
    #[error("clock not synchronized")]
    ClockInvalid,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors raised while assembling a `PumpController` from configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("pump id must not be empty")]
    MissingId,
    #[error("missing preference store")]
    MissingStore,
    #[error("pump '{0}' has no schedule entries")]
    EmptySchedule(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DoserError>;
