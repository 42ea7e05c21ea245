use thiserror::Error;

/// All errors produced by speech2gpio-core.
#[derive(Debug, Error)]
pub enum SpeechGpioError {
    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("GPIO pin {pin} is unavailable")]
    PinUnavailable { pin: u32 },

    #[error("recognizer error: {0}")]
    Recognizer(String),

    #[error("invalid grammar: {0}")]
    InvalidGrammar(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("session has already been started")]
    AlreadyStarted,

    #[error("session was shut down while starting")]
    ShutDownDuringStart,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SpeechGpioError>;
