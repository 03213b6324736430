//! Decode and output-device error types

use thiserror::Error;

/// Errors raised while turning a file into an [`AudioBuffer`](super::AudioBuffer)
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The converter cannot handle this container or codec
    #[error("conversion unsupported: {0}")]
    ConversionUnsupported(String),

    /// Frame math overflowed or the header describes no usable layout
    #[error("empty or corrupt stream")]
    CorruptStream,

    /// The WAV container could not be parsed
    #[error("invalid container: {0}")]
    Container(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller asked the decode to stop
    #[error("decode cancelled")]
    Cancelled,
}

/// Errors raised while starting playback on the output device
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Failed to get output config: {0}")]
    Config(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build output stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start stream: {0}")]
    StreamPlay(String),

    #[error("Failed to spawn playback thread: {0}")]
    Thread(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
pub type DeviceResult<T> = Result<T, DeviceError>;
