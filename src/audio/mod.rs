pub mod convert;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod types;

pub use error::{DecodeError, DeviceError};
pub use types::{AudioBuffer, LoadProgress, PcmStream, PlaybackState};
