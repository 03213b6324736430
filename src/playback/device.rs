//! Boundary between the playback session and an audio output device.

use std::sync::Arc;

use crate::audio::error::DeviceResult;
use crate::audio::types::PcmStream;

/// Receives lifecycle and progress callbacks from a running playback.
///
/// Callbacks arrive on the playback thread. Progress for one operation is
/// reported in non-decreasing time order.
pub trait ProgressListener: Send + Sync {
    fn started(&self);

    /// The operation has finished and released the device.
    fn stopped(&self);

    /// Returns `false` to ask the operation to halt.
    fn update_progress(&self, elapsed_millis: u64, total_millis: u64) -> bool;
}

/// A running playback operation.
pub trait PlaybackHandle: Send {
    /// Halt the operation and block until the device is released.
    /// Returns the frame reached.
    fn stop(self: Box<Self>) -> usize;
}

/// Something that can play a PCM stream.
pub trait OutputDevice: Send + Sync {
    fn start(
        &self,
        stream: PcmStream,
        start_frame: usize,
        listener: Arc<dyn ProgressListener>,
    ) -> DeviceResult<Box<dyn PlaybackHandle>>;
}
