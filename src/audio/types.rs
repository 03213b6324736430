use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rate used when a source reports a missing or nonsensical sample rate.
pub const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

/// Bytes per sample in the PCM layout the decoder understands.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Replace a non-positive or non-finite rate with [`DEFAULT_SAMPLE_RATE`].
pub fn normalize_sample_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        DEFAULT_SAMPLE_RATE
    }
}

/// Decoded audio held entirely in memory, one sample vector per channel.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    channels: Vec<Vec<i16>>,
    sample_rate: f64,
    source_path: PathBuf,
}

impl AudioBuffer {
    /// Build a buffer from per-channel samples.
    ///
    /// Channels longer than the shortest one are truncated so every channel
    /// holds the same number of frames.
    pub fn new(mut channels: Vec<Vec<i16>>, sample_rate: f64, source_path: impl Into<PathBuf>) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            if channel.len() != frames {
                log::warn!(
                    "AudioBuffer: truncating channel from {} to {} frames",
                    channel.len(),
                    frames
                );
                channel.truncate(frames);
            }
        }

        Self {
            channels,
            sample_rate: normalize_sample_rate(sample_rate),
            source_path: source_path.into(),
        }
    }

    pub fn channels(&self) -> &[Vec<i16>] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&[i16]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Whole seconds of audio, truncated.
    pub fn duration_seconds(&self) -> u64 {
        (self.frame_count() as f64 / self.sample_rate).floor() as u64
    }

    /// Exact duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Display title derived from the file name.
    pub fn title(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string())
    }

    pub fn is_playable(&self) -> bool {
        self.frame_count() > 0
    }

    /// Frame index at `fraction` of the total length, using this buffer's own
    /// frame count and rate.
    pub fn frame_at_fraction(&self, fraction: f64) -> usize {
        let seconds = fraction.clamp(0.0, 1.0) * self.duration();
        ((seconds * self.sample_rate).round() as usize).min(self.frame_count())
    }
}

/// Interleaved 16-bit little-endian PCM ready for an output device.
#[derive(Clone, Debug)]
pub struct PcmStream {
    bytes: Arc<[u8]>,
    channels: u16,
    sample_rate: f64,
}

impl PcmStream {
    pub fn new(bytes: Vec<u8>, channels: u16, sample_rate: f64) -> Self {
        Self {
            bytes: bytes.into(),
            channels,
            sample_rate: normalize_sample_rate(sample_rate),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    pub fn frame_count(&self) -> usize {
        match self.frame_size() {
            0 => 0,
            size => self.bytes.len() / size,
        }
    }

    /// Sample of `channel` at `frame`, or silence past the end.
    pub fn sample(&self, frame: usize, channel: usize) -> i16 {
        let offset = frame * self.frame_size() + channel * BYTES_PER_SAMPLE;
        match self.bytes.get(offset..offset + BYTES_PER_SAMPLE) {
            Some(pair) => i16::from_le_bytes([pair[0], pair[1]]),
            None => 0,
        }
    }

    pub fn frames_to_millis(&self, frames: usize) -> u64 {
        (frames as f64 * 1000.0 / self.sample_rate) as u64
    }

    pub fn duration_millis(&self) -> u64 {
        self.frames_to_millis(self.frame_count())
    }
}

/// Coarse stages reported while a file is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Converting,
    ReadingHeader,
    ReadingPayload,
    Demultiplexing,
}

/// Progress notifications emitted by a background decode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadProgress {
    Begin,
    Major(DecodeStage),
    /// Fraction of the current stage completed.
    Minor(f32),
    Complete,
}

/// Current playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_rates_fall_back_to_default() {
        assert_eq!(normalize_sample_rate(0.0), DEFAULT_SAMPLE_RATE);
        assert_eq!(normalize_sample_rate(-8000.0), DEFAULT_SAMPLE_RATE);
        assert_eq!(normalize_sample_rate(f64::NAN), DEFAULT_SAMPLE_RATE);
        assert_eq!(normalize_sample_rate(48_000.0), 48_000.0);
    }

    #[test]
    fn duration_is_truncated_to_whole_seconds() {
        let buffer = AudioBuffer::new(vec![vec![0; 66_150]], 44_100.0, "a.wav");
        assert_eq!(buffer.duration_seconds(), 1);

        let buffer = AudioBuffer::new(vec![vec![0; 66_150]], 0.0, "a.wav");
        assert_eq!(buffer.sample_rate(), DEFAULT_SAMPLE_RATE);
        assert_eq!(buffer.duration_seconds(), 1);

        let empty = AudioBuffer::new(vec![Vec::new(), Vec::new()], 44_100.0, "a.wav");
        assert_eq!(empty.duration_seconds(), 0);
        assert!(!empty.is_playable());
    }

    #[test]
    fn channels_are_truncated_to_equal_length() {
        let buffer = AudioBuffer::new(vec![vec![1, 2, 3], vec![4, 5]], 44_100.0, "a.wav");
        assert_eq!(buffer.frame_count(), 2);
        assert_eq!(buffer.channel(0), Some(&[1, 2][..]));
    }

    #[test]
    fn half_mark_lands_in_the_middle() {
        let buffer = AudioBuffer::new(vec![vec![0; 441_000]], 44_100.0, "ten.wav");
        assert_eq!(buffer.frame_at_fraction(0.5), 220_500);
        assert_eq!(buffer.frame_at_fraction(2.0), 441_000);

        let slow = AudioBuffer::new(vec![vec![0; 80_000]], 8_000.0, "slow.wav");
        assert_eq!(slow.frame_at_fraction(0.25), 20_000);
    }

    #[test]
    fn pcm_stream_reads_interleaved_samples() {
        let stream = PcmStream::new(vec![0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x34, 0x12], 2, 44_100.0);
        assert_eq!(stream.frame_count(), 2);
        assert_eq!(stream.sample(0, 0), 1);
        assert_eq!(stream.sample(0, 1), -1);
        assert_eq!(stream.sample(1, 0), i16::MIN);
        assert_eq!(stream.sample(1, 1), 0x1234);
        assert_eq!(stream.sample(2, 0), 0);
    }
}
