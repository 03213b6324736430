use std::io::{ErrorKind, Read};
use std::path::Path;

use super::convert;
use super::error::{DecodeError, DecodeResult};
use super::types::{AudioBuffer, DecodeStage, LoadProgress, PcmStream, BYTES_PER_SAMPLE};

/// Bytes read between minor progress reports.
const READ_CHUNK: usize = 1 << 20;

/// Decode an audio file into an `AudioBuffer` with all samples in memory.
pub fn decode_file(path: &Path) -> DecodeResult<AudioBuffer> {
    decode_file_with_progress(path, &mut |_| true)
}

/// Decode an audio file, reporting progress along the way.
///
/// `progress` returns `false` to cancel; the decode then stops at the next
/// step with [`DecodeError::Cancelled`]. Any temporary file created by the
/// conversion step is removed before this returns, whatever the outcome.
pub fn decode_file_with_progress(
    path: &Path,
    progress: &mut dyn FnMut(LoadProgress) -> bool,
) -> DecodeResult<AudioBuffer> {
    report(progress, LoadProgress::Begin)?;

    let converted = if needs_conversion(path)? {
        Some(convert::to_intermediate_wav(path, progress)?)
    } else {
        None
    };
    let source = converted.as_ref().map_or(path, |file| file.path());

    let (channels, sample_rate) = read_pcm16(source, progress)?;
    drop(converted);

    let buffer = AudioBuffer::new(channels, sample_rate, path);
    log::info!(
        "decode: {:?} -> {} ch, {} frames @ {} Hz ({} s)",
        path,
        buffer.channel_count(),
        buffer.frame_count(),
        buffer.sample_rate(),
        buffer.duration_seconds()
    );

    report(progress, LoadProgress::Complete)?;
    Ok(buffer)
}

fn report(progress: &mut dyn FnMut(LoadProgress) -> bool, step: LoadProgress) -> DecodeResult<()> {
    if progress(step) {
        Ok(())
    } else {
        Err(DecodeError::Cancelled)
    }
}

/// Compressed containers and WAV files that are not 16-bit integer PCM go
/// through the converter first.
fn needs_conversion(path: &Path) -> DecodeResult<bool> {
    if convert::is_compressed(path) {
        return Ok(true);
    }

    match hound::WavReader::open(path) {
        Ok(reader) => {
            let spec = reader.spec();
            let pcm16 = spec.sample_format == hound::SampleFormat::Int && spec.bits_per_sample == 16;
            if !pcm16 {
                log::debug!(
                    "decode: {:?} is {}-bit {:?}, converting",
                    path,
                    spec.bits_per_sample,
                    spec.sample_format
                );
            }
            Ok(!pcm16)
        }
        Err(hound::Error::IoError(e)) => Err(e.into()),
        Err(e) => {
            log::debug!("decode: {:?} is not a plain WAV ({}), converting", path, e);
            Ok(true)
        }
    }
}

/// Read a 16-bit PCM WAV file into per-channel sample vectors.
fn read_pcm16(
    path: &Path,
    progress: &mut dyn FnMut(LoadProgress) -> bool,
) -> DecodeResult<(Vec<Vec<i16>>, f64)> {
    report(progress, LoadProgress::Major(DecodeStage::ReadingHeader))?;

    let file_len = std::fs::metadata(path)?.len();
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channel_count = spec.channels as usize;

    let frame_size = (channel_count * BYTES_PER_SAMPLE) as u64;
    let payload_len = payload_len(u64::from(reader.duration()), frame_size)?;

    report(progress, LoadProgress::Major(DecodeStage::ReadingPayload))?;

    let capacity = payload_len.min(usize::try_from(file_len).unwrap_or(usize::MAX));
    let mut payload = Vec::with_capacity(capacity);
    let mut source = reader.into_inner().take(payload_len as u64);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        payload.extend_from_slice(&chunk[..n]);
        report(
            progress,
            LoadProgress::Minor(payload.len() as f32 / payload_len.max(1) as f32),
        )?;
    }

    if payload.len() < payload_len {
        log::warn!(
            "decode: {:?} declares {} payload bytes but only {} were read",
            path,
            payload_len,
            payload.len()
        );
    }

    report(progress, LoadProgress::Major(DecodeStage::Demultiplexing))?;
    let channels = demultiplex(&payload, channel_count);

    Ok((channels, f64::from(spec.sample_rate)))
}

/// Payload size declared by a header. A zero frame size, or a product that
/// does not fit in memory, marks the stream as corrupt.
fn payload_len(frame_count: u64, frame_size: u64) -> DecodeResult<usize> {
    if frame_size == 0 {
        return Err(DecodeError::CorruptStream);
    }
    frame_count
        .checked_mul(frame_size)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or(DecodeError::CorruptStream)
}

/// Split an interleaved 16-bit little-endian payload into one vector per
/// channel. A trailing partial frame is ignored.
pub fn demultiplex(payload: &[u8], channel_count: usize) -> Vec<Vec<i16>> {
    if channel_count == 0 {
        return Vec::new();
    }

    let frame_size = channel_count * BYTES_PER_SAMPLE;
    let frames = payload.len() / frame_size;
    let mut channels: Vec<Vec<i16>> = (0..channel_count)
        .map(|_| Vec::with_capacity(frames))
        .collect();

    for frame in payload.chunks_exact(frame_size) {
        for (channel, pair) in channels.iter_mut().zip(frame.chunks_exact(BYTES_PER_SAMPLE)) {
            let low = u16::from(pair[0]);
            let high = u16::from(pair[1]);
            channel.push((low | (high << 8)) as i16);
        }
    }

    channels
}

/// Interleave a buffer back into 16-bit little-endian PCM bytes, the exact
/// inverse of [`demultiplex`].
pub fn encode(buffer: &AudioBuffer) -> Vec<u8> {
    let frames = buffer.frame_count();
    let mut bytes = Vec::with_capacity(frames * buffer.channel_count() * BYTES_PER_SAMPLE);
    for frame in 0..frames {
        for channel in buffer.channels() {
            bytes.extend_from_slice(&channel[frame].to_le_bytes());
        }
    }
    bytes
}

/// Encode a buffer into a stream an output device can play.
pub fn encode_stream(buffer: &AudioBuffer) -> PcmStream {
    PcmStream::new(
        encode(buffer),
        buffer.channel_count() as u16,
        buffer.sample_rate(),
    )
}
