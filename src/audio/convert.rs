//! Conversion of compressed or non-16-bit sources into an intermediate WAV.
//!
//! The intermediate file is always signed 16-bit PCM, 44100 Hz, stereo. It
//! lives in a [`NamedTempFile`] which removes itself when dropped, so the
//! caller's scope decides when the file disappears.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tempfile::NamedTempFile;

use super::error::{DecodeError, DecodeResult};
use super::types::{DecodeStage, LoadProgress};

pub const TARGET_SAMPLE_RATE: u32 = 44_100;
pub const TARGET_CHANNELS: u16 = 2;

/// Packets decoded between minor progress reports.
const PACKETS_PER_REPORT: usize = 64;

/// Extensions treated as compressed containers.
const COMPRESSED_EXTENSIONS: &[&str] = &["mp3"];

/// Whether the file extension names a compressed container.
pub fn is_compressed(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            COMPRESSED_EXTENSIONS
                .iter()
                .any(|c| c.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Convert `path` into a temporary 16-bit / 44100 Hz / stereo WAV file.
pub fn to_intermediate_wav(
    path: &Path,
    progress: &mut dyn FnMut(LoadProgress) -> bool,
) -> DecodeResult<NamedTempFile> {
    if !progress(LoadProgress::Major(DecodeStage::Converting)) {
        return Err(DecodeError::Cancelled);
    }

    let (interleaved, sample_rate, channels) = decode_interleaved(path, progress)?;
    let stereo = to_stereo(&interleaved, channels);
    let left = resample_linear(&stereo[0], sample_rate as f32, TARGET_SAMPLE_RATE as f32);
    let right = resample_linear(&stereo[1], sample_rate as f32, TARGET_SAMPLE_RATE as f32);

    let temp_file = tempfile::Builder::new()
        .prefix("wavedeck_")
        .suffix(".wav")
        .tempfile()?;

    let spec = hound::WavSpec {
        channels: TARGET_CHANNELS,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(BufWriter::new(temp_file.reopen()?), spec)?;
    for (l, r) in left.iter().zip(&right) {
        writer.write_sample(to_i16(*l))?;
        writer.write_sample(to_i16(*r))?;
    }
    writer.finalize()?;

    log::info!(
        "convert: {:?} -> {:?} ({} Hz, {} ch -> {} Hz stereo, {} frames)",
        path,
        temp_file.path(),
        sample_rate,
        channels,
        TARGET_SAMPLE_RATE,
        left.len()
    );

    Ok(temp_file)
}

/// Decode every packet of the default track into interleaved f32 samples.
fn decode_interleaved(
    path: &Path,
    progress: &mut dyn FnMut(LoadProgress) -> bool,
) -> DecodeResult<(Vec<f32>, u32, usize)> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::ConversionUnsupported(format!("probe failed: {e}")))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::ConversionUnsupported("no default track".into()))?
        .clone();

    let sample_rate = track.codec_params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    let total_frames = track.codec_params.n_frames;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::ConversionUnsupported(format!("no decoder: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                log::warn!("convert: error reading packet from {:?}: {}", path, e);
                return Err(DecodeError::CorruptStream);
            }
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("convert: skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => {
                log::warn!("convert: decoder failed on {:?}: {}", path, e);
                return Err(DecodeError::CorruptStream);
            }
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count();
        }
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());

        packets += 1;
        if packets % PACKETS_PER_REPORT == 0 {
            let fraction = match (total_frames, channels) {
                (Some(total), ch) if total > 0 && ch > 0 => {
                    (samples.len() / ch) as f32 / total as f32
                }
                _ => 0.0,
            };
            if !progress(LoadProgress::Minor(fraction.min(1.0))) {
                return Err(DecodeError::Cancelled);
            }
        }
    }

    if channels == 0 || samples.is_empty() {
        return Err(DecodeError::CorruptStream);
    }

    Ok((samples, sample_rate, channels))
}

/// Split interleaved samples into left/right, duplicating mono and dropping
/// channels past the second.
fn to_stereo(interleaved: &[f32], channels: usize) -> [Vec<f32>; 2] {
    let frames = interleaved.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(if channels > 1 { frame[1] } else { frame[0] });
    }
    [left, right]
}

/// Simple linear interpolation resampling
fn resample_linear(samples: &[f32], from_sr: f32, to_sr: f32) -> Vec<f32> {
    if from_sr == to_sr || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_sr / to_sr;
    let output_len = (samples.len() as f32 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f32 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        output.push(sample);
    }

    output
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
