use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;

use super::error::{DeviceError, DeviceResult};
use super::types::PcmStream;
use crate::playback::device::{OutputDevice, PlaybackHandle, ProgressListener};

/// How often the playback thread reports progress.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Output device backed by the host's default cpal output.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl OutputDevice for CpalOutput {
    fn start(
        &self,
        stream: PcmStream,
        start_frame: usize,
        listener: Arc<dyn ProgressListener>,
    ) -> DeviceResult<Box<dyn PlaybackHandle>> {
        let cancel = Arc::new(AtomicBool::new(false));
        let position = Arc::new(AtomicUsize::new(start_frame.min(stream.frame_count())));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<DeviceResult<()>>(1);

        let thread = {
            let cancel = cancel.clone();
            let position = position.clone();
            std::thread::Builder::new()
                .name("playback".into())
                .spawn(move || run_playback(stream, position, cancel, listener, ready_tx))
                .map_err(|e| DeviceError::Thread(e.to_string()))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalHandle {
                cancel,
                position,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::Thread("playback thread exited early".into()))
            }
        }
    }
}

struct CpalHandle {
    cancel: Arc<AtomicBool>,
    position: Arc<AtomicUsize>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackHandle for CpalHandle {
    fn stop(mut self: Box<Self>) -> usize {
        self.cancel.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("engine: playback thread panicked");
            }
        }
        self.position.load(Ordering::Acquire)
    }
}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        // Dropped without stop(): the thread sees the flag and exits on its own.
        self.cancel.store(true, Ordering::Release);
    }
}

/// Body of the playback thread. Owns the cpal stream so the device is
/// released before `listener.stopped()` fires.
fn run_playback(
    pcm: PcmStream,
    position: Arc<AtomicUsize>,
    cancel: Arc<AtomicBool>,
    listener: Arc<dyn ProgressListener>,
    ready_tx: Sender<DeviceResult<()>>,
) {
    let stream = match open_stream(pcm.clone(), position.clone()) {
        Ok(s) => s,
        Err(e) => {
            log::error!("engine: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));
    listener.started();

    let total_frames = pcm.frame_count();
    let total_ms = pcm.duration_millis();
    log::debug!(
        "engine: playing {} frames from frame {}",
        total_frames,
        position.load(Ordering::Acquire)
    );

    loop {
        if cancel.load(Ordering::Acquire) {
            log::debug!("engine: playback cancelled");
            break;
        }
        let frame = position.load(Ordering::Acquire);
        if frame >= total_frames {
            log::debug!("engine: playback finished");
            break;
        }
        if !listener.update_progress(pcm.frames_to_millis(frame), total_ms) {
            log::debug!("engine: listener asked to halt");
            break;
        }
        std::thread::sleep(PROGRESS_INTERVAL);
    }

    drop(stream);
    listener.stopped();
}

fn open_stream(pcm: PcmStream, position: Arc<AtomicUsize>) -> DeviceResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(DeviceError::NoDevice)?;

    let config = device
        .default_output_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?;

    let device_rate = config.sample_rate();
    let out_channels = config.channels() as usize;
    let sample_format = config.sample_format();

    // Source frames advanced per device frame.
    let step = pcm.sample_rate() / f64::from(device_rate);
    let src_channels = pcm.channels() as usize;
    let total_frames = pcm.frame_count();
    let mut cursor = position.load(Ordering::Acquire) as f64;

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(out_channels) {
                        let src = cursor as usize;
                        if src >= total_frames || src_channels == 0 {
                            frame.fill(0.0);
                            continue;
                        }
                        for (c, out) in frame.iter_mut().enumerate() {
                            let sample = pcm.sample(src, c % src_channels);
                            *out = f32::from(sample) / 32_768.0;
                        }
                        cursor += step;
                    }
                    position.store((cursor as usize).min(total_frames), Ordering::Release);
                },
                |err| {
                    log::error!("engine: audio stream error: {err}");
                },
                None,
            )
            .map_err(|e| DeviceError::StreamBuild(e.to_string()))?,
        other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream
        .play()
        .map_err(|e| DeviceError::StreamPlay(e.to_string()))?;

    Ok(stream)
}
