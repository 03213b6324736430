//! Background track loader
//!
//! Decoding (and MP3 conversion in particular) can take seconds, so it runs
//! on a dedicated thread. Requests go in over one channel; progress and
//! results come back over another. Each request carries a [`CancelToken`]
//! that the decoder checks at every progress step.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::audio::decoder;
use crate::audio::types::{AudioBuffer, LoadProgress};

/// Cooperative cancellation flag shared with a running decode.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct LoadRequest {
    id: u64,
    path: PathBuf,
    cancel: CancelToken,
}

/// Events sent back from the loader thread.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    Progress {
        id: u64,
        progress: LoadProgress,
    },
    Finished {
        id: u64,
        result: Result<Arc<AudioBuffer>, String>,
    },
}

/// Handle to the background loader thread.
pub struct TrackLoader {
    tx: Option<Sender<LoadRequest>>,
    rx: Receiver<LoadEvent>,
    next_id: u64,
    /// Cancelled on drop; stops the running decode and skips queued ones.
    shutdown: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl TrackLoader {
    /// Spawn the loader thread.
    pub fn spawn() -> std::io::Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<LoadRequest>();
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<LoadEvent>();
        let shutdown = CancelToken::new();

        let handle = {
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("track-loader".into())
                .spawn(move || loader_thread(request_rx, event_tx, shutdown))?
        };

        Ok(Self {
            tx: Some(request_tx),
            rx: event_rx,
            next_id: 0,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Queue `path` for decoding. Returns the request id and its cancel token.
    pub fn load(&mut self, path: PathBuf) -> (u64, CancelToken) {
        self.next_id += 1;
        let id = self.next_id;
        let cancel = CancelToken::new();

        log::info!("loader: queued {:?} as request {}", path, id);
        let request = LoadRequest {
            id,
            path,
            cancel: cancel.clone(),
        };
        let sent = self.tx.as_ref().map(|tx| tx.send(request).is_ok());
        if sent != Some(true) {
            log::error!("loader: thread is gone, request {} dropped", id);
        }
        (id, cancel)
    }

    /// Next pending event, if any.
    pub fn try_recv(&self) -> Option<LoadEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for TrackLoader {
    fn drop(&mut self) {
        self.shutdown.cancel();
        // Closing the request channel ends the thread's loop.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn loader_thread(requests: Receiver<LoadRequest>, events: Sender<LoadEvent>, shutdown: CancelToken) {
    log::info!("loader: thread started");

    for request in requests {
        if shutdown.is_cancelled() {
            log::info!("loader: shutting down, dropping queued requests");
            break;
        }
        let LoadRequest { id, path, cancel } = request;
        log::info!("loader: decoding {:?} (request {})", path, id);

        let result = decoder::decode_file_with_progress(&path, &mut |progress| {
            let _ = events.send(LoadEvent::Progress { id, progress });
            !cancel.is_cancelled() && !shutdown.is_cancelled()
        });

        let result = result.map(Arc::new).map_err(|e| {
            log::warn!("loader: failed to decode {:?}: {}", path, e);
            e.to_string()
        });
        if events.send(LoadEvent::Finished { id, result }).is_err() {
            break;
        }
    }

    log::info!("loader: thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(loader: &TrackLoader, want: u64) -> Result<Arc<AudioBuffer>, String> {
        loop {
            match loader.rx.recv().ok() {
                Some(LoadEvent::Finished { id, result }) if id == want => return result,
                Some(_) => continue,
                None => panic!("loader thread went away"),
            }
        }
    }

    #[test]
    fn loads_a_wav_in_the_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..400i16 {
            writer.write_sample(i).unwrap();
        }
        writer.finalize().unwrap();

        let mut loader = TrackLoader::spawn().unwrap();
        let (id, _cancel) = loader.load(path);
        let buffer = finished(&loader, id).unwrap();

        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frame_count(), 200);
        assert_eq!(buffer.sample_rate(), 22_050.0);
    }

    #[test]
    fn failures_come_back_as_messages() {
        let mut loader = TrackLoader::spawn().unwrap();
        let (first, _) = loader.load(PathBuf::from("/no/such/file.wav"));
        let (second, _) = loader.load(PathBuf::from("/no/such/other.wav"));

        assert!(second > first);
        assert!(finished(&loader, first).is_err());
        assert!(finished(&loader, second).is_err());
    }

    #[test]
    fn dropping_the_loader_signals_shutdown() {
        let mut loader = TrackLoader::spawn().unwrap();
        loader.load(PathBuf::from("/no/such/file.wav"));
        let shutdown = loader.shutdown.clone();

        drop(loader);

        assert!(shutdown.is_cancelled());
    }

    #[test]
    fn shutdown_skips_queued_requests() {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        request_tx
            .send(LoadRequest {
                id: 1,
                path: PathBuf::from("/no/such/file.wav"),
                cancel: CancelToken::new(),
            })
            .unwrap();
        drop(request_tx);

        let shutdown = CancelToken::new();
        shutdown.cancel();
        loader_thread(request_rx, event_tx, shutdown);

        assert!(event_rx.try_recv().is_err());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
