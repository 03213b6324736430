//! Playback state coordinator.
//!
//! The session owns the loaded buffer, the handle of the running playback
//! operation and the user's mark. Transport commands arrive from the UI
//! thread while progress arrives from the playback thread; both go through
//! one mutex. Every playback operation is tagged with a generation number so
//! that callbacks from an operation that has since been stopped, paused or
//! replaced are ignored.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crossbeam_channel::Receiver;

use super::device::{OutputDevice, PlaybackHandle, ProgressListener};
use super::events::{EventBus, SessionEvent};
use crate::audio::decoder;
use crate::audio::types::{AudioBuffer, PcmStream, PlaybackState};
use crate::playlist::PlaylistSource;

/// Handle to the playback session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PlaybackSession {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<SessionState>,
    playlist: Arc<dyn PlaylistSource>,
    device: Arc<dyn OutputDevice>,
    events: EventBus,
}

struct LoadedTrack {
    buffer: Arc<AudioBuffer>,
    stream: PcmStream,
}

struct SessionState {
    status: PlaybackState,
    track: Option<LoadedTrack>,
    position: f64,
    mark: Option<f64>,
    paused_at: usize,
    handle: Option<Box<dyn PlaybackHandle>>,
    generation: u64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Convert a progress report into a position fraction in `[0, 1]`.
pub fn progress_fraction(elapsed_millis: u64, total_millis: u64) -> f64 {
    if total_millis == 0 {
        return 0.0;
    }
    (elapsed_millis as f64 / total_millis as f64).clamp(0.0, 1.0)
}

/// A mark of zero (or anything that is not a finite number) means "unset".
fn normalize_mark(fraction: f64) -> Option<f64> {
    if fraction.is_finite() && fraction > 0.0 {
        Some(fraction.min(1.0))
    } else {
        None
    }
}

impl PlaybackSession {
    pub fn new(
        playlist: Arc<dyn PlaylistSource>,
        device: Arc<dyn OutputDevice>,
        events: EventBus,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    status: PlaybackState::Idle,
                    track: None,
                    position: 0.0,
                    mark: None,
                    paused_at: 0,
                    handle: None,
                    generation: 0,
                }),
                playlist,
                device,
                events,
            }),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.lock().status
    }

    /// Live playback position as a fraction of the track.
    pub fn position(&self) -> f64 {
        self.shared.lock().position
    }

    pub fn mark(&self) -> Option<f64> {
        self.shared.lock().mark
    }

    pub fn buffer(&self) -> Option<Arc<AudioBuffer>> {
        self.shared.lock().track.as_ref().map(|t| t.buffer.clone())
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Frame the next `play()` would start from.
    pub fn start_offset_frames(&self) -> usize {
        let state = self.shared.lock();
        match (&state.track, state.mark) {
            (Some(track), Some(mark)) => track.buffer.frame_at_fraction(mark),
            _ => 0,
        }
    }

    /// Replace the current buffer, stopping playback first. Clears the mark.
    pub fn load(&self, buffer: Arc<AudioBuffer>) {
        self.stop();

        let stream = decoder::encode_stream(&buffer);
        let mut state = self.shared.lock();
        state.track = Some(LoadedTrack {
            buffer: buffer.clone(),
            stream,
        });
        state.mark = None;
        state.position = 0.0;
        state.paused_at = 0;

        log::info!(
            "session: loaded {:?} ({} frames)",
            buffer.source_path(),
            buffer.frame_count()
        );
        self.shared.events.emit(SessionEvent::BufferLoaded {
            title: buffer.title(),
            path: buffer.source_path().to_path_buf(),
            duration: buffer.duration(),
        });
    }

    /// Start playback from the mark (or the beginning). No-op unless idle.
    ///
    /// With nothing loaded, the playlist's selected track is loaded first.
    pub fn play(&self) {
        let status = self.state();
        if status != PlaybackState::Idle {
            log::debug!("session: play ignored while {:?}", status);
            return;
        }

        let has_track = self.shared.lock().track.is_some();
        if !has_track {
            match self.shared.playlist.selected() {
                Some(buffer) => self.load(buffer),
                None => {
                    log::info!("session: nothing to play");
                    return;
                }
            }
        }

        self.start(PlaybackState::Idle);
    }

    /// Continue a paused playback from where it stopped.
    pub fn resume(&self) {
        self.start(PlaybackState::Paused);
    }

    pub fn toggle(&self) {
        match self.state() {
            PlaybackState::Idle => self.play(),
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.resume(),
        }
    }

    fn start(&self, from: PlaybackState) {
        let (stream, start_frame, generation) = {
            let mut state = self.shared.lock();
            if state.status != from {
                return;
            }
            let Some(track) = state.track.as_ref() else {
                return;
            };
            if !track.buffer.is_playable() {
                log::warn!("session: {:?} has no frames", track.buffer.source_path());
                return;
            }

            let frames = track.buffer.frame_count();
            let start_frame = match from {
                PlaybackState::Paused => state.paused_at,
                _ => state.mark.map_or(0, |m| track.buffer.frame_at_fraction(m)),
            }
            .min(frames);
            let stream = track.stream.clone();

            state.generation += 1;
            state.status = PlaybackState::Playing;
            state.position = start_frame as f64 / frames as f64;
            self.shared
                .events
                .emit(SessionEvent::StateChanged(PlaybackState::Playing));
            (stream, start_frame, state.generation)
        };

        log::info!("session: starting playback at frame {}", start_frame);
        let listener = Arc::new(SessionListener {
            shared: Arc::downgrade(&self.shared),
            generation,
        });

        match self.shared.device.start(stream, start_frame, listener) {
            Ok(handle) => {
                let mut state = self.shared.lock();
                if state.generation == generation && state.status == PlaybackState::Playing {
                    state.handle = Some(handle);
                } else {
                    drop(state);
                    log::debug!("session: playback {} superseded before it registered", generation);
                    handle.stop();
                }
            }
            Err(e) => {
                log::error!("session: failed to start playback: {}", e);
                let mut state = self.shared.lock();
                if state.generation == generation {
                    state.status = PlaybackState::Idle;
                    state.position = 0.0;
                    self.shared.events.emit(SessionEvent::Error(e.to_string()));
                    self.shared
                        .events
                        .emit(SessionEvent::StateChanged(PlaybackState::Idle));
                }
            }
        }
    }

    /// Halt playback and return to idle. Safe to call repeatedly.
    pub fn stop(&self) {
        let (handle, generation) = {
            let mut state = self.shared.lock();
            if state.status == PlaybackState::Idle {
                log::debug!("session: stop ignored, already idle");
                return;
            }
            state.generation += 1;
            (state.handle.take(), state.generation)
        };

        // The device is released before the session reports idle.
        if let Some(handle) = handle {
            handle.stop();
        }

        let mut state = self.shared.lock();
        if state.generation == generation && state.status != PlaybackState::Idle {
            state.status = PlaybackState::Idle;
            state.position = 0.0;
            state.paused_at = 0;
            log::info!("session: stopped");
            self.shared
                .events
                .emit(SessionEvent::StateChanged(PlaybackState::Idle));
        }
    }

    /// Halt playback but keep the buffer and position for `resume()`.
    pub fn pause(&self) {
        let (handle, generation) = {
            let mut state = self.shared.lock();
            if state.status != PlaybackState::Playing {
                return;
            }
            state.generation += 1;
            (state.handle.take(), state.generation)
        };

        let reached = handle.map(|h| h.stop());

        let mut state = self.shared.lock();
        if state.generation != generation || state.status != PlaybackState::Playing {
            return;
        }
        let Some(track) = state.track.as_ref() else {
            return;
        };
        let frames = track.buffer.frame_count();
        let frame = reached
            .unwrap_or_else(|| track.buffer.frame_at_fraction(state.position))
            .min(frames);

        state.status = PlaybackState::Paused;
        state.paused_at = frame;
        state.position = frame as f64 / frames.max(1) as f64;
        log::info!("session: paused at frame {}", frame);
        self.shared
            .events
            .emit(SessionEvent::StateChanged(PlaybackState::Paused));
    }

    pub fn next(&self) {
        let track = self.shared.playlist.next();
        self.switch_to(track, "next");
    }

    pub fn prev(&self) {
        let track = self.shared.playlist.prev();
        self.switch_to(track, "previous");
    }

    fn switch_to(&self, track: Option<Arc<AudioBuffer>>, which: &str) {
        match track {
            Some(buffer) => {
                self.load(buffer);
                self.play();
            }
            None => log::info!("session: no {} track", which),
        }
    }

    /// Set the start position for the next `play()`. Zero clears the mark.
    pub fn set_mark(&self, fraction: f64) {
        let mark = normalize_mark(fraction);
        self.shared.lock().mark = mark;
        log::debug!("session: mark set to {:?}", mark);
        self.shared.events.emit(SessionEvent::MarkChanged(mark));
    }

    pub fn clear_mark(&self) {
        self.set_mark(0.0);
    }

    /// Move to `fraction`: sets the mark and restarts playback there if playing.
    pub fn seek(&self, fraction: f64) {
        self.set_mark(fraction);
        match self.state() {
            PlaybackState::Playing => {
                self.stop();
                self.play();
            }
            PlaybackState::Paused => {
                let mut state = self.shared.lock();
                let target = state.mark.unwrap_or(0.0);
                let frame = state
                    .track
                    .as_ref()
                    .map(|t| t.buffer.frame_at_fraction(target));
                if let Some(frame) = frame {
                    state.paused_at = frame;
                    state.position = target;
                }
            }
            PlaybackState::Idle => {}
        }
    }
}

/// Listener handed to the device for one playback operation.
struct SessionListener {
    shared: Weak<Shared>,
    generation: u64,
}

impl ProgressListener for SessionListener {
    fn started(&self) {
        log::debug!("session: playback {} started", self.generation);
    }

    fn stopped(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        let handle = {
            let mut state = shared.lock();
            if state.generation != self.generation || state.status != PlaybackState::Playing {
                return;
            }
            state.generation += 1;
            state.status = PlaybackState::Idle;
            state.position = 0.0;
            state.paused_at = 0;
            shared
                .events
                .emit(SessionEvent::StateChanged(PlaybackState::Idle));
            state.handle.take()
        };

        // Called on the playback thread itself, so the handle is dropped
        // rather than joined.
        drop(handle);
        log::info!("session: playback reached the end");
    }

    fn update_progress(&self, elapsed_millis: u64, total_millis: u64) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };

        let mut state = shared.lock();
        if state.generation != self.generation || state.status != PlaybackState::Playing {
            return false;
        }
        let fraction = progress_fraction(elapsed_millis, total_millis);
        state.position = fraction;
        shared.events.emit(SessionEvent::Progress(fraction));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_fraction(500, 1000), 0.5);
        assert_eq!(progress_fraction(1500, 1000), 1.0);
        assert_eq!(progress_fraction(10, 0), 0.0);
    }

    #[test]
    fn zero_and_nan_marks_are_unset() {
        assert_eq!(normalize_mark(0.0), None);
        assert_eq!(normalize_mark(-0.3), None);
        assert_eq!(normalize_mark(f64::NAN), None);
        assert_eq!(normalize_mark(0.4), Some(0.4));
        assert_eq!(normalize_mark(3.0), Some(1.0));
    }
}
