use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::audio::types::PlaybackState;

/// Notifications sent from the session to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(PlaybackState),
    BufferLoaded {
        title: String,
        path: PathBuf,
        duration: f64,
    },
    /// Live position as a fraction of the track.
    Progress(f64),
    MarkChanged(Option<f64>),
    Error(String),
}

/// Fire-and-forget fan-out of [`SessionEvent`]s to any number of subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<SessionEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, dropping the ones whose
    /// receiver has gone away.
    pub fn emit(&self, event: SessionEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<SessionEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
