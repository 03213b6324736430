//! In-memory playlist of decoded tracks.

use std::sync::{Arc, Mutex};

use crate::audio::types::AudioBuffer;

/// Track selection as seen by the playback session.
pub trait PlaylistSource: Send + Sync {
    /// The currently selected track, if any.
    fn selected(&self) -> Option<Arc<AudioBuffer>>;

    /// Move the selection forward and return the new track.
    fn next(&self) -> Option<Arc<AudioBuffer>>;

    /// Move the selection back and return the new track.
    fn prev(&self) -> Option<Arc<AudioBuffer>>;
}

/// Ordered tracks with an optional selection. Does not wrap around.
#[derive(Debug, Default)]
pub struct Playlist {
    tracks: Vec<Arc<AudioBuffer>>,
    selected: Option<usize>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track, selecting it if nothing is selected yet. Returns its index.
    pub fn add(&mut self, track: Arc<AudioBuffer>) -> usize {
        self.tracks.push(track);
        let index = self.tracks.len() - 1;
        if self.selected.is_none() {
            self.selected = Some(index);
        }
        index
    }

    pub fn select(&mut self, index: usize) -> Option<Arc<AudioBuffer>> {
        let track = self.tracks.get(index)?.clone();
        self.selected = Some(index);
        Some(track)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<Arc<AudioBuffer>> {
        self.selected.and_then(|i| self.tracks.get(i).cloned())
    }

    pub fn next(&mut self) -> Option<Arc<AudioBuffer>> {
        let index = match self.selected {
            Some(i) => i + 1,
            None => 0,
        };
        self.select(index)
    }

    pub fn prev(&mut self) -> Option<Arc<AudioBuffer>> {
        let index = self.selected?.checked_sub(1)?;
        self.select(index)
    }

    pub fn titles(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.title()).collect()
    }
}

impl PlaylistSource for Mutex<Playlist> {
    fn selected(&self) -> Option<Arc<AudioBuffer>> {
        lock(self).selected()
    }

    fn next(&self) -> Option<Arc<AudioBuffer>> {
        lock(self).next()
    }

    fn prev(&self) -> Option<Arc<AudioBuffer>> {
        lock(self).prev()
    }
}

fn lock(playlist: &Mutex<Playlist>) -> std::sync::MutexGuard<'_, Playlist> {
    playlist
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
