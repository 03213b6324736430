use std::sync::Arc;

use super::config::{RenderConfigSource, WaveformRenderConfig};
use super::synth::{synthesize, WaveformImage};
use crate::audio::types::AudioBuffer;

/// Lazily rendered waveform for one buffer.
///
/// The image is dropped whenever the buffer, the display width or the render
/// config changes, and rebuilt on the next request. Images are swapped in
/// whole; an in-flight render whose inputs went stale is discarded.
#[derive(Default)]
pub struct WaveformCache {
    buffer: Option<Arc<AudioBuffer>>,
    display_width: Option<u32>,
    image: Option<(WaveformRenderConfig, Arc<WaveformImage>)>,
    pending: Option<(u64, WaveformRenderConfig)>,
    revision: u64,
}

/// A render that can run on any thread.
pub struct RenderJob {
    revision: u64,
    buffer: Arc<AudioBuffer>,
    config: WaveformRenderConfig,
}

impl RenderJob {
    pub fn run(self) -> RenderOutput {
        let started = std::time::Instant::now();
        let image = synthesize(&self.buffer, &self.config);
        log::info!(
            "waveform: rendered {}x{} for {:?} in {:?}",
            image.width(),
            image.height(),
            self.buffer.source_path(),
            started.elapsed()
        );
        RenderOutput {
            revision: self.revision,
            image: Arc::new(image),
        }
    }
}

/// Result of a [`RenderJob`], handed back to [`WaveformCache::complete`].
#[derive(Debug, Clone)]
pub struct RenderOutput {
    revision: u64,
    image: Arc<WaveformImage>,
}

impl WaveformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn set_buffer(&mut self, buffer: Option<Arc<AudioBuffer>>) {
        self.buffer = buffer;
        self.invalidate();
    }

    /// Fit future renders to `width` pixels.
    pub fn set_display_width(&mut self, width: u32) {
        if self.display_width != Some(width) {
            self.display_width = Some(width);
            self.invalidate();
        }
    }

    pub fn invalidate(&mut self) {
        self.image = None;
        self.pending = None;
    }

    /// The current image without triggering a render.
    pub fn image(&self) -> Option<&Arc<WaveformImage>> {
        self.image.as_ref().map(|(_, image)| image)
    }

    fn effective_config(&self, source: &dyn RenderConfigSource) -> WaveformRenderConfig {
        let config = source.render_config();
        match self.display_width {
            Some(width) => config.fitted_to_width(width),
            None => config,
        }
    }

    fn is_current(&self, config: &WaveformRenderConfig) -> bool {
        matches!(&self.image, Some((rendered, _)) if rendered == config)
    }

    /// A job rendering the current inputs, unless the image is already up to
    /// date or an identical job is in flight.
    pub fn render_job(&mut self, source: &dyn RenderConfigSource) -> Option<RenderJob> {
        let buffer = self.buffer.clone()?;
        let config = self.effective_config(source);
        if self.is_current(&config) {
            return None;
        }
        if matches!(&self.pending, Some((_, pending)) if *pending == config) {
            return None;
        }

        self.revision += 1;
        self.pending = Some((self.revision, config.clone()));
        Some(RenderJob {
            revision: self.revision,
            buffer,
            config,
        })
    }

    /// Install a finished render. Returns `false` if it was superseded.
    pub fn complete(&mut self, output: RenderOutput) -> bool {
        match self.pending.take() {
            Some((revision, config)) if revision == output.revision => {
                self.image = Some((config, output.image));
                true
            }
            other => {
                self.pending = other;
                log::debug!("waveform: discarding stale render {}", output.revision);
                false
            }
        }
    }
}
