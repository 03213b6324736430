use std::sync::Arc;
use std::time::Instant;

use iced::mouse;
use iced::widget::canvas::{self, Action, Event, Frame, Geometry, Path, Stroke};
use iced::widget::{center, image, stack, text};
use iced::{Color, ContentFit, Element, Length, Rectangle, Renderer, Theme};

use super::debounce::{Debouncer, RESIZE_DEBOUNCE};
use crate::audio::types::{AudioBuffer, PlaybackState};
use crate::playback::{PlaybackSession, SessionEvent};
use crate::waveform::{RenderConfigSource, RenderJob, RenderOutput, WaveformCache};

/// Waveform display: the cached rendered image plus a live overlay for the
/// playback position and the mark.
pub struct WaveformView {
    session: PlaybackSession,
    cache: WaveformCache,
    handle: Option<image::Handle>,
    resize: Debouncer<u32>,
    pub position: f64,     // 0.0 to 1.0 fraction
    pub mark: Option<f64>, // fraction
}

/// Interactions on the waveform.
#[derive(Debug, Clone)]
pub enum WaveformMessage {
    Seek(f64), // x fraction
}

impl WaveformView {
    pub fn new(session: PlaybackSession) -> Self {
        Self {
            session,
            cache: WaveformCache::new(),
            handle: None,
            resize: Debouncer::new(RESIZE_DEBOUNCE),
            position: 0.0,
            mark: None,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn has_buffer(&self) -> bool {
        self.cache.buffer().is_some()
    }

    fn set_buffer(&mut self, buffer: Option<Arc<AudioBuffer>>) {
        self.cache.set_buffer(buffer);
        self.handle = None;
        self.position = 0.0;
        self.mark = None;
    }

    /// Apply a session event. Returns `true` when the waveform must be re-rendered.
    pub fn handle_event(&mut self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::Progress(fraction) => {
                self.position = *fraction;
                false
            }
            SessionEvent::StateChanged(PlaybackState::Idle) => {
                self.position = 0.0;
                false
            }
            SessionEvent::StateChanged(_) => false,
            SessionEvent::MarkChanged(mark) => {
                self.mark = *mark;
                false
            }
            SessionEvent::BufferLoaded { .. } => {
                self.set_buffer(self.session.buffer());
                true
            }
            SessionEvent::Error(_) => false,
        }
    }

    /// Record a new display width; the re-render waits for the debounce.
    pub fn resized(&mut self, width: u32, now: Instant) {
        self.resize.push(width, now);
    }

    /// Returns `true` once a debounced width has been applied.
    pub fn poll_resize(&mut self, now: Instant) -> bool {
        match self.resize.poll(now) {
            Some(width) => {
                log::debug!("waveform: display width now {} px", width);
                self.cache.set_display_width(width);
                true
            }
            None => false,
        }
    }

    pub fn request_render(&mut self, source: &dyn RenderConfigSource) -> Option<RenderJob> {
        self.cache.render_job(source)
    }

    pub fn install(&mut self, output: RenderOutput) {
        if !self.cache.complete(output) {
            return;
        }
        if let Some(rendered) = self.cache.image() {
            self.handle = Some(image::Handle::from_rgba(
                rendered.width(),
                rendered.height(),
                rendered.rgba_bytes().to_vec(),
            ));
        }
    }

    pub fn view(&self, height: f32) -> Element<'_, WaveformMessage> {
        if !self.has_buffer() {
            return center(text("Open an audio file to begin").size(18))
                .width(Length::Fill)
                .height(Length::Fixed(height))
                .into();
        }

        let overlay = canvas::Canvas::new(self)
            .width(Length::Fill)
            .height(Length::Fixed(height));

        match &self.handle {
            Some(handle) => stack![
                image(handle.clone())
                    .content_fit(ContentFit::Fill)
                    .width(Length::Fill)
                    .height(Length::Fixed(height)),
                overlay
            ]
            .into(),
            None => stack![
                center(text("Rendering waveform...").size(14))
                    .width(Length::Fill)
                    .height(Length::Fixed(height)),
                overlay
            ]
            .into(),
        }
    }
}

/// Width handed to the cache for a window of `window_width` logical pixels.
pub fn display_width(window_width: f32, padding: f32) -> u32 {
    (window_width - 2.0 * padding).max(1.0) as u32
}

impl canvas::Program<WaveformMessage> for WaveformView {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let width = bounds.width;
        let height = bounds.height;
        let mut frame = Frame::new(renderer, bounds.size());

        // Mark
        if let Some(mark) = self.mark {
            let x = (mark * width as f64) as f32;
            let line = Path::line(iced::Point::new(x, 0.0), iced::Point::new(x, height));
            frame.stroke(
                &line,
                Stroke::default()
                    .with_color(Color::from_rgba(1.0, 0.8, 0.0, 0.9))
                    .with_width(1.0),
            );
        }

        // Playhead
        let playhead_x = (self.position * width as f64) as f32;
        let playhead = Path::line(
            iced::Point::new(playhead_x, 0.0),
            iced::Point::new(playhead_x, height),
        );
        frame.stroke(
            &playhead,
            Stroke::default()
                .with_color(Color::from_rgb(1.0, 1.0, 1.0))
                .with_width(2.0),
        );

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        _state: &mut Self::State,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<Action<WaveformMessage>> {
        let cursor_pos = cursor.position_in(bounds)?;

        match event {
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                let frac = (cursor_pos.x / bounds.width) as f64;
                let frac = frac.clamp(0.0, 1.0);
                Some(Action::publish(WaveformMessage::Seek(frac)).and_capture())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::audio::error::{DeviceError, DeviceResult};
    use crate::audio::types::PcmStream;
    use crate::playback::{EventBus, OutputDevice, PlaybackHandle, ProgressListener};
    use crate::playlist::Playlist;
    use crate::waveform::WaveformRenderConfig;

    struct NoDevice;

    impl OutputDevice for NoDevice {
        fn start(
            &self,
            _stream: PcmStream,
            _start_frame: usize,
            _listener: Arc<dyn ProgressListener>,
        ) -> DeviceResult<Box<dyn PlaybackHandle>> {
            Err(DeviceError::NoDevice)
        }
    }

    fn view() -> WaveformView {
        let session = PlaybackSession::new(
            Arc::new(Mutex::new(Playlist::new())),
            Arc::new(NoDevice),
            EventBus::new(),
        );
        WaveformView::new(session)
    }

    #[test]
    fn loading_a_buffer_requests_a_render() {
        let mut view = view();
        let buffer = Arc::new(AudioBuffer::new(vec![vec![100; 4_000]], 44_100.0, "a.wav"));
        view.session().load(buffer);

        let event = SessionEvent::BufferLoaded {
            title: "a".into(),
            path: "a.wav".into(),
            duration: 0.09,
        };
        assert!(view.handle_event(&event));
        assert!(view.has_buffer());

        let config = WaveformRenderConfig::default();
        let job = view.request_render(&config).expect("render job");
        view.install(job.run());
        assert!(view.request_render(&config).is_none());
    }

    #[test]
    fn progress_and_mark_events_move_the_overlay() {
        let mut view = view();
        assert!(!view.handle_event(&SessionEvent::Progress(0.3)));
        assert!(!view.handle_event(&SessionEvent::MarkChanged(Some(0.7))));
        assert_eq!(view.position, 0.3);
        assert_eq!(view.mark, Some(0.7));

        view.handle_event(&SessionEvent::StateChanged(PlaybackState::Idle));
        assert_eq!(view.position, 0.0);
        assert_eq!(view.mark, Some(0.7));
    }

    #[test]
    fn resize_applies_after_the_debounce() {
        let mut view = view();
        let start = Instant::now();
        view.resized(640, start);
        view.resized(700, start + Duration::from_millis(30));
        assert!(!view.poll_resize(start + Duration::from_millis(60)));
        assert!(view.poll_resize(start + Duration::from_millis(140)));
        assert!(!view.poll_resize(start + Duration::from_millis(300)));
    }

    #[test]
    fn display_width_subtracts_padding() {
        assert_eq!(display_width(1000.0, 10.0), 980);
        assert_eq!(display_width(5.0, 10.0), 1);
    }
}
