use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::Receiver;
use iced::keyboard;
use iced::widget::{column, container, text};
use iced::{Element, Length, Size, Subscription, Task, Theme};

use crate::audio::engine::CpalOutput;
use crate::audio::types::{LoadProgress, PlaybackState};
use crate::config::{self, PlayerConfig};
use crate::loader::{LoadEvent, TrackLoader};
use crate::playback::{EventBus, PlaybackSession, SessionEvent};
use crate::playlist::Playlist;
use crate::ui::controls::{self, ControlMessage};
use crate::ui::waveform::{self, WaveformMessage, WaveformView};
use crate::waveform::RenderOutput;

const WINDOW_SIZE: (f32, f32) = (1000.0, 480.0);
const PADDING: f32 = 10.0;

/// Application context: owns every long-lived component.
pub struct App {
    session: PlaybackSession,
    playlist: Arc<Mutex<Playlist>>,
    loader: Option<TrackLoader>,
    events: Receiver<SessionEvent>,
    config: PlayerConfig,

    // State
    status: PlaybackState,
    duration: f64,
    title: Option<String>,
    error: Option<String>,
    loading: Option<f32>,

    // Waveform
    waveform_view: WaveformView,
}

#[derive(Debug, Clone)]
pub enum Message {
    Control(ControlMessage),
    Waveform(WaveformMessage),
    Tick,
    KeyEvent(keyboard::Event),
    FileDialogResult(Option<PathBuf>),
    WaveformRendered(Result<RenderOutput, String>),
    WindowResized(Size),
}

fn boot() -> (App, Task<Message>) {
    let config_path = config::default_config_path();
    if !config_path.exists() {
        if let Err(e) = config::save_config(&PlayerConfig::default(), &config_path) {
            log::warn!("boot: could not write default config: {}", e);
        }
    }
    let config = config::load_config(&config_path);

    let playlist = Arc::new(Mutex::new(Playlist::new()));
    let bus = EventBus::new();
    let session = PlaybackSession::new(playlist.clone(), Arc::new(CpalOutput), bus);
    let events = session.subscribe();

    let (loader, error) = match TrackLoader::spawn() {
        Ok(loader) => (Some(loader), None),
        Err(e) => {
            log::error!("boot: failed to start loader thread: {}", e);
            (None, Some(format!("Loader error: {e}")))
        }
    };

    let mut waveform_view = WaveformView::new(session.clone());
    waveform_view.resized(waveform::display_width(WINDOW_SIZE.0, PADDING), Instant::now());

    let app = App {
        session,
        playlist,
        loader,
        events,
        config,
        status: PlaybackState::Idle,
        duration: 0.0,
        title: None,
        error,
        loading: None,
        waveform_view,
    };

    (app, Task::none())
}

fn title(app: &App) -> String {
    match &app.title {
        Some(name) => format!("wavedeck - {name}"),
        None => "wavedeck".to_string(),
    }
}

fn lock_playlist(app: &App) -> std::sync::MutexGuard<'_, Playlist> {
    app.playlist
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Kick off a background render if the cached waveform is stale.
fn render_task(app: &mut App) -> Task<Message> {
    match app.waveform_view.request_render(&app.config) {
        Some(job) => Task::perform(
            async move {
                tokio::task::spawn_blocking(move || job.run())
                    .await
                    .map_err(|e| format!("Waveform render failed: {e}"))
            },
            Message::WaveformRendered,
        ),
        None => Task::none(),
    }
}

fn update(app: &mut App, message: Message) -> Task<Message> {
    match message {
        Message::Control(ctrl) => {
            match ctrl {
                ControlMessage::OpenFile => {
                    return Task::perform(
                        async {
                            let handle = rfd::AsyncFileDialog::new()
                                .add_filter("Audio", &["wav", "mp3"])
                                .pick_file()
                                .await;
                            handle.map(|h| h.path().to_path_buf())
                        },
                        Message::FileDialogResult,
                    );
                }
                ControlMessage::PlayPause => app.session.toggle(),
                ControlMessage::Stop => app.session.stop(),
                ControlMessage::Prev => app.session.prev(),
                ControlMessage::Next => app.session.next(),
                ControlMessage::ClearMark => app.session.clear_mark(),
                ControlMessage::Select(index) => {
                    let track = lock_playlist(app).select(index);
                    if let Some(buffer) = track {
                        app.session.load(buffer);
                    }
                }
            }
            Task::none()
        }
        Message::FileDialogResult(path) => {
            if let (Some(path), Some(loader)) = (path, app.loader.as_mut()) {
                loader.load(path);
                app.loading = Some(0.0);
            }
            Task::none()
        }
        Message::Waveform(WaveformMessage::Seek(fraction)) => {
            app.session.seek(fraction);
            Task::none()
        }
        Message::WaveformRendered(result) => {
            match result {
                Ok(output) => app.waveform_view.install(output),
                Err(e) => {
                    log::error!("{}", e);
                    app.error = Some(e);
                }
            }
            Task::none()
        }
        Message::WindowResized(size) => {
            app.waveform_view
                .resized(waveform::display_width(size.width, PADDING), Instant::now());
            Task::none()
        }
        Message::Tick => {
            drain_loader(app);
            let mut needs_render = drain_session(app);
            needs_render |= app.waveform_view.poll_resize(Instant::now());
            if needs_render {
                render_task(app)
            } else {
                Task::none()
            }
        }
        Message::KeyEvent(key_event) => match key_event {
            keyboard::Event::KeyPressed {
                key, modifiers: _, ..
            } => match key.as_ref() {
                keyboard::Key::Named(keyboard::key::Named::Space) => {
                    update(app, Message::Control(ControlMessage::PlayPause))
                }
                keyboard::Key::Named(keyboard::key::Named::Escape) => {
                    update(app, Message::Control(ControlMessage::Stop))
                }
                keyboard::Key::Named(keyboard::key::Named::ArrowLeft) => {
                    update(app, Message::Control(ControlMessage::Prev))
                }
                keyboard::Key::Named(keyboard::key::Named::ArrowRight) => {
                    update(app, Message::Control(ControlMessage::Next))
                }
                _ => Task::none(),
            },
            _ => Task::none(),
        },
    }
}

fn drain_loader(app: &mut App) {
    let mut finished = Vec::new();
    if let Some(loader) = &app.loader {
        while let Some(event) = loader.try_recv() {
            match event {
                LoadEvent::Progress { progress, .. } => {
                    app.loading = match progress {
                        LoadProgress::Begin | LoadProgress::Major(_) => app.loading.or(Some(0.0)),
                        LoadProgress::Minor(fraction) => Some(fraction),
                        LoadProgress::Complete => None,
                    };
                }
                LoadEvent::Finished { result, .. } => finished.push(result),
            }
        }
    }

    for result in finished {
        app.loading = None;
        match result {
            Ok(buffer) => {
                app.error = None;
                {
                    let mut playlist = lock_playlist(app);
                    let index = playlist.add(buffer.clone());
                    playlist.select(index);
                }
                app.session.load(buffer);
            }
            Err(e) => app.error = Some(e),
        }
    }
}

/// Apply queued session events. Returns `true` when a render is needed.
fn drain_session(app: &mut App) -> bool {
    let mut needs_render = false;
    while let Ok(event) = app.events.try_recv() {
        needs_render |= app.waveform_view.handle_event(&event);
        match event {
            SessionEvent::StateChanged(state) => app.status = state,
            SessionEvent::BufferLoaded { title, duration, .. } => {
                app.title = Some(title);
                app.duration = duration;
            }
            SessionEvent::Error(e) => app.error = Some(e),
            SessionEvent::Progress(_) | SessionEvent::MarkChanged(_) => {}
        }
    }
    needs_render
}

fn view(app: &App) -> Element<'_, Message> {
    let controls = controls::view_controls(
        app.status,
        app.waveform_view.position,
        app.duration,
        app.waveform_view.mark.is_some(),
        app.loading,
    )
    .map(Message::Control);

    let waveform = container(
        app.waveform_view
            .view(app.config.waveform_height)
            .map(Message::Waveform),
    )
    .padding([0.0, PADDING]);

    let playlist = {
        let playlist = lock_playlist(app);
        controls::view_playlist(&playlist.titles(), playlist.selected_index())
            .map(Message::Control)
    };

    let mut content = column![controls, waveform, playlist].spacing(5);

    if let Some(err) = &app.error {
        content = content.push(
            container(text(format!("Error: {err}")).color(iced::Color::from_rgb(1.0, 0.3, 0.3)))
                .padding(10),
        );
    }

    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn subscription(_app: &App) -> Subscription<Message> {
    let tick =
        iced::time::every(std::time::Duration::from_millis(16)).map(|_| Message::Tick);

    let keys = keyboard::listen().map(Message::KeyEvent);

    let resizes = iced::window::resize_events().map(|(_, size)| Message::WindowResized(size));

    Subscription::batch([tick, keys, resizes])
}

fn theme(_app: &App) -> Theme {
    Theme::Dark
}

pub fn run() -> iced::Result {
    iced::application(boot, update, view)
        .title(title)
        .subscription(subscription)
        .theme(theme)
        .window_size(WINDOW_SIZE)
        .run()
}
