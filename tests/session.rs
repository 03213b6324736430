use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use wavedeck::audio::error::{DeviceError, DeviceResult};
use wavedeck::audio::types::{AudioBuffer, PcmStream, PlaybackState};
use wavedeck::playback::{EventBus, OutputDevice, PlaybackHandle, PlaybackSession, ProgressListener, SessionEvent};
use wavedeck::playlist::Playlist;

/// Device that records every start and hands control of the listener to the test.
#[derive(Default)]
struct ScriptedDevice {
    starts: Mutex<Vec<usize>>,
    listeners: Mutex<Vec<Arc<dyn ProgressListener>>>,
    stops: Arc<AtomicUsize>,
    fail: AtomicBool,
    /// Frames the fake advances before being stopped.
    advance: usize,
}

struct ScriptedHandle {
    frame: usize,
    stops: Arc<AtomicUsize>,
}

impl PlaybackHandle for ScriptedHandle {
    fn stop(self: Box<Self>) -> usize {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.frame
    }
}

impl OutputDevice for ScriptedDevice {
    fn start(
        &self,
        _stream: PcmStream,
        start_frame: usize,
        listener: Arc<dyn ProgressListener>,
    ) -> DeviceResult<Box<dyn PlaybackHandle>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeviceError::NoDevice);
        }
        self.starts.lock().unwrap().push(start_frame);
        listener.started();
        self.listeners.lock().unwrap().push(listener);
        Ok(Box::new(ScriptedHandle {
            frame: start_frame + self.advance,
            stops: self.stops.clone(),
        }))
    }
}

impl ScriptedDevice {
    fn starts(&self) -> Vec<usize> {
        self.starts.lock().unwrap().clone()
    }

    fn last_listener(&self) -> Arc<dyn ProgressListener> {
        self.listeners.lock().unwrap().last().cloned().unwrap()
    }
}

fn ten_second_buffer(name: &str) -> Arc<AudioBuffer> {
    Arc::new(AudioBuffer::new(vec![vec![0i16; 441_000]], 44_100.0, name))
}

fn setup(device: Arc<ScriptedDevice>) -> (PlaybackSession, Arc<Mutex<Playlist>>, Receiver<SessionEvent>) {
    let playlist = Arc::new(Mutex::new(Playlist::new()));
    let session = PlaybackSession::new(playlist.clone(), device, EventBus::new());
    let events = session.subscribe();
    (session, playlist, events)
}

fn drain(events: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
    events.try_iter().collect()
}

#[test]
fn mark_selects_the_start_frame() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, _events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    session.set_mark(0.5);
    assert_eq!(session.start_offset_frames(), 220_500);

    session.play();

    assert_eq!(device.starts(), vec![220_500]);
    assert_eq!(session.state(), PlaybackState::Playing);
}

#[test]
fn play_without_mark_starts_at_zero() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, _events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    session.play();
    session.play();

    assert_eq!(device.starts(), vec![0]);
}

#[test]
fn stop_is_idempotent() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    session.play();
    session.stop();
    session.stop();

    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(device.stops.load(Ordering::SeqCst), 1);
    let idles = drain(&events)
        .into_iter()
        .filter(|e| *e == SessionEvent::StateChanged(PlaybackState::Idle))
        .count();
    assert_eq!(idles, 1);
}

#[test]
fn stop_while_idle_does_nothing() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, events) = setup(device.clone());

    session.stop();

    assert_eq!(session.state(), PlaybackState::Idle);
    assert!(drain(&events).is_empty());
}

#[test]
fn next_on_empty_playlist_stays_idle() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, _events) = setup(device.clone());

    session.next();
    session.prev();

    assert_eq!(session.state(), PlaybackState::Idle);
    assert!(session.buffer().is_none());
    assert!(device.starts().is_empty());
}

#[test]
fn play_loads_the_selected_track() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, playlist, events) = setup(device.clone());
    playlist.lock().unwrap().add(ten_second_buffer("first.wav"));

    session.play();

    assert_eq!(session.buffer().unwrap().title(), "first");
    assert_eq!(device.starts(), vec![0]);
    let events = drain(&events);
    assert!(matches!(&events[0], SessionEvent::BufferLoaded { title, duration, .. }
        if title == "first" && *duration == 10.0));
    assert_eq!(events[1], SessionEvent::StateChanged(PlaybackState::Playing));
}

#[test]
fn next_and_prev_walk_the_playlist() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, playlist, _events) = setup(device.clone());
    {
        let mut playlist = playlist.lock().unwrap();
        playlist.add(ten_second_buffer("a.wav"));
        playlist.add(ten_second_buffer("b.wav"));
    }

    session.next();
    assert_eq!(session.buffer().unwrap().title(), "b");
    assert_eq!(session.state(), PlaybackState::Playing);

    // End of the list: nothing changes.
    session.next();
    assert_eq!(session.buffer().unwrap().title(), "b");

    session.prev();
    assert_eq!(session.buffer().unwrap().title(), "a");
    assert_eq!(device.starts().len(), 2);
    assert_eq!(device.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn device_failure_returns_to_idle() {
    let device = Arc::new(ScriptedDevice::default());
    device.fail.store(true, Ordering::SeqCst);
    let (session, _, events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    session.play();

    assert_eq!(session.state(), PlaybackState::Idle);
    let events = drain(&events);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Error(_))));
    assert_eq!(events.last(), Some(&SessionEvent::StateChanged(PlaybackState::Idle)));
}

#[test]
fn progress_from_a_stopped_playback_is_ignored() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    session.play();
    let listener = device.last_listener();
    assert!(listener.update_progress(2_500, 10_000));
    assert_eq!(session.position(), 0.25);

    session.stop();
    assert!(!listener.update_progress(5_000, 10_000));
    listener.stopped();

    let events = drain(&events);
    let idle = events
        .iter()
        .position(|e| *e == SessionEvent::StateChanged(PlaybackState::Idle))
        .unwrap();
    assert!(events[idle..]
        .iter()
        .all(|e| !matches!(e, SessionEvent::Progress(_))));
    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(session.position(), 0.0);
}

#[test]
fn reaching_the_end_returns_to_idle() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    session.play();
    device.last_listener().stopped();

    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(
        drain(&events).last(),
        Some(&SessionEvent::StateChanged(PlaybackState::Idle))
    );

    // A fresh play is accepted afterwards.
    session.play();
    assert_eq!(device.starts().len(), 2);
}

#[test]
fn pause_and_resume_continue_from_the_reached_frame() {
    let device = Arc::new(ScriptedDevice {
        advance: 4_410,
        ..Default::default()
    });
    let (session, _, _events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    session.toggle();
    session.toggle();
    assert_eq!(session.state(), PlaybackState::Paused);
    assert_eq!(session.position(), 0.01);

    // play() only starts from idle.
    session.play();
    assert_eq!(device.starts(), vec![0]);

    session.toggle();
    assert_eq!(session.state(), PlaybackState::Playing);
    assert_eq!(device.starts(), vec![0, 4_410]);
}

#[test]
fn seek_while_playing_restarts_at_the_mark() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, _events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    session.play();
    session.seek(0.25);

    assert_eq!(session.state(), PlaybackState::Playing);
    assert_eq!(session.mark(), Some(0.25));
    assert_eq!(device.starts(), vec![0, 110_250]);
}

#[test]
fn seek_while_idle_only_moves_the_mark() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, events) = setup(device.clone());

    session.load(ten_second_buffer("ten.wav"));
    drain(&events);
    session.seek(0.75);

    assert!(device.starts().is_empty());
    assert_eq!(drain(&events), vec![SessionEvent::MarkChanged(Some(0.75))]);
}

#[test]
fn loading_clears_the_mark() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, _events) = setup(device.clone());

    session.load(ten_second_buffer("a.wav"));
    session.set_mark(0.4);
    session.load(ten_second_buffer("b.wav"));

    assert_eq!(session.mark(), None);
    assert_eq!(session.start_offset_frames(), 0);
}

#[test]
fn empty_buffer_is_not_played() {
    let device = Arc::new(ScriptedDevice::default());
    let (session, _, _events) = setup(device.clone());

    session.load(Arc::new(AudioBuffer::new(vec![Vec::new()], 44_100.0, "empty.wav")));
    session.play();

    assert_eq!(session.state(), PlaybackState::Idle);
    assert!(device.starts().is_empty());
}

/// Device that reports progress from its own thread until told to stop.
struct ThreadedDevice;

struct ThreadedHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<usize>>,
}

impl PlaybackHandle for ThreadedHandle {
    fn stop(mut self: Box<Self>) -> usize {
        self.cancel.store(true, Ordering::SeqCst);
        self.thread.take().map_or(0, |t| t.join().unwrap_or(0))
    }
}

impl OutputDevice for ThreadedDevice {
    fn start(
        &self,
        stream: PcmStream,
        start_frame: usize,
        listener: Arc<dyn ProgressListener>,
    ) -> DeviceResult<Box<dyn PlaybackHandle>> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let thread = std::thread::spawn(move || {
            listener.started();
            let total = stream.duration_millis();
            let mut frame = start_frame;
            while !flag.load(Ordering::SeqCst) && frame < stream.frame_count() {
                frame += 441;
                if !listener.update_progress(stream.frames_to_millis(frame), total) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            listener.stopped();
            frame
        });
        Ok(Box::new(ThreadedHandle {
            cancel,
            thread: Some(thread),
        }))
    }
}

#[test]
fn no_progress_after_stop_with_a_live_thread() {
    let playlist = Arc::new(Mutex::new(Playlist::new()));
    let session = PlaybackSession::new(playlist, Arc::new(ThreadedDevice), EventBus::new());
    let events = session.subscribe();

    session.load(ten_second_buffer("ten.wav"));
    session.play();

    let got_progress = (0..200).any(|_| {
        matches!(
            events.recv_timeout(Duration::from_secs(1)),
            Ok(SessionEvent::Progress(_))
        )
    });
    assert!(got_progress);

    session.stop();
    std::thread::sleep(Duration::from_millis(20));

    let rest = drain(&events);
    let idle = rest
        .iter()
        .position(|e| *e == SessionEvent::StateChanged(PlaybackState::Idle))
        .unwrap();
    assert!(rest[idle + 1..].is_empty());
    assert_eq!(session.state(), PlaybackState::Idle);
}
