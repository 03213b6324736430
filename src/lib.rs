//! wavedeck - desktop audio player with a rendered waveform display.
//!
//! Files are decoded into per-channel 16-bit buffers (`audio`), drawn as a
//! waveform image (`waveform`) and played through a transport session
//! (`playback`) that runs the output device on its own thread.

pub mod app;
pub mod audio;
pub mod config;
pub mod loader;
pub mod playback;
pub mod playlist;
pub mod ui;
pub mod waveform;
