pub mod controls;
pub mod debounce;
pub mod waveform;
