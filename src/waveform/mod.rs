pub mod cache;
pub mod config;
pub mod synth;

pub use cache::{RenderJob, RenderOutput, WaveformCache};
pub use config::{Color, RenderConfigSource, WaveformRenderConfig};
pub use synth::{synthesize, WaveformImage};
