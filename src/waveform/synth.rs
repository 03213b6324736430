//! Two-pass waveform rendering.
//!
//! Both passes walk the two selected channels in lockstep and average
//! `|sample| / y_scale` over windows of `x_scale + 1` samples: a window is
//! flushed once its sample count exceeds `x_scale`. Samples left over at the
//! end that never fill a window are not drawn.
//!
//! Pass one finds the tallest window above and below the centre line, which
//! fixes the image height. Pass two paints one column per window.

use image::{Rgba, RgbaImage};

use super::config::{clamp_channel, WaveformRenderConfig};
use crate::audio::types::AudioBuffer;

/// Height used when the input is silent.
pub const MIN_HEIGHT: u32 = 100;

/// A rendered waveform. Never mutated after synthesis.
#[derive(Debug, Clone)]
pub struct WaveformImage {
    image: RgbaImage,
    window: usize,
    center_y: u32,
}

impl WaveformImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Averaging window actually used for rendering.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Row of the centre line.
    pub fn center_y(&self) -> u32 {
        self.center_y
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA bytes, row-major.
    pub fn rgba_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Render `buffer` with `config`.
pub fn synthesize(buffer: &AudioBuffer, config: &WaveformRenderConfig) -> WaveformImage {
    let channel_count = buffer.channel_count();
    let top_index = clamp_channel(config.top_channel, channel_count);
    let bottom_index = clamp_channel(config.bottom_channel, channel_count);
    let top = buffer.channel(top_index).unwrap_or(&[]);
    let bottom = buffer.channel(bottom_index).unwrap_or(&[]);

    let frame_count = buffer.frame_count();
    let x_scale = config.x_scale.max(1) as usize;
    let y_scale = config.y_scale.max(1);

    // Pass 1: amplitude scan.
    let (max_top, max_bottom) = window_averages(top, bottom, x_scale, y_scale)
        .fold((0u32, 0u32), |(mt, mb), (t, b)| (mt.max(t), mb.max(b)));
    let (height, center_y) = match max_top + max_bottom {
        0 => (MIN_HEIGHT, MIN_HEIGHT / 2),
        h => (h, max_top),
    };

    // Width, shrinking the window when the natural width is too wide.
    let x_limit = config.x_limit.max(1) as usize;
    let natural_width = frame_count / x_scale;
    let (width, window) = if natural_width > x_limit {
        (x_limit, (frame_count / x_limit).max(1))
    } else {
        (natural_width.max(1), x_scale)
    };

    log::debug!(
        "synthesize: {} frames, channels {}/{}, {}x{} px, window {}",
        frame_count,
        top_index,
        bottom_index,
        width,
        height,
        window
    );

    // Pass 2: rendering.
    let mut image = RgbaImage::from_pixel(width as u32, height, config.background_color.to_rgba());
    let fill = config.fill_color.to_rgba();
    let outline = config.outline_color.map(|c| c.to_rgba());
    let mut previous: Option<(u32, u32)> = None;

    for (x, (avg_top, avg_bottom)) in window_averages(top, bottom, window, y_scale)
        .take(width)
        .enumerate()
    {
        let x = x as u32;
        let center = i64::from(center_y);
        draw_vline(&mut image, x, center - i64::from(avg_top), center, fill);
        draw_vline(&mut image, x, center, center + i64::from(avg_bottom), fill);

        if let Some(color) = outline {
            let (prev_top, prev_bottom) = previous.unwrap_or((avg_top, avg_bottom));
            for offset in 0..i64::from(config.outline_thickness) {
                draw_vline(
                    &mut image,
                    x,
                    center - i64::from(prev_top) - offset,
                    center - i64::from(avg_top) - offset,
                    color,
                );
                draw_vline(
                    &mut image,
                    x,
                    center + i64::from(prev_bottom) + offset,
                    center + i64::from(avg_bottom) + offset,
                    color,
                );
            }
        }
        previous = Some((avg_top, avg_bottom));
    }

    if config.baseline_enabled && config.baseline_thickness > 0 {
        let color = config.baseline_color.to_rgba();
        let first = i64::from(center_y) - i64::from(config.baseline_thickness / 2);
        for y in first..first + i64::from(config.baseline_thickness) {
            draw_hline(&mut image, y, color);
        }
    }

    WaveformImage {
        image,
        window,
        center_y,
    }
}

/// Averages of `|sample| / y_scale` over consecutive `window + 1` sample runs
/// of both channels. The trailing partial run is dropped.
fn window_averages<'a>(
    top: &'a [i16],
    bottom: &'a [i16],
    window: usize,
    y_scale: u32,
) -> impl Iterator<Item = (u32, u32)> + 'a {
    let span = window + 1;
    top.chunks_exact(span)
        .zip(bottom.chunks_exact(span))
        .map(move |(t, b)| (average(t, y_scale), average(b, y_scale)))
}

fn average(samples: &[i16], y_scale: u32) -> u32 {
    let sum: u64 = samples
        .iter()
        .map(|s| u64::from(s.unsigned_abs() as u32 / y_scale))
        .sum();
    (sum / samples.len() as u64) as u32
}

/// Vertical run between `y0` and `y1` inclusive, clipped to the image.
fn draw_vline(image: &mut RgbaImage, x: u32, y0: i64, y1: i64, color: Rgba<u8>) {
    if x >= image.width() {
        return;
    }
    let max_y = i64::from(image.height()) - 1;
    let (lo, hi) = (y0.min(y1).max(0), y0.max(y1).min(max_y));
    for y in lo..=hi {
        image.put_pixel(x, y as u32, color);
    }
}

fn draw_hline(image: &mut RgbaImage, y: i64, color: Rgba<u8>) {
    if y < 0 || y >= i64::from(image.height()) {
        return;
    }
    for x in 0..image.width() {
        image.put_pixel(x, y as u32, color);
    }
}
