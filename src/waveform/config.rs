use serde::{Deserialize, Serialize};

/// RGBA colour, stored in config files as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value.trim().trim_start_matches('#');
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(format!("invalid colour {value:?}, expected #rrggbb or #rrggbbaa"));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("invalid colour {value:?}: {e}"))
        };
        Ok(Self {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 8 { byte(6)? } else { 255 },
        })
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        if c.a == 255 {
            format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)
        }
    }
}

/// How a waveform is rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformRenderConfig {
    /// Channel drawn above the centre line.
    pub top_channel: usize,
    /// Channel drawn below the centre line.
    pub bottom_channel: usize,
    /// Input samples averaged per output column.
    pub x_scale: u32,
    /// Amplitude divisor.
    pub y_scale: u32,
    /// Widest image allowed, in pixels.
    pub x_limit: u32,
    pub background_color: Color,
    pub fill_color: Color,
    /// `None` disables the outline.
    pub outline_color: Option<Color>,
    pub outline_thickness: u32,
    pub baseline_enabled: bool,
    pub baseline_color: Color,
    pub baseline_thickness: u32,
}

impl Default for WaveformRenderConfig {
    fn default() -> Self {
        Self {
            top_channel: 0,
            bottom_channel: 1,
            x_scale: 1,
            y_scale: 128,
            x_limit: 4096,
            background_color: Color::rgb(0x1f, 0x1f, 0x26),
            fill_color: Color::rgb(0x4d, 0xb3, 0xff),
            outline_color: Some(Color::rgb(0xc8, 0xe6, 0xff)),
            outline_thickness: 1,
            baseline_enabled: true,
            baseline_color: Color::rgb(0x80, 0x80, 0x8c),
            baseline_thickness: 1,
        }
    }
}

impl WaveformRenderConfig {
    /// Copy of this config whose width limit is at most `width`.
    pub fn fitted_to_width(&self, width: u32) -> Self {
        Self {
            x_limit: self.x_limit.min(width.max(1)),
            ..self.clone()
        }
    }
}

/// Supplies the render config; asked again for every synthesis.
pub trait RenderConfigSource {
    fn render_config(&self) -> WaveformRenderConfig;
}

impl RenderConfigSource for WaveformRenderConfig {
    fn render_config(&self) -> WaveformRenderConfig {
        self.clone()
    }
}

/// Clamp a channel index into range, favouring the last valid channel.
pub fn clamp_channel(index: usize, channel_count: usize) -> usize {
    index.min(channel_count.saturating_sub(1))
}
