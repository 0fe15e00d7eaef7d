use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Straight (non-premultiplied) RGBA8 colour.
///
/// Serialized as `#rrggbbaa` so project files stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::from_rgb(0, 0, 0);
    pub const WHITE: Color = Color::from_rgb(255, 255, 255);

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// `#rrggbb` without alpha, for SVG `fill`/`stroke` attributes.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn opacity(self) -> f32 {
        self.a as f32 / 255.0
    }

    pub fn is_opaque(self) -> bool {
        self.a == 255
    }

    /// Flattens the colour onto an opaque background.
    pub fn blend_over(self, background: Color) -> Color {
        let alpha = self.opacity();
        let mix = |fg: u8, bg: u8| -> u8 {
            (fg as f32 * alpha + bg as f32 * (1.0 - alpha)).round() as u8
        };
        Color::from_rgb(
            mix(self.r, background.r),
            mix(self.g, background.g),
            mix(self.b, background.b),
        )
    }

    /// Normalised `[r, g, b]` components, as PDF colour operators expect.
    pub fn to_unit_rgb(self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r, self.g, self.b, self.a
        )
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| format!("colour `{s}` must start with '#'"))?;
        if !hex.is_ascii() {
            return Err(format!("colour `{s}` is not hexadecimal"));
        }

        let channel = |range: std::ops::Range<usize>| -> Result<u8, String> {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|err| format!("colour `{s}` is not hexadecimal: {err}"))
        };

        match hex.len() {
            6 => Ok(Color::from_rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Ok(Color::from_rgba(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => Err(format!("colour `{s}` must be #rrggbb or #rrggbbaa")),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}
