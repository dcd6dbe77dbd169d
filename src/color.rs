//! Color Science - Parsing, Compositing, Contrast
//!
//! Pure functions. Parsing covers a fixed literal grammar:
//! hex, rgb()/rgba(), hsl()/hsla(), oklch() and `transparent`.

use serde::{Deserialize, Serialize};

/// WCAG luminance weights for linear R, G, B.
const LUMA_WEIGHTS: [f64; 3] = [0.2126, 0.7152, 0.0722];

/// An sRGB color after parsing, before any compositing.
/// Channels are gamma-encoded in [0, 255], alpha in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba { r: 255.0, g: 255.0, b: 255.0, a: 1.0 };
    pub const BLACK: Rgba = Rgba { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const TRANSPARENT: Rgba = Rgba { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };

    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: r.clamp(0.0, 255.0),
            g: g.clamp(0.0, 255.0),
            b: b.clamp(0.0, 255.0),
            a: a.clamp(0.0, 1.0),
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    fn linear(&self) -> [f64; 3] {
        [
            srgb_to_linear(self.r / 255.0),
            srgb_to_linear(self.g / 255.0),
            srgb_to_linear(self.b / 255.0),
        ]
    }

    fn from_linear(rgb: [f64; 3], a: f64) -> Self {
        Self::new(
            linear_to_srgb(rgb[0].clamp(0.0, 1.0)) * 255.0,
            linear_to_srgb(rgb[1].clamp(0.0, 1.0)) * 255.0,
            linear_to_srgb(rgb[2].clamp(0.0, 1.0)) * 255.0,
            a,
        )
    }

    /// `#rrggbb`, or `#rrggbbaa` when translucent.
    pub fn to_hex(&self) -> String {
        let byte = |c: f64| c.round().clamp(0.0, 255.0) as u8;
        if self.is_opaque() {
            format!("#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b))
        } else {
            format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                byte(self.r),
                byte(self.g),
                byte(self.b),
                byte(self.a * 255.0)
            )
        }
    }
}

pub fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Relative luminance of the color's RGB channels (alpha ignored).
pub fn relative_luminance(color: &Rgba) -> f64 {
    let lin = color.linear();
    LUMA_WEIGHTS[0] * lin[0] + LUMA_WEIGHTS[1] * lin[1] + LUMA_WEIGHTS[2] * lin[2]
}

/// WCAG contrast ratio, always >= 1.
pub fn contrast_ratio(l1: f64, l2: f64) -> f64 {
    let (hi, lo) = if l1 >= l2 { (l1, l2) } else { (l2, l1) };
    (hi + 0.05) / (lo + 0.05)
}

/// Composite `fg` over an opaque `bg` in linear light.
pub fn composite(fg: &Rgba, bg: &Rgba) -> Rgba {
    let a = fg.a;
    let f = fg.linear();
    let b = bg.linear();
    Rgba::from_linear(
        [
            f[0] * a + b[0] * (1.0 - a),
            f[1] * a + b[1] * (1.0 - a),
            f[2] * a + b[2] * (1.0 - a),
        ],
        1.0,
    )
}

/// Returns `color` unchanged when opaque, otherwise composited over `backdrop`.
pub fn flatten_over(color: &Rgba, backdrop: &Rgba) -> Rgba {
    if color.is_opaque() {
        *color
    } else {
        composite(color, backdrop)
    }
}

/// Parse a CSS color literal from the supported grammar.
pub fn parse_color(input: &str) -> Option<Rgba> {
    let s = input.trim().to_ascii_lowercase();
    if s == "transparent" {
        return Some(Rgba::TRANSPARENT);
    }
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }

    let open = s.find('(')?;
    let body = s[open + 1..].strip_suffix(')')?;
    let (channels, alpha) = split_args(body)?;

    match s[..open].trim() {
        "rgb" | "rgba" => {
            if channels.len() != 3 {
                return None;
            }
            Some(Rgba::new(
                rgb_channel(channels[0])?,
                rgb_channel(channels[1])?,
                rgb_channel(channels[2])?,
                alpha_channel(alpha)?,
            ))
        }
        "hsl" | "hsla" => {
            if channels.len() != 3 {
                return None;
            }
            let h = hue(channels[0])?;
            let sat = percent(channels[1])?;
            let light = percent(channels[2])?;
            let [r, g, b] = hsl_to_rgb(h, sat, light);
            Some(Rgba::new(r * 255.0, g * 255.0, b * 255.0, alpha_channel(alpha)?))
        }
        "oklch" => {
            if channels.len() != 3 {
                return None;
            }
            let l = oklch_l_channel(channels[0])?;
            let c = number(channels[1].trim_end_matches('%'))?;
            let c = if channels[1].ends_with('%') { c / 100.0 * 0.4 } else { c };
            let h = hue(channels[2])?;
            let lin = oklch_to_linear_srgb(l, c.max(0.0), h);
            Some(Rgba::from_linear(lin, alpha_channel(alpha)?))
        }
        _ => None,
    }
}

/// L channel of an `oklch(...)` literal, in [0, 1].
pub fn oklch_lightness(input: &str) -> Option<f64> {
    let s = input.trim().to_ascii_lowercase();
    let body = s.strip_prefix("oklch(")?.strip_suffix(')')?;
    let (channels, _) = split_args(body)?;
    oklch_l_channel(channels.first()?)
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 | 8 => hex.to_string(),
        _ => return None,
    };
    let byte = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    let a = if expanded.len() == 8 { byte(6)? as f64 / 255.0 } else { 1.0 };
    Some(Rgba::new(byte(0)? as f64, byte(2)? as f64, byte(4)? as f64, a))
}

/// Splits `a, b, c[, d]` or `a b c [/ d]` into three channels plus optional alpha.
fn split_args(body: &str) -> Option<(Vec<&str>, Option<&str>)> {
    let (main, mut alpha) = match body.split_once('/') {
        Some((m, a)) => (m, Some(a.trim())),
        None => (body, None),
    };
    let mut parts: Vec<&str> = main
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if alpha.is_none() && parts.len() == 4 {
        alpha = parts.pop();
    }
    if parts.is_empty() {
        return None;
    }
    Some((parts, alpha))
}

/// Finite numbers only; `nan` and `inf` parse as floats but are not channels.
fn number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn rgb_channel(s: &str) -> Option<f64> {
    match s.strip_suffix('%') {
        Some(p) => Some(number(p)? * 2.55),
        None => number(s),
    }
}

fn alpha_channel(s: Option<&str>) -> Option<f64> {
    match s {
        None => Some(1.0),
        Some(s) => match s.strip_suffix('%') {
            Some(p) => Some(number(p)? / 100.0),
            None => number(s),
        },
    }
}

fn percent(s: &str) -> Option<f64> {
    Some((number(s.trim_end_matches('%'))? / 100.0).clamp(0.0, 1.0))
}

fn hue(s: &str) -> Option<f64> {
    number(s.trim_end_matches("deg"))
}

fn oklch_l_channel(s: &str) -> Option<f64> {
    let l = match s.strip_suffix('%') {
        Some(p) => number(p)? / 100.0,
        None => number(s)?,
    };
    Some(l.clamp(0.0, 1.0))
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> [f64; 3] {
    if s == 0.0 {
        return [l, l, l];
    }
    let h = h.rem_euclid(360.0) / 360.0;
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// OKLCH → OKLab → LMS → linear sRGB, clipped to [0, 1].
fn oklch_to_linear_srgb(l: f64, c: f64, h_deg: f64) -> [f64; 3] {
    let h = h_deg.to_radians();
    let a = c * h.cos();
    let b = c * h.sin();

    let l_ = l + 0.396_337_777_4 * a + 0.215_803_757_3 * b;
    let m_ = l - 0.105_561_345_8 * a - 0.063_854_172_8 * b;
    let s_ = l - 0.089_484_177_5 * a - 1.291_485_548_0 * b;

    let (l3, m3, s3) = (l_ * l_ * l_, m_ * m_ * m_, s_ * s_ * s_);

    [
        (4.076_741_662_1 * l3 - 3.307_711_591_3 * m3 + 0.230_969_929_2 * s3).clamp(0.0, 1.0),
        (-1.268_438_004_6 * l3 + 2.609_757_401_1 * m3 - 0.341_319_396_5 * s3).clamp(0.0, 1.0),
        (-0.004_196_086_3 * l3 - 0.703_418_614_7 * m3 + 1.707_614_701_0 * s3).clamp(0.0, 1.0),
    ]
}
