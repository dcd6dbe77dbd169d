//! Numeric extraction from token value strings.
//!
//! Grammar scanned by [`scan_quantities`]:
//!
//! ```text
//! quantity := sign? (digits ('.' digits?)? | '.' digits) unit?
//! sign     := '+' | '-'
//! unit     := 'px' | 'rem' | 'em' | '%' | letters
//! ```
//!
//! A quantity only starts at the beginning of the input or after a delimiter
//! (whitespace, `(`, `,`, `+`, `*`, `/`), so digits inside identifiers such as
//! `h1` or `var(--space-2)` are never picked up. `rem` and `em` convert to px
//! at a fixed [`REM_BASE_PX`].

pub const REM_BASE_PX: f64 = 16.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    Px,
    Rem,
    Em,
    Percent,
    Unitless,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    /// Length in px, for px/rem/em quantities only.
    pub fn length_px(&self) -> Option<f64> {
        match self.unit {
            Unit::Px => Some(self.value),
            Unit::Rem | Unit::Em => Some(self.value * REM_BASE_PX),
            _ => None,
        }
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ',' | '+' | '*' | '/')
}

/// Scan every quantity in `input`, left to right.
pub fn scan_quantities(input: &str) -> Vec<Quantity> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let at_boundary = i == 0 || is_delimiter(chars[i - 1]);
        if !at_boundary {
            i += 1;
            continue;
        }
        match read_quantity(&chars, i) {
            Some((q, next)) => {
                out.push(q);
                i = next;
            }
            None => i += 1,
        }
    }
    out
}

/// Reads one quantity starting exactly at `start`; returns it and the index after it.
fn read_quantity(chars: &[char], start: usize) -> Option<(Quantity, usize)> {
    let mut i = start;
    if i < chars.len() && (chars[i] == '-' || chars[i] == '+') {
        i += 1;
    }
    let digits_start = i;
    let mut seen_digit = false;
    let mut seen_dot = false;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() {
            seen_digit = true;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
        } else {
            break;
        }
        i += 1;
    }
    if !seen_digit || i == digits_start {
        return None;
    }
    let number: String = chars[start..i].iter().collect();
    let value = number.parse::<f64>().ok()?;

    let unit_start = i;
    if i < chars.len() && chars[i] == '%' {
        return Some((Quantity { value, unit: Unit::Percent }, i + 1));
    }
    while i < chars.len() && chars[i].is_ascii_alphabetic() {
        i += 1;
    }
    let unit_text: String = chars[unit_start..i].iter().collect::<String>().to_ascii_lowercase();
    let unit = match unit_text.as_str() {
        "" => Unit::Unitless,
        "px" => Unit::Px,
        "rem" => Unit::Rem,
        "em" => Unit::Em,
        other => Unit::Other(other.to_string()),
    };
    Some((Quantity { value, unit }, i))
}

/// Parse a value that is exactly one size: `12px`, `1.5rem`, `2em` or a bare number (px).
pub fn parse_size_px(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    let (q, next) = read_quantity(&chars, 0)?;
    if next != chars.len() {
        return None;
    }
    match q.unit {
        Unit::Unitless => Some(q.value),
        _ => q.length_px(),
    }
}

/// Parse a value that is exactly one unitless number.
pub fn parse_number(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    match read_quantity(&chars, 0)? {
        (Quantity { value, unit: Unit::Unitless }, next) if next == chars.len() => Some(value),
        _ => None,
    }
}

/// First px/rem/em length anywhere in `input`, converted to px.
///
/// Falls back to [`parse_size_px`] on the whole input so bare numbers still
/// count. For compound values like `clamp(1rem, 2vw + 1rem, 2rem)` the first
/// length wins; the remaining terms are ignored.
pub fn first_length_px(input: &str) -> Option<f64> {
    scan_quantities(input)
        .iter()
        .find_map(Quantity::length_px)
        .or_else(|| parse_size_px(input))
}
