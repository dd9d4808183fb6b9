//! List color normalization.
//!
//! Colors are stored as `#RRGGBB` or the empty string. CSS-style input
//! (`"lime"`, `"#ff8000"`, `"abc"`) is parsed with [`csscolorparser`] and
//! folded into the canonical uppercase-hex form.

use crate::error::{Error, Result};

/// Normalize a color string into `#RRGGBB` (uppercase) or `""`.
///
/// Empty/whitespace-only input normalizes to `""`. Anything else must parse
/// as a CSS color; alpha is dropped (lists don't support transparency).
pub fn normalize_color(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let color = csscolorparser::parse(trimmed)
        .map_err(|e| Error::Invariant(format!("invalid color {trimmed:?}: {e}")))?;
    let [r, g, b, _a] = color.to_rgba8();
    Ok(format!("#{r:02X}{g:02X}{b:02X}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_empty() {
        assert_eq!(normalize_color("").unwrap(), "");
        assert_eq!(normalize_color("   ").unwrap(), "");
    }

    #[test]
    fn short_hex_expands() {
        assert_eq!(normalize_color("abc").unwrap(), "#AABBCC");
    }

    #[test]
    fn already_normalized_is_idempotent() {
        let once = normalize_color("#ff8000").unwrap();
        let twice = normalize_color(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn named_colors_parse() {
        assert_eq!(normalize_color("lime").unwrap(), "#00FF00");
    }

    #[test]
    fn garbage_is_invariant_error() {
        let err = normalize_color("not-a-color").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invariant);
    }
}
