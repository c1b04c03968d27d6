//! Input validation and sanitization for every client mutation.
//!
//! A [`Validator`] walks the fields of one request. Each check returns a
//! usable value right away (clamped, stripped, or a placeholder when the field
//! is hopeless) and records an error or warning on the side. [`Validator::finish`]
//! then decides: any error refuses the whole request, otherwise the sanitized
//! value is handed back together with the warnings.
//!
//! | Field kind | Hard error | Sanitized with warning |
//! |------------|-----------|------------------------|
//! | coordinate | non-finite, beyond the absurd range | clamped to world bounds |
//! | dimension / scale / footprint | non-finite | clamped to configured min/max |
//! | rotation | non-finite | wrapped into `[-π, π)` (silently) |
//! | free text | none | markup and control characters removed, length capped |
//! | identifier | empty, too long, outside `[A-Za-z0-9_-]` | none |
//! | model reference | empty, too long, unsafe characters, `..` | none |
//! | skin | out of range | none |
//!
//! ```
//! use plaza_logic::collision::WorldBounds;
//! use plaza_logic::config::InputLimits;
//! use plaza_logic::validation::Validator;
//!
//! let limits = InputLimits::default();
//! let bounds = WorldBounds::square(20.0);
//! let mut v = Validator::new(&limits, &bounds);
//! let (x, z) = v.xz("target", 35.0, 2.0);
//! let checked = v.finish((x, z)).unwrap();
//! assert_eq!(checked.value, (20.0, 2.0));
//! assert_eq!(checked.warnings.len(), 1);
//! ```

use std::f32::consts::PI;
use std::fmt;

use crate::collision::{Dimensions, Vec3, WorldBounds};
use crate::config::InputLimits;
use crate::constants::player::DEFAULT_NAME;

/// One validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub severity: Severity,
    pub message: String,
}

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Accepted input after sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized<T> {
    pub value: T,
    pub warnings: Vec<ValidationError>,
}

pub type Checked<T> = Result<Sanitized<T>, Vec<ValidationError>>;

/// Render a list of findings as a single human-readable reason.
pub fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Per-request field checker. See the module docs.
pub struct Validator<'a> {
    limits: &'a InputLimits,
    bounds: &'a WorldBounds,
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationError>,
}

impl<'a> Validator<'a> {
    pub fn new(limits: &'a InputLimits, bounds: &'a WorldBounds) -> Self {
        Self {
            limits,
            bounds,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            severity: Severity::Error,
            message: message.into(),
        });
    }

    fn warn(&mut self, field: &str, message: impl Into<String>) {
        self.warnings.push(ValidationError {
            field: field.to_string(),
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    fn finite(&mut self, field: &str, value: f32) -> Option<f32> {
        if value.is_finite() {
            Some(value)
        } else {
            self.error(field, format!("{value} is not a finite number"));
            None
        }
    }

    fn sane_coordinate(&mut self, field: &str, value: f32) -> Option<f32> {
        let value = self.finite(field, value)?;
        if value.abs() > self.limits.absurd_coordinate {
            self.error(field, format!("{value} is far outside the world"));
            return None;
        }
        Some(value)
    }

    /// Horizontal coordinate pair, clamped into the world bounds.
    pub fn xz(&mut self, field: &str, x: f32, z: f32) -> (f32, f32) {
        let (Some(x), Some(z)) = (self.sane_coordinate(field, x), self.sane_coordinate(field, z))
        else {
            return (0.0, 0.0);
        };
        let (cx, cz) = self.bounds.clamp_point(x, z);
        if cx != x || cz != z {
            self.warn(field, format!("({x}, {z}) clamped to ({cx}, {cz})"));
        }
        (cx, cz)
    }

    /// Full position: `x`/`z` clamped to bounds, `y` raised to the ground.
    pub fn position(&mut self, field: &str, p: Vec3) -> Vec3 {
        let (x, z) = self.xz(field, p.x, p.z);
        let y = match self.sane_coordinate(field, p.y) {
            Some(y) if y < 0.0 => {
                self.warn(field, format!("height {y} raised to ground"));
                0.0
            }
            Some(y) => y,
            None => 0.0,
        };
        Vec3::new(x, y, z)
    }

    fn bounded(&mut self, field: &str, value: f32, min: f32, max: f32) -> f32 {
        let Some(value) = self.finite(field, value) else {
            return min;
        };
        let clamped = value.clamp(min, max);
        if clamped != value {
            self.warn(field, format!("{value} clamped to {clamped}"));
        }
        clamped
    }

    pub fn dimension(&mut self, field: &str, value: f32) -> f32 {
        self.bounded(field, value, self.limits.min_dimension, self.limits.max_dimension)
    }

    pub fn dimensions(&mut self, field: &str, dims: Dimensions) -> Dimensions {
        Dimensions::new(
            self.dimension(field, dims.width),
            self.dimension(field, dims.height),
            self.dimension(field, dims.depth),
        )
    }

    /// Player footprint; bounded tighter than furniture.
    pub fn footprint(&mut self, field: &str, dims: Dimensions) -> Dimensions {
        let (min, max) = (self.limits.min_footprint, self.limits.max_footprint);
        Dimensions::new(
            self.bounded(field, dims.width, min, max),
            self.bounded(field, dims.height, min, max),
            self.bounded(field, dims.depth, min, max),
        )
    }

    pub fn scale(&mut self, field: &str, value: f32) -> f32 {
        self.bounded(field, value, self.limits.min_scale, self.limits.max_scale)
    }

    /// Radians about the vertical axis, wrapped into `[-π, π)`.
    pub fn rotation(&mut self, field: &str, value: f32) -> f32 {
        match self.finite(field, value) {
            Some(r) => (r + PI).rem_euclid(2.0 * PI) - PI,
            None => 0.0,
        }
    }

    /// Free text with markup and control characters removed.
    pub fn text(&mut self, field: &str, raw: &str, max_len: usize) -> String {
        let stripped = strip_markup(raw);
        let trimmed = stripped.trim();
        let capped: String = trimmed.chars().take(max_len).collect();
        if capped != raw {
            self.warn(field, "text was sanitized");
        }
        capped
    }

    /// Display name; falls back to the default when nothing survives sanitizing.
    pub fn name(&mut self, field: &str, raw: &str) -> String {
        let name = self.text(field, raw, self.limits.name_max_len);
        if name.is_empty() {
            self.warn(field, "empty name replaced");
            DEFAULT_NAME.to_string()
        } else {
            name
        }
    }

    pub fn identifier(&mut self, field: &str, raw: &str) -> String {
        if raw.is_empty() {
            self.error(field, "identifier is empty");
        } else if raw.len() > self.limits.id_max_len {
            self.error(field, format!("identifier longer than {}", self.limits.id_max_len));
        } else if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            self.error(field, "identifier may only contain letters, digits, '_' and '-'");
        }
        raw.to_string()
    }

    /// Asset path such as `models/furniture/bench_01.glb`.
    pub fn model_ref(&mut self, field: &str, raw: &str) -> String {
        if raw.is_empty() {
            self.error(field, "model reference is empty");
        } else if raw.len() > self.limits.model_max_len {
            self.error(field, format!("model reference longer than {}", self.limits.model_max_len));
        } else if raw.contains("..") {
            self.error(field, "model reference may not contain '..'");
        } else if raw.starts_with('/')
            || !raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
        {
            self.error(field, "model reference contains unsafe characters");
        }
        raw.to_string()
    }

    pub fn skin(&mut self, field: &str, skin: u8) -> u8 {
        if skin >= self.limits.skin_count {
            self.error(
                field,
                format!("skin {skin} out of range 0..{}", self.limits.skin_count),
            );
            0
        } else {
            skin
        }
    }

    /// Whether any hard error has been recorded so far.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn finish<T>(self, value: T) -> Checked<T> {
        if self.errors.is_empty() {
            Ok(Sanitized {
                value,
                warnings: self.warnings,
            })
        } else {
            Err(self.errors)
        }
    }
}

/// Drop `<...>` tags and control characters.
pub fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag || c.is_control() => {}
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check<T>(f: impl FnOnce(&mut Validator) -> T) -> Checked<T> {
        let limits = InputLimits::default();
        let bounds = WorldBounds::square(20.0);
        let mut v = Validator::new(&limits, &bounds);
        let value = f(&mut v);
        v.finish(value)
    }

    #[test]
    fn nan_coordinate_is_an_error() {
        let errors = check(|v| v.xz("target", f32::NAN, 0.0)).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, Severity::Error);
    }

    #[test]
    fn absurd_coordinate_is_an_error() {
        assert!(check(|v| v.xz("target", 0.0, 1.0e7)).is_err());
        assert!(check(|v| v.xz("target", f32::INFINITY, 0.0)).is_err());
    }

    #[test]
    fn in_bounds_coordinate_passes_untouched() {
        let ok = check(|v| v.xz("target", 3.0, -4.5)).unwrap();
        assert_eq!(ok.value, (3.0, -4.5));
        assert!(ok.warnings.is_empty());
    }

    #[test]
    fn negative_height_is_raised() {
        let ok = check(|v| v.position("position", Vec3::new(1.0, -2.0, 1.0))).unwrap();
        assert_eq!(ok.value.y, 0.0);
        assert_eq!(ok.warnings.len(), 1);
    }

    #[test]
    fn dimensions_clamped_with_warning() {
        let ok = check(|v| v.dimensions("dims", Dimensions::new(0.0, 50.0, 1.0))).unwrap();
        assert_eq!(ok.value.width, 0.05);
        assert_eq!(ok.value.height, 12.0);
        assert_eq!(ok.warnings.len(), 2);
    }

    #[test]
    fn rotation_wraps() {
        let ok = check(|v| v.rotation("rotation", 3.0 * PI)).unwrap();
        assert!((ok.value.abs() - PI).abs() < 1e-4);
        assert!(ok.warnings.is_empty());
    }

    #[test]
    fn text_strips_tags_and_controls() {
        let ok = check(|v| v.text("name", "<b>Ann</b>\u{7}ie", 24)).unwrap();
        assert_eq!(ok.value, "Annie");
        assert_eq!(ok.warnings.len(), 1);
    }

    #[test]
    fn text_is_capped_by_characters() {
        let ok = check(|v| v.text("emote", "ééééé", 3)).unwrap();
        assert_eq!(ok.value, "ééé");
    }

    #[test]
    fn empty_name_falls_back() {
        let ok = check(|v| v.name("name", "<script></script>")).unwrap();
        assert_eq!(ok.value, DEFAULT_NAME);
    }

    #[test]
    fn identifiers_are_restricted() {
        assert!(check(|v| v.identifier("id", "bench_01-a")).is_ok());
        assert!(check(|v| v.identifier("id", "")).is_err());
        assert!(check(|v| v.identifier("id", "a b")).is_err());
        assert!(check(|v| v.identifier("id", &"x".repeat(65))).is_err());
    }

    #[test]
    fn model_refs_reject_traversal() {
        assert!(check(|v| v.model_ref("model", "models/bench.glb")).is_ok());
        assert!(check(|v| v.model_ref("model", "../secret")).is_err());
        assert!(check(|v| v.model_ref("model", "/etc/passwd")).is_err());
        assert!(check(|v| v.model_ref("model", "a?b")).is_err());
    }

    #[test]
    fn skin_out_of_range() {
        assert!(check(|v| v.skin("skin", 7)).is_ok());
        assert!(check(|v| v.skin("skin", 8)).is_err());
    }

    #[test]
    fn errors_win_over_warnings() {
        let result = check(|v| {
            v.xz("target", 99.0, 0.0);
            v.identifier("id", "no spaces")
        });
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(describe(&errors), "id: identifier may only contain letters, digits, '_' and '-'");
    }
}
