//! Display Formatting
//!
//! Rounding and serialization options for values shown to users.
//!
//! Options come in layers (a component's own, the one inherited from its
//! binding or extension source, the global default). [`FormatOptions`] is one
//! layer with every field optional; [`ResolvedFormat`] is the result of
//! stacking layers.
//!
//! Significant-digit rounding and fixed-decimal rounding are mutually
//! exclusive. Within one layer `decimals` wins over `digits`; across layers
//! the highest-precedence layer that names either one decides the mode.

use serde::{Deserialize, Serialize};

use super::expr::format_number;
use super::Value;

/// Magnitude below which values display as zero when zeroing is enabled.
pub const DEFAULT_ZERO_THRESHOLD: f64 = 1e-14;

/// One layer of display options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatOptions {
    /// Significant digits.
    pub digits: Option<u32>,
    /// Digits after the decimal point.
    pub decimals: Option<u32>,
    /// Show magnitudes below the threshold as zero.
    pub small_as_zero: Option<bool>,
    /// Threshold used by `small_as_zero`.
    pub zero_threshold: Option<f64>,
}

impl FormatOptions {
    pub fn digits(digits: u32) -> Self {
        Self {
            digits: Some(digits),
            ..Self::default()
        }
    }

    pub fn decimals(decimals: u32) -> Self {
        Self {
            decimals: Some(decimals),
            ..Self::default()
        }
    }

    pub fn with_small_as_zero(mut self, on: bool) -> Self {
        self.small_as_zero = Some(on);
        self
    }

    /// The global default: ten significant digits, tiny values shown as zero.
    pub fn global_default() -> Self {
        Self {
            digits: Some(10),
            decimals: None,
            small_as_zero: Some(true),
            zero_threshold: Some(DEFAULT_ZERO_THRESHOLD),
        }
    }

    /// Whether this layer says anything at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn rounding(&self) -> Option<Rounding> {
        match (self.decimals, self.digits) {
            (Some(decimals), _) => Some(Rounding::Decimals(decimals)),
            (None, Some(digits)) => Some(Rounding::Digits(digits)),
            (None, None) => None,
        }
    }

    /// Stack layers, highest precedence first.
    pub fn resolve<'a>(layers: impl IntoIterator<Item = &'a FormatOptions>) -> ResolvedFormat {
        let mut rounding = None;
        let mut small_as_zero = None;
        let mut threshold = None;
        for layer in layers {
            rounding = rounding.or_else(|| layer.rounding());
            small_as_zero = small_as_zero.or(layer.small_as_zero);
            threshold = threshold.or(layer.zero_threshold);
        }
        ResolvedFormat {
            rounding: rounding.unwrap_or(Rounding::Exact),
            zero_below: small_as_zero
                .unwrap_or(false)
                .then(|| threshold.unwrap_or(DEFAULT_ZERO_THRESHOLD)),
        }
    }
}

/// Rounding mode after layer resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rounding {
    Exact,
    Digits(u32),
    Decimals(u32),
}

/// Fully resolved display options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFormat {
    pub rounding: Rounding,
    pub zero_below: Option<f64>,
}

impl Default for ResolvedFormat {
    fn default() -> Self {
        Self::exact()
    }
}

impl ResolvedFormat {
    /// No rounding, no zeroing.
    pub fn exact() -> Self {
        Self {
            rounding: Rounding::Exact,
            zero_below: None,
        }
    }

    pub fn round_number(&self, n: f64) -> f64 {
        if !n.is_finite() {
            return n;
        }
        if let Some(eps) = self.zero_below {
            if n.abs() < eps {
                return 0.0;
            }
        }
        match self.rounding {
            Rounding::Exact => n,
            Rounding::Decimals(decimals) => round_at(n, decimals as i32),
            Rounding::Digits(digits) => round_to_digits(n, digits),
        }
    }
}

fn round_to_digits(n: f64, digits: u32) -> f64 {
    if n == 0.0 || digits == 0 {
        return n;
    }
    let magnitude = n.abs().log10().floor() as i32;
    round_at(n, digits as i32 - 1 - magnitude)
}

/// Round to `places` digits after the point (before it when negative).
/// A scale that leaves the finite range returns `n` as is.
fn round_at(n: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places.abs());
    let scaled = if places >= 0 { n * factor } else { n / factor };
    if !factor.is_finite() || !scaled.is_finite() {
        return n;
    }
    let rounded = if places >= 0 {
        scaled.round() / factor
    } else {
        scaled.round() * factor
    };
    if rounded.is_finite() {
        rounded
    } else {
        n
    }
}

/// Round every number inside a value. Non-numeric values pass through.
pub fn round_value(value: &Value, format: &ResolvedFormat) -> Value {
    match value {
        Value::Number(n) => Value::Number(format.round_number(*n)),
        Value::Math(expr) => Value::Math(expr.map_numbers(&|n| format.round_number(n))),
        other => other.clone(),
    }
}

/// Serialize a value to text after applying the display rounding.
pub fn serialize(value: &Value, format: &ResolvedFormat) -> String {
    match round_value(value, format) {
        Value::Number(n) => format_number(n),
        Value::Math(expr) => expr.to_string(),
        Value::Text(text) => text,
        Value::Bool(b) => b.to_string(),
        Value::Unparseable(raw) => raw,
        Value::Missing => String::new(),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
