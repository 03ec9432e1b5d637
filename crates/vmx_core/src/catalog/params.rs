//! Parameter schema types for operation descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A concrete parameter value supplied by the user or taken from defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value (frame rates, pixel widths).
    Int(i64),
    /// Floating point value (ratios, strengths, degrees).
    Float(f64),
    /// Textual choice (mirror direction, watermark position).
    Text(String),
}

impl ParamValue {
    /// Get the value as a float, converting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Text(_) => None,
        }
    }

    /// Get the value as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Resolved parameter map for one operation (name -> value).
///
/// A `BTreeMap` keeps iteration deterministic, which keeps logged
/// commands reproducible for the same inputs.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Declared value range for a single parameter.
#[derive(Debug, Clone)]
pub enum ParamKind {
    /// Float within an inclusive range.
    Float { min: f64, max: f64, default: f64 },
    /// Integer within an inclusive range.
    Int { min: i64, max: i64, default: i64 },
    /// One of a fixed set of textual options.
    Choice {
        options: &'static [&'static str],
        default: &'static str,
    },
}

/// Declaration of one parameter on an operation descriptor.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Stable parameter name.
    pub name: &'static str,
    /// Declared kind and range.
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Default value for this parameter.
    pub fn default_value(&self) -> ParamValue {
        match &self.kind {
            ParamKind::Float { default, .. } => ParamValue::Float(*default),
            ParamKind::Int { default, .. } => ParamValue::Int(*default),
            ParamKind::Choice { default, .. } => ParamValue::Text((*default).to_string()),
        }
    }

    /// Check a supplied value against the declared range.
    ///
    /// Returns a human-readable reason on rejection.
    pub fn check(&self, value: &ParamValue) -> Result<(), String> {
        match &self.kind {
            ParamKind::Float { min, max, .. } => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| "expected a number".to_string())?;
                if v < *min || v > *max {
                    return Err(format!("value {} outside range {}..={}", v, min, max));
                }
                Ok(())
            }
            ParamKind::Int { min, max, .. } => {
                let v = value
                    .as_i64()
                    .ok_or_else(|| "expected an integer".to_string())?;
                if v < *min || v > *max {
                    return Err(format!("value {} outside range {}..={}", v, min, max));
                }
                Ok(())
            }
            ParamKind::Choice { options, .. } => {
                let v = value
                    .as_str()
                    .ok_or_else(|| "expected a string".to_string())?;
                if !options.contains(&v) {
                    return Err(format!("'{}' is not one of {:?}", v, options));
                }
                Ok(())
            }
        }
    }
}

/// Convenience accessors over a resolved [`ParamMap`].
pub trait ParamLookup {
    fn float(&self, name: &str) -> Option<f64>;
    fn int(&self, name: &str) -> Option<i64>;
    fn text(&self, name: &str) -> Option<&str>;
}

impl ParamLookup for ParamMap {
    fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_f64())
    }

    fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_i64())
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_spec_rejects_out_of_range() {
        let spec = ParamSpec {
            name: "ratio",
            kind: ParamKind::Float {
                min: 0.0,
                max: 0.5,
                default: 0.05,
            },
        };

        assert!(spec.check(&ParamValue::Float(0.3)).is_ok());
        assert!(spec.check(&ParamValue::Float(0.6)).is_err());
        assert!(spec.check(&ParamValue::Text("x".into())).is_err());
    }

    #[test]
    fn int_accepts_as_float_input() {
        let spec = ParamSpec {
            name: "width",
            kind: ParamKind::Float {
                min: 0.0,
                max: 100.0,
                default: 20.0,
            },
        };
        // Integers coerce to floats for float params.
        assert!(spec.check(&ParamValue::Int(50)).is_ok());
    }

    #[test]
    fn choice_spec_validates_options() {
        let spec = ParamSpec {
            name: "direction",
            kind: ParamKind::Choice {
                options: &["horizontal", "vertical", "both"],
                default: "horizontal",
            },
        };

        assert!(spec.check(&ParamValue::Text("vertical".into())).is_ok());
        assert!(spec.check(&ParamValue::Text("diagonal".into())).is_err());
        assert_eq!(
            spec.default_value(),
            ParamValue::Text("horizontal".to_string())
        );
    }
}
