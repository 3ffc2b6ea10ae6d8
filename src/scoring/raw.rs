//! Pre-normalization measurements
//!
//! Sources report values in loosely typed shapes: a bare number, or an object
//! carrying a display-oriented `ui_score` and a fallback `raw_score`. This is
//! the only place those shapes are interpreted.

use serde_json::Value;

/// Value reported for a parameter before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawMeasurement {
    Number(f64),
    Variants { ui: Option<f64>, raw: Option<f64> },
    Unusable,
}

impl RawMeasurement {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(RawMeasurement::Number)
                .unwrap_or(RawMeasurement::Unusable),
            Value::Object(fields) => {
                let pick = |names: &[&str]| {
                    names
                        .iter()
                        .find_map(|name| fields.get(*name).and_then(Value::as_f64))
                };
                RawMeasurement::Variants {
                    ui: pick(&["ui_score", "ui"]),
                    raw: pick(&["raw_score", "raw"]),
                }
            }
            _ => RawMeasurement::Unusable,
        }
    }

    /// Preferred numeric value: `ui` over `raw`, non-finite values discarded
    pub fn value(&self) -> Option<f64> {
        let candidate = match self {
            RawMeasurement::Number(n) => Some(*n),
            RawMeasurement::Variants { ui, raw } => ui.or(*raw),
            RawMeasurement::Unusable => None,
        };
        candidate.filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_number() {
        assert_eq!(RawMeasurement::from_value(&json!(42)).value(), Some(42.0));
        assert_eq!(RawMeasurement::from_value(&json!(61.6)).value(), Some(61.6));
    }

    #[test]
    fn test_ui_preferred_over_raw() {
        let m = RawMeasurement::from_value(&json!({"ui_score": 70, "raw_score": 12.5}));
        assert_eq!(m.value(), Some(70.0));
    }

    #[test]
    fn test_raw_used_when_ui_missing() {
        let m = RawMeasurement::from_value(&json!({"raw_score": 12.5}));
        assert_eq!(m.value(), Some(12.5));
    }

    #[test]
    fn test_short_aliases() {
        let m = RawMeasurement::from_value(&json!({"ui": 33, "raw": 80}));
        assert_eq!(m.value(), Some(33.0));
    }

    #[test]
    fn test_non_numeric_ui_falls_back_to_raw() {
        let m = RawMeasurement::from_value(&json!({"ui_score": "high", "raw_score": 55}));
        assert_eq!(m.value(), Some(55.0));
    }

    #[test]
    fn test_unusable_shapes() {
        assert_eq!(RawMeasurement::from_value(&json!("80")).value(), None);
        assert_eq!(RawMeasurement::from_value(&json!(null)).value(), None);
        assert_eq!(RawMeasurement::from_value(&json!([1, 2])).value(), None);
        assert_eq!(RawMeasurement::from_value(&json!({})).value(), None);
    }
}
