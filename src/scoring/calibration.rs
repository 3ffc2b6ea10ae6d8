//! Context-aware second pass over a [`ScoreSet`]
//!
//! Calibration nudges measured scores using what the subject declared about
//! themselves. It is a pure function of `(ScoreSet, CalibrationContext)`: the
//! same inputs always produce the same output, no delta exceeds
//! [`MAX_DELTA`], and the result is re-clamped into `[0, 100]`.

use super::params::Parameter;
use super::score_set::{clamp_score, ScoreSet};
use serde::{Deserialize, Serialize};

/// Largest magnitude any single table entry may contribute
pub const MAX_DELTA: i16 = 8;

/// Self-declared context supplied alongside a submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationContext {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub sleep_hours: Option<f32>,
    #[serde(default)]
    pub skin_type: Option<SkinType>,
    #[serde(default)]
    pub smoker: Option<bool>,
    #[serde(default)]
    pub sun_exposure: Option<SunExposure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinType {
    Normal,
    Dry,
    Oily,
    Combination,
    Sensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SunExposure {
    Low,
    Moderate,
    High,
}

impl CalibrationContext {
    pub fn is_empty(&self) -> bool {
        self == &CalibrationContext::default()
    }
}

/// One entry of the delta table that matched the context
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub parameter: Parameter,
    pub delta: i16,
    pub reason: &'static str,
}

impl Adjustment {
    fn new(parameter: Parameter, delta: i16, reason: &'static str) -> Self {
        Self {
            parameter,
            delta: delta.clamp(-MAX_DELTA, MAX_DELTA),
            reason,
        }
    }
}

/// Table entries that apply to `context`, in table order
pub fn adjustments(context: &CalibrationContext) -> Vec<Adjustment> {
    use Parameter::*;

    let mut table = Vec::new();

    if let Some(age) = context.age {
        match age {
            0..=24 => table.push(Adjustment::new(Wrinkles, -5, "age under 25")),
            25..=39 => {}
            40..=49 => {
                table.push(Adjustment::new(Wrinkles, 5, "age 40-49"));
                table.push(Adjustment::new(Spots, 3, "age 40-49"));
            }
            _ => {
                table.push(Adjustment::new(Wrinkles, 8, "age 50+"));
                table.push(Adjustment::new(Spots, 5, "age 50+"));
            }
        }
    }

    if let Some(hours) = context.sleep_hours {
        if hours < 6.0 {
            table.push(Adjustment::new(DarkCircles, 8, "under 6h sleep"));
            table.push(Adjustment::new(Dehydration, 3, "under 6h sleep"));
        } else if hours >= 8.0 {
            table.push(Adjustment::new(DarkCircles, -4, "8h+ sleep"));
        }
    }

    match context.skin_type {
        Some(SkinType::Oily) => {
            table.push(Adjustment::new(Pores, 5, "oily skin"));
            table.push(Adjustment::new(Acne, 5, "oily skin"));
            table.push(Adjustment::new(Dehydration, -4, "oily skin"));
            table.push(Adjustment::new(Oiliness, 6, "oily skin"));
        }
        Some(SkinType::Dry) => {
            table.push(Adjustment::new(Dehydration, 6, "dry skin"));
            table.push(Adjustment::new(Pores, -3, "dry skin"));
        }
        Some(SkinType::Combination) => {
            table.push(Adjustment::new(Pores, 3, "combination skin"));
        }
        Some(SkinType::Sensitive) => {
            table.push(Adjustment::new(Redness, 5, "sensitive skin"));
            table.push(Adjustment::new(Acne, 2, "sensitive skin"));
        }
        Some(SkinType::Normal) | None => {}
    }

    if context.smoker == Some(true) {
        table.push(Adjustment::new(Wrinkles, 5, "smoker"));
        table.push(Adjustment::new(Spots, 3, "smoker"));
    }

    match context.sun_exposure {
        Some(SunExposure::High) => {
            table.push(Adjustment::new(Spots, 6, "high sun exposure"));
            table.push(Adjustment::new(Wrinkles, 3, "high sun exposure"));
        }
        Some(SunExposure::Low) => {
            table.push(Adjustment::new(Spots, -2, "low sun exposure"));
        }
        Some(SunExposure::Moderate) | None => {}
    }

    table
}

/// Apply the delta table to `scores`.
///
/// Extended parameters are only adjusted when present. A derived cleanliness
/// figure is recomputed from the calibrated core values; a supplied one is left alone.
pub fn calibrate(scores: &ScoreSet, context: &CalibrationContext) -> ScoreSet {
    let mut calibrated = scores.clone();

    for adjustment in adjustments(context) {
        if let Some(current) = calibrated.get(adjustment.parameter) {
            let shifted = f64::from(current) + f64::from(adjustment.delta);
            calibrated.set(adjustment.parameter, clamp_score(shifted));
        }
    }

    calibrated.rederive_cleanliness();
    calibrated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::score_set::CleanlinessOrigin;

    #[test]
    fn test_empty_context_is_identity() {
        let scores = ScoreSet::default();
        let context = CalibrationContext::default();
        assert!(context.is_empty());
        assert!(adjustments(&context).is_empty());
        assert_eq!(calibrate(&scores, &context), scores);
    }

    #[test]
    fn test_all_table_deltas_are_bounded() {
        let context = CalibrationContext {
            age: Some(70),
            sleep_hours: Some(4.0),
            skin_type: Some(SkinType::Oily),
            smoker: Some(true),
            sun_exposure: Some(SunExposure::High),
        };
        let table = adjustments(&context);
        assert!(!table.is_empty());
        assert!(table.iter().all(|a| a.delta.abs() <= MAX_DELTA));
    }

    #[test]
    fn test_older_smoker_gets_more_wrinkles() {
        let scores = ScoreSet::default();
        let context = CalibrationContext {
            age: Some(55),
            smoker: Some(true),
            ..Default::default()
        };
        let calibrated = calibrate(&scores, &context);
        assert_eq!(calibrated.wrinkles, 50 + 8 + 5);
        assert_eq!(calibrated.spots, 50 + 5 + 3);
        assert_eq!(calibrated.cleanliness_percent, calibrated.derived_cleanliness());
    }

    #[test]
    fn test_result_is_reclamped() {
        let mut scores = ScoreSet::default();
        scores.set(Parameter::DarkCircles, 97);
        scores.set(Parameter::Wrinkles, 2);
        scores.rederive_cleanliness();

        let context = CalibrationContext {
            age: Some(20),
            sleep_hours: Some(5.0),
            ..Default::default()
        };
        let calibrated = calibrate(&scores, &context);
        assert_eq!(calibrated.dark_circles, 100);
        assert_eq!(calibrated.wrinkles, 0);
        assert!(calibrated.is_bounded());
    }

    #[test]
    fn test_absent_extended_parameter_not_created() {
        let scores = ScoreSet::default();
        let context = CalibrationContext {
            skin_type: Some(SkinType::Oily),
            ..Default::default()
        };
        let calibrated = calibrate(&scores, &context);
        assert_eq!(calibrated.oiliness, None);
        assert_eq!(calibrated.pores, 55);
    }

    #[test]
    fn test_supplied_cleanliness_survives_calibration() {
        let mut scores = ScoreSet::default();
        scores.set(Parameter::CleanlinessPercent, 91);
        let context = CalibrationContext {
            age: Some(60),
            ..Default::default()
        };
        let calibrated = calibrate(&scores, &context);
        assert_eq!(calibrated.cleanliness_percent, 91);
        assert_eq!(calibrated.cleanliness_origin(), CleanlinessOrigin::Supplied);
    }

    #[test]
    fn test_calibration_is_reproducible() {
        let scores = ScoreSet::default();
        let context = CalibrationContext {
            age: Some(45),
            sleep_hours: Some(9.0),
            skin_type: Some(SkinType::Dry),
            smoker: Some(false),
            sun_exposure: Some(SunExposure::Low),
        };
        let first = serde_json::to_vec(&calibrate(&scores, &context)).unwrap();
        let second = serde_json::to_vec(&calibrate(&scores, &context)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_context_deserializes_from_camel_case() {
        let context: CalibrationContext = serde_json::from_str(
            r#"{"age": 33, "sleepHours": 7.5, "skinType": "combination", "sunExposure": "moderate"}"#,
        )
        .unwrap();
        assert_eq!(context.age, Some(33));
        assert_eq!(context.sleep_hours, Some(7.5));
        assert_eq!(context.skin_type, Some(SkinType::Combination));
        assert_eq!(context.smoker, None);
    }
}
