//! The normalized, bounded output of score synthesis

use super::params::Parameter;
use serde::{Deserialize, Serialize};

/// Lower bound of every score
pub const SCORE_MIN: u8 = 0;
/// Upper bound of every score
pub const SCORE_MAX: u8 = 100;
/// Value assigned to a required parameter no source could measure
pub const DEFAULT_SCORE: u8 = 50;

/// Weights of the overall health figure, in [`Parameter::CORE`] order.
///
/// wrinkles 0.20, pores 0.15, spots 0.15, darkCircles 0.15, dehydration 0.20, acne 0.15
pub const OVERALL_HEALTH_WEIGHTS: [f64; 6] = [0.20, 0.15, 0.15, 0.15, 0.20, 0.15];

/// Round a raw number to an integer score in `[0, 100]`
pub fn clamp_score(value: f64) -> u8 {
    if !value.is_finite() {
        return DEFAULT_SCORE;
    }
    value
        .round()
        .clamp(f64::from(SCORE_MIN), f64::from(SCORE_MAX)) as u8
}

/// Where the cleanliness figure came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanlinessOrigin {
    /// Computed from the six core parameters
    #[default]
    Derived,
    /// Reported directly by a source
    Supplied,
}

/// Fixed-schema score record. Every value is an integer in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSet {
    pub wrinkles: u8,
    pub pores: u8,
    pub spots: u8,
    pub dark_circles: u8,
    pub dehydration: u8,
    pub acne: u8,
    pub cleanliness_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radiance: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oiliness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eye_bag: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tear_trough: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_age: Option<u8>,
    #[serde(skip)]
    cleanliness_origin: CleanlinessOrigin,
}

impl Default for ScoreSet {
    fn default() -> Self {
        let mut scores = Self {
            wrinkles: DEFAULT_SCORE,
            pores: DEFAULT_SCORE,
            spots: DEFAULT_SCORE,
            dark_circles: DEFAULT_SCORE,
            dehydration: DEFAULT_SCORE,
            acne: DEFAULT_SCORE,
            cleanliness_percent: DEFAULT_SCORE,
            radiance: None,
            firmness: None,
            oiliness: None,
            texture: None,
            redness: None,
            eye_bag: None,
            tear_trough: None,
            skin_age: None,
            cleanliness_origin: CleanlinessOrigin::Derived,
        };
        scores.rederive_cleanliness();
        scores
    }
}

impl ScoreSet {
    pub fn get(&self, parameter: Parameter) -> Option<u8> {
        match parameter {
            Parameter::Wrinkles => Some(self.wrinkles),
            Parameter::Pores => Some(self.pores),
            Parameter::Spots => Some(self.spots),
            Parameter::DarkCircles => Some(self.dark_circles),
            Parameter::Dehydration => Some(self.dehydration),
            Parameter::Acne => Some(self.acne),
            Parameter::CleanlinessPercent => Some(self.cleanliness_percent),
            Parameter::Radiance => self.radiance,
            Parameter::Firmness => self.firmness,
            Parameter::Oiliness => self.oiliness,
            Parameter::Texture => self.texture,
            Parameter::Redness => self.redness,
            Parameter::EyeBag => self.eye_bag,
            Parameter::TearTrough => self.tear_trough,
            Parameter::SkinAge => self.skin_age,
        }
    }

    /// Store a score, clamping it into range. Setting cleanliness marks it supplied.
    pub(crate) fn set(&mut self, parameter: Parameter, value: u8) {
        let value = value.min(SCORE_MAX);
        match parameter {
            Parameter::Wrinkles => self.wrinkles = value,
            Parameter::Pores => self.pores = value,
            Parameter::Spots => self.spots = value,
            Parameter::DarkCircles => self.dark_circles = value,
            Parameter::Dehydration => self.dehydration = value,
            Parameter::Acne => self.acne = value,
            Parameter::CleanlinessPercent => {
                self.cleanliness_percent = value;
                self.cleanliness_origin = CleanlinessOrigin::Supplied;
            }
            Parameter::Radiance => self.radiance = Some(value),
            Parameter::Firmness => self.firmness = Some(value),
            Parameter::Oiliness => self.oiliness = Some(value),
            Parameter::Texture => self.texture = Some(value),
            Parameter::Redness => self.redness = Some(value),
            Parameter::EyeBag => self.eye_bag = Some(value),
            Parameter::TearTrough => self.tear_trough = Some(value),
            Parameter::SkinAge => self.skin_age = Some(value),
        }
    }

    pub fn cleanliness_origin(&self) -> CleanlinessOrigin {
        self.cleanliness_origin
    }

    /// Present parameters in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (Parameter, u8)> + '_ {
        Parameter::ALL
            .iter()
            .filter_map(move |p| self.get(*p).map(|v| (*p, v)))
    }

    /// Every present value lies in `[0, 100]`
    pub fn is_bounded(&self) -> bool {
        self.iter().all(|(_, v)| v <= SCORE_MAX)
    }

    pub fn core_mean(&self) -> f64 {
        let sum: f64 = Parameter::CORE
            .iter()
            .filter_map(|p| self.get(*p))
            .map(f64::from)
            .sum();
        sum / Parameter::CORE.len() as f64
    }

    /// `clamp(round(100 - mean(core six)))`
    pub fn derived_cleanliness(&self) -> u8 {
        clamp_score(f64::from(SCORE_MAX) - self.core_mean())
    }

    /// Recompute cleanliness unless a source supplied it
    pub(crate) fn rederive_cleanliness(&mut self) {
        if self.cleanliness_origin == CleanlinessOrigin::Derived {
            self.cleanliness_percent = self.derived_cleanliness();
        }
    }

    /// Weighted health figure over the core six, see [`OVERALL_HEALTH_WEIGHTS`]
    pub fn overall_health(&self) -> u8 {
        let weighted: f64 = Parameter::CORE
            .iter()
            .zip(OVERALL_HEALTH_WEIGHTS.iter())
            .filter_map(|(p, w)| self.get(*p).map(|v| f64::from(v) * w))
            .sum();
        clamp_score(f64::from(SCORE_MAX) - weighted)
    }
}
