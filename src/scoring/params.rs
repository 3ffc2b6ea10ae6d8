//! Scored parameters and their names on each side of the normalization boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named skin parameter carried by a [`ScoreSet`](super::ScoreSet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Parameter {
    Wrinkles,
    Pores,
    Spots,
    DarkCircles,
    Dehydration,
    Acne,
    CleanlinessPercent,
    Radiance,
    Firmness,
    Oiliness,
    Texture,
    Redness,
    EyeBag,
    TearTrough,
    SkinAge,
}

impl Parameter {
    /// The six measured parameters that feed the derived fields
    pub const CORE: [Parameter; 6] = [
        Parameter::Wrinkles,
        Parameter::Pores,
        Parameter::Spots,
        Parameter::DarkCircles,
        Parameter::Dehydration,
        Parameter::Acne,
    ];

    /// Optional parameters, emitted only when a source measures them
    pub const EXTENDED: [Parameter; 8] = [
        Parameter::Radiance,
        Parameter::Firmness,
        Parameter::Oiliness,
        Parameter::Texture,
        Parameter::Redness,
        Parameter::EyeBag,
        Parameter::TearTrough,
        Parameter::SkinAge,
    ];

    pub const ALL: [Parameter; 15] = [
        Parameter::Wrinkles,
        Parameter::Pores,
        Parameter::Spots,
        Parameter::DarkCircles,
        Parameter::Dehydration,
        Parameter::Acne,
        Parameter::CleanlinessPercent,
        Parameter::Radiance,
        Parameter::Firmness,
        Parameter::Oiliness,
        Parameter::Texture,
        Parameter::Redness,
        Parameter::EyeBag,
        Parameter::TearTrough,
        Parameter::SkinAge,
    ];

    /// Public (camelCase) name used in score sets and specialist replies
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Wrinkles => "wrinkles",
            Parameter::Pores => "pores",
            Parameter::Spots => "spots",
            Parameter::DarkCircles => "darkCircles",
            Parameter::Dehydration => "dehydration",
            Parameter::Acne => "acne",
            Parameter::CleanlinessPercent => "cleanlinessPercent",
            Parameter::Radiance => "radiance",
            Parameter::Firmness => "firmness",
            Parameter::Oiliness => "oiliness",
            Parameter::Texture => "texture",
            Parameter::Redness => "redness",
            Parameter::EyeBag => "eyeBag",
            Parameter::TearTrough => "tearTrough",
            Parameter::SkinAge => "skinAge",
        }
    }

    /// Key used by the remote analysis service's score document
    pub fn remote_key(&self) -> &'static str {
        match self {
            Parameter::Wrinkles => "hd_wrinkle",
            Parameter::Pores => "hd_pore",
            Parameter::Spots => "hd_age_spot",
            Parameter::DarkCircles => "hd_dark_circle",
            Parameter::Dehydration => "hd_moisture",
            Parameter::Acne => "hd_acne",
            Parameter::CleanlinessPercent => "all",
            Parameter::Radiance => "hd_radiance",
            Parameter::Firmness => "hd_firmness",
            Parameter::Oiliness => "hd_oiliness",
            Parameter::Texture => "hd_texture",
            Parameter::Redness => "hd_redness",
            Parameter::EyeBag => "hd_eye_bag",
            Parameter::TearTrough => "hd_tear_trough",
            Parameter::SkinAge => "skin_age",
        }
    }

    pub fn is_required(&self) -> bool {
        !Self::EXTENDED.contains(self)
    }

    pub fn from_remote_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.remote_key() == key)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown score parameter '{s}'"))
    }
}
