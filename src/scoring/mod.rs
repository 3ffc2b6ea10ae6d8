//! Score synthesis
//!
//! Raw per-parameter measurements from one or more sources are normalized
//! into integers in `[0, 100]`, merged into a fixed-schema [`ScoreSet`],
//! given a derived cleanliness figure, and optionally calibrated.

pub mod calibration;
pub mod params;
pub mod raw;
pub mod score_set;
pub mod seed;
pub mod sources;
pub mod synthesizer;

pub use calibration::{calibrate, CalibrationContext, SkinType, SunExposure};
pub use params::Parameter;
pub use raw::RawMeasurement;
pub use score_set::{clamp_score, CleanlinessOrigin, ScoreSet, DEFAULT_SCORE};
pub use seed::{content_seed, sub_call_seed};
pub use sources::LlmSpecialistSource;
pub use synthesizer::{
    merge_readings, synthesize, ScoreSource, ScoreSynthesizer, SourceError, SourceReading,
};
