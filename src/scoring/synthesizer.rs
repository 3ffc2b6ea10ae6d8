//! Merge heterogeneous source readings into one bounded [`ScoreSet`]
//!
//! Each source covers a fixed, non-overlapping subset of parameters. Merging
//! is a key union; anything left uncovered falls back to [`DEFAULT_SCORE`].
//! A failing source degrades the result, it never aborts it.

use super::calibration::{calibrate, CalibrationContext};
use super::params::Parameter;
use super::raw::RawMeasurement;
use super::score_set::{clamp_score, ScoreSet, DEFAULT_SCORE};
use super::seed::sub_call_seed;
use crate::imaging::NormalizedImage;
use crate::observability::metrics;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Raw measurements from one source, keyed by parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceReading {
    pub source: String,
    pub values: BTreeMap<Parameter, RawMeasurement>,
}

impl SourceReading {
    pub fn new<S: Into<String>>(source: S) -> Self {
        Self {
            source: source.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, parameter: Parameter, value: RawMeasurement) -> Self {
        self.values.insert(parameter, value);
        self
    }

    /// Map a remote score document (`hd_*` keys) into a reading.
    /// Unknown keys are ignored.
    pub fn from_remote_document<S: Into<String>>(source: S, document: &Map<String, Value>) -> Self {
        let values = document
            .iter()
            .filter_map(|(key, value)| {
                Parameter::from_remote_key(key).map(|p| (p, RawMeasurement::from_value(value)))
            })
            .collect();
        Self {
            source: source.into(),
            values,
        }
    }

    /// Map a reply keyed by public parameter names, keeping only `covered` ones
    pub fn from_named_values<S: Into<String>>(
        source: S,
        document: &Map<String, Value>,
        covered: &[Parameter],
    ) -> Self {
        let values = covered
            .iter()
            .filter_map(|p| {
                document
                    .get(p.name())
                    .map(|value| (*p, RawMeasurement::from_value(value)))
            })
            .collect();
        Self {
            source: source.into(),
            values,
        }
    }
}

/// Key union of readings. On overlap the earlier reading wins.
pub fn merge_readings(readings: &[SourceReading]) -> BTreeMap<Parameter, RawMeasurement> {
    let mut merged = BTreeMap::new();
    for reading in readings {
        for (parameter, value) in &reading.values {
            if merged.contains_key(parameter) {
                warn!(
                    source = %reading.source,
                    parameter = %parameter,
                    "Parameter already covered by an earlier source, ignoring"
                );
                continue;
            }
            merged.insert(*parameter, value.clone());
        }
    }
    merged
}

/// Normalize one measurement: round, clamp, default when unusable
pub fn normalize_measurement(measurement: Option<&RawMeasurement>) -> u8 {
    measurement
        .and_then(RawMeasurement::value)
        .map(clamp_score)
        .unwrap_or(DEFAULT_SCORE)
}

/// Build a [`ScoreSet`] from readings without calibration
pub fn synthesize(readings: &[SourceReading]) -> ScoreSet {
    let merged = merge_readings(readings);
    let mut scores = ScoreSet::default();

    for parameter in Parameter::CORE {
        scores.set(parameter, normalize_measurement(merged.get(&parameter)));
    }

    if let Some(value) = merged
        .get(&Parameter::CleanlinessPercent)
        .and_then(RawMeasurement::value)
    {
        scores.set(Parameter::CleanlinessPercent, clamp_score(value));
    }

    for parameter in Parameter::EXTENDED {
        if let Some(value) = merged.get(&parameter).and_then(RawMeasurement::value) {
            scores.set(parameter, clamp_score(value));
        }
    }

    scores.rederive_cleanliness();
    scores
}

#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),
    #[error("Unexpected source reply: {0}")]
    InvalidReply(String),
}

/// An independent scorer covering a fixed parameter subset
#[async_trait]
pub trait ScoreSource: Send + Sync {
    fn name(&self) -> &str;

    fn covers(&self) -> &[Parameter];

    /// Measure the covered parameters. `seed` is reproducible for a given image.
    async fn measure(&self, image: &NormalizedImage, seed: u64)
        -> Result<SourceReading, SourceError>;
}

/// Runs specialist sources alongside the primary reading and merges the results
#[derive(Default)]
pub struct ScoreSynthesizer {
    specialists: Vec<Arc<dyn ScoreSource>>,
}

impl ScoreSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_specialists(specialists: Vec<Arc<dyn ScoreSource>>) -> Self {
        let mut seen: Vec<Parameter> = Vec::new();
        for source in &specialists {
            for parameter in source.covers() {
                if seen.contains(parameter) {
                    warn!(
                        source = source.name(),
                        parameter = %parameter,
                        "Specialist sources overlap; the earlier one will win"
                    );
                }
                seen.push(*parameter);
            }
        }
        Self { specialists }
    }

    pub fn specialist_count(&self) -> usize {
        self.specialists.len()
    }

    /// Query every specialist concurrently. Sub-call `i` uses `base_seed + i`.
    pub async fn collect_specialists(&self, image: &NormalizedImage) -> Vec<SourceReading> {
        let base_seed = image.content_seed();
        let calls = self
            .specialists
            .iter()
            .enumerate()
            .map(|(index, source)| {
                let seed = sub_call_seed(base_seed, index);
                async move { (source.name().to_string(), source.measure(image, seed).await) }
            });

        join_all(calls)
            .await
            .into_iter()
            .filter_map(|(name, result)| match result {
                Ok(reading) => {
                    debug!(source = %name, values = reading.values.len(), "Specialist reading collected");
                    Some(reading)
                }
                Err(e) => {
                    metrics().specialist_failed();
                    warn!(source = %name, error = %e, "Specialist source failed, using defaults");
                    None
                }
            })
            .collect()
    }

    /// Merge `primary` with specialist readings and optionally calibrate
    pub async fn synthesize(
        &self,
        image: &NormalizedImage,
        primary: SourceReading,
        context: Option<&CalibrationContext>,
    ) -> ScoreSet {
        let mut readings = vec![primary];
        readings.extend(self.collect_specialists(image).await);

        let scores = synthesize(&readings);
        match context {
            Some(context) if !context.is_empty() => calibrate(&scores, context),
            _ => scores,
        }
    }
}
