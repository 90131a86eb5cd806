//! Core types for CervixNet

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::{Error, Result};

/// Default decision threshold
pub const DEFAULT_THRESHOLD: f64 = 0.55;

/// Binary classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Abnormal,
}

impl Label {
    /// Lowercase class name, as reported in the `class` field
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Abnormal => "abnormal",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Abnormal => "Abnormal",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the score is compared against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `score >= threshold` is Abnormal
    #[default]
    AtLeast,
    /// `score > threshold` is Abnormal
    Above,
}

impl Comparison {
    pub fn is_abnormal(&self, score: f64, threshold: f64) -> bool {
        match self {
            Self::AtLeast => score >= threshold,
            Self::Above => score > threshold,
        }
    }
}

/// Which number is reported as `confidence`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceMode {
    /// The raw score, whatever the label
    Raw,
    /// The score oriented toward the predicted class (`1 - score` for Normal)
    #[default]
    Oriented,
}

/// Turns a raw model score into a labelled prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    /// Decision threshold in `[0, 1]`
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Comparison operator at the threshold
    #[serde(default)]
    pub comparison: Comparison,

    /// Confidence reporting convention
    #[serde(default)]
    pub confidence: ConfidenceMode,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            comparison: Comparison::default(),
            confidence: ConfidenceMode::default(),
        }
    }
}

impl ThresholdPolicy {
    /// Create a policy with the given threshold and default conventions
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Set the comparison operator
    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Set the confidence convention
    pub fn with_confidence(mut self, confidence: ConfidenceMode) -> Self {
        self.confidence = confidence;
        self
    }

    /// Reject thresholds outside `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Label for a score
    pub fn label(&self, score: f64) -> Label {
        if self.comparison.is_abnormal(score, self.threshold) {
            Label::Abnormal
        } else {
            Label::Normal
        }
    }

    /// Classify a score observed at `timestamp`
    pub fn classify(&self, score: f64, timestamp: DateTime<Utc>) -> Prediction {
        let label = self.label(score);
        let confidence = match (self.confidence, label) {
            (ConfidenceMode::Raw, _) | (ConfidenceMode::Oriented, Label::Abnormal) => score,
            (ConfidenceMode::Oriented, Label::Normal) => 1.0 - score,
        };

        Prediction {
            label,
            score,
            confidence,
            threshold: self.threshold,
            timestamp,
        }
    }
}

/// Result of one image classification.
///
/// Values are kept at full precision; serialization rounds them with
/// [`round4`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: Label,
    /// Raw model output in `[0, 1]`
    pub score: f64,
    pub confidence: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Prediction", 6)?;
        state.serialize_field("prediction", &self.label)?;
        state.serialize_field("class", self.label.class_name())?;
        state.serialize_field("score", &round4(self.score))?;
        state.serialize_field("confidence", &round4(self.confidence))?;
        state.serialize_field("threshold", &round4(self.threshold))?;
        state.serialize_field(
            "timestamp",
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        state.end()
    }
}

/// Round to 4 decimal places, half away from zero
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}
