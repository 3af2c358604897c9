//! Run identity and per-profile outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a transcode run.
///
/// Also names the run's output directory, so two concurrent runs never
/// share a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How segment boundaries were chosen for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Keyframe timestamps were available to align segment boundaries.
    KeyframeAligned,
    /// Fixed-length segmentation; keyframe data was absent, disabled or the
    /// probe degraded.
    FixedLength,
}

impl SegmentationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyframeAligned => "keyframe_aligned",
            Self::FixedLength => "fixed_length",
        }
    }
}

/// Result of encoding one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum EncodeOutcome {
    /// The encoder exited successfully.
    Completed { elapsed: Duration },
    /// The encoder could not be started, exited non-zero, timed out or was
    /// cancelled mid-flight.
    Failed { reason: String },
    /// Cancellation was observed before this profile started.
    Skipped,
}

impl EncodeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One profile's outcome within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileOutcome {
    /// Profile name
    pub profile: String,
    /// What happened
    pub outcome: EncodeOutcome,
}

/// Per-profile results of one transcode run.
///
/// Replaces a single pass/fail flag: the caller decides whether partial
/// failure constitutes overall failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Run workspace directory
    pub work_dir: PathBuf,
    /// How segments were bounded
    pub segmentation: SegmentationMode,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the run
    pub finished_at: DateTime<Utc>,
    /// One outcome per profile, in profile insertion order
    pub outcomes: Vec<ProfileOutcome>,
}

impl RunReport {
    pub fn all_completed(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome.is_completed())
    }

    pub fn any_failed(&self) -> bool {
        self.outcomes.iter().any(|o| o.outcome.is_failed())
    }

    pub fn outcome_for(&self, profile: &str) -> Option<&EncodeOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.profile == profile)
            .map(|o| &o.outcome)
    }
}
