//! Rule tables and run configuration
//!
//! Everything here is built once at startup and handed to the engines that
//! need it. Nothing is process-global, so tests can swap tables freely.

pub mod extraction;
pub mod validation;

pub use extraction::{Applicability, ExtractionConfig, ALL_TYPES};
pub use validation::{TypeRules, ValidationConfig, UNIVERSAL_KEY};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do when an incoming record's identifier is already stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Last write wins: the stored row is replaced wholesale
    #[default]
    Overwrite,
    /// The stored row is kept and the incoming record is dropped
    Skip,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(DuplicatePolicy::Overwrite),
            "skip" => Ok(DuplicatePolicy::Skip),
            other => Err(format!(
                "unknown duplicate policy '{}' (expected 'overwrite' or 'skip')",
                other
            )),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicatePolicy::Overwrite => f.write_str("overwrite"),
            DuplicatePolicy::Skip => f.write_str("skip"),
        }
    }
}

/// Configuration for import runs and analytics
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub validation: ValidationConfig,
    pub duplicate_policy: DuplicatePolicy,

    /// Cap on the patient identifiers listed in import statistics
    pub max_patient_refs: usize,

    /// Number of most recent import logs summarized by analytics
    pub recent_log_window: usize,

    /// Length of the missing-field ranking in analytics
    pub missing_fields_top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            extraction: ExtractionConfig::default(),
            validation: ValidationConfig::default(),
            duplicate_policy: DuplicatePolicy::Overwrite,
            max_patient_refs: 100,
            recent_log_window: 10,
            missing_fields_top_n: 5,
        }
    }
}
