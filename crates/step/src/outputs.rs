//! Outputs exchanged with the host between the two phases

use serde::{Deserialize, Serialize};
use stepcache_cache::CacheOutcome;

/// Outputs of the restore phase as the host stores them
///
/// The host feeds these back into the persist phase of the same step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutputs {
    /// Whether a cache was found
    #[serde(rename = "cache-hit", default)]
    pub cache_hit: bool,
    /// Restore error message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&CacheOutcome> for StepOutputs {
    fn from(outcome: &CacheOutcome) -> Self {
        Self {
            cache_hit: outcome.cache_hit,
            error: outcome.error.as_ref().map(ToString::to_string),
        }
    }
}
