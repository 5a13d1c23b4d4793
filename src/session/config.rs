use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::camera::{Facing, ResolutionHint};
use crate::decode::{BackendSource, SymbolFormat};
use crate::error::{Result, ScanError};

/// Everything a caller can tune when starting a session.
///
/// Deserializes from partial JSON; missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    pub preferred_facing: Facing,
    pub required_formats: BTreeSet<SymbolFormat>,
    /// Window during which the same value is not re-reported.
    pub cooldown_ms: u64,
    /// Consecutive misses before the first hint.
    pub failure_hint_threshold: u32,
    /// Minimum gap between two hints.
    pub hint_reprompt_ms: u64,
    /// How long the loop stays paused after an accepted detection.
    pub detection_pause_ms: u64,
    pub native_poll_ms: u64,
    pub fallback_interval_ms: u64,
    pub decode_timeout_ms: u64,
    pub cooldown_retention_ms: u64,
    pub cooldown_table_limit: usize,
    pub resolution: ResolutionHint,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            preferred_facing: Facing::Environment,
            required_formats: SymbolFormat::retail_defaults(),
            cooldown_ms: 4_500,
            failure_hint_threshold: 4,
            hint_reprompt_ms: 30_000,
            detection_pause_ms: 1_500,
            native_poll_ms: 200,
            fallback_interval_ms: 300,
            decode_timeout_ms: 2_000,
            cooldown_retention_ms: 60_000,
            cooldown_table_limit: 1_000,
            resolution: ResolutionHint::default(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.required_formats.is_empty() {
            return Err(ScanError::InvalidConfig(
                "requiredFormats must name at least one format".into(),
            ));
        }
        if self.failure_hint_threshold == 0 {
            return Err(ScanError::InvalidConfig(
                "failureHintThreshold must be at least 1".into(),
            ));
        }
        let intervals = [
            ("nativePollMs", self.native_poll_ms),
            ("fallbackIntervalMs", self.fallback_interval_ms),
            ("decodeTimeoutMs", self.decode_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ScanError::InvalidConfig(format!("{name} must be non-zero")));
        }
        if self.cooldown_table_limit == 0 {
            return Err(ScanError::InvalidConfig(
                "cooldownTableLimit must be non-zero".into(),
            ));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(ScanError::InvalidConfig("resolution must be non-empty".into()));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn cooldown_retention(&self) -> Duration {
        Duration::from_millis(self.cooldown_retention_ms)
    }

    pub fn hint_reprompt(&self) -> Duration {
        Duration::from_millis(self.hint_reprompt_ms)
    }

    pub fn detection_pause(&self) -> Duration {
        Duration::from_millis(self.detection_pause_ms)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    /// Tick period for the given backend.
    pub fn cadence(&self, source: BackendSource) -> Duration {
        match source {
            BackendSource::Native => Duration::from_millis(self.native_poll_ms),
            BackendSource::Fallback => Duration::from_millis(self.fallback_interval_ms),
        }
    }
}
