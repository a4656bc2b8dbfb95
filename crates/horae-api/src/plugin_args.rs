//! Scheduler plugin configuration arguments

use serde::{Deserialize, Serialize};

/// Default hotspot threshold of the versioned configuration
pub const DEFAULT_HOT_SPOT_THRESHOLD: i32 = 60;
/// Default for the hard threshold flag
pub const DEFAULT_HARD_THRESHOLD: bool = false;
/// Default for the overcommit flag
pub const DEFAULT_ENABLE_OVERCOMMIT: bool = true;
/// Default for filtering by temporal usages
pub const DEFAULT_FILTER_BY_TEMPORAL_USAGES: bool = false;

/// Arguments used to configure the TemporalUtilization plugin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TemporalUtilizationArgs {
    /// Utilization percentage beyond which a node is considered hot
    pub hot_spot_threshold: i32,

    /// Whether the threshold is hard or soft. When hard, a node at or past
    /// the threshold is scored out entirely; when soft its score is reduced.
    pub hard_threshold: bool,

    /// Whether the plugin applies overcommit allowances at the filtering stage
    pub enable_overcommit: bool,

    /// Whether the filtering stage uses temporal usages when present
    pub filter_by_temporal_usages: bool,
}

impl Default for TemporalUtilizationArgs {
    fn default() -> Self {
        Self {
            hot_spot_threshold: DEFAULT_HOT_SPOT_THRESHOLD,
            hard_threshold: DEFAULT_HARD_THRESHOLD,
            enable_overcommit: DEFAULT_ENABLE_OVERCOMMIT,
            filter_by_temporal_usages: DEFAULT_FILTER_BY_TEMPORAL_USAGES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_on_empty_config() {
        let args: TemporalUtilizationArgs = serde_json::from_str("{}").unwrap();
        assert_eq!(args.hot_spot_threshold, 60);
        assert!(!args.hard_threshold);
        assert!(args.enable_overcommit);
        assert!(!args.filter_by_temporal_usages);
    }

    #[test]
    fn test_partial_config_overrides() {
        let args: TemporalUtilizationArgs =
            serde_json::from_str(r#"{"hotSpotThreshold": 80, "hardThreshold": true}"#).unwrap();
        assert_eq!(args.hot_spot_threshold, 80);
        assert!(args.hard_threshold);
        assert!(args.enable_overcommit);
    }
}
