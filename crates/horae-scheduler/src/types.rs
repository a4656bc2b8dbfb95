//! Forecast types used across the scheduling stages

use std::collections::HashMap;

/// Hours in a day
pub const NUM_HOURS_IN_A_DAY: i64 = 24;

/// Per-resource 48-slot projection of expected utilisation.
///
/// Values are milli units: millicores for CPU, milli-bytes for memory.
/// Absent hours are treated as zero by every consumer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    pub resource: String,
    /// Unit of the values, e.g. millicore
    pub unit: String,
    /// Hour of day to expected usage on weekdays, indexed from 0
    pub week_day_hour: HashMap<i16, f32>,
    /// Hour of day to expected usage on weekends, indexed from 0
    pub weekend_hour: HashMap<i16, f32>,
}

impl Forecast {
    pub fn new(resource: &str, unit: &str) -> Self {
        Self {
            resource: resource.to_string(),
            unit: unit.to_string(),
            week_day_hour: HashMap::new(),
            weekend_hour: HashMap::new(),
        }
    }

    /// Largest value across both day types
    pub fn max_usage(&self) -> f32 {
        self.week_day_hour
            .values()
            .chain(self.weekend_hour.values())
            .fold(f32::MIN, |acc, v| acc.max(*v))
    }
}

/// Identity of a pod in the node/pod cache. The cache never stores the
/// full pod object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedPod {
    pub namespace: String,
    pub name: String,
}

impl NamespacedPod {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}
