//! Temporal-utilization scheduler plugin
//!
//! Implements the filter and score stages of a scheduling pipeline over
//! per-hour usage forecasts instead of declared resource requests alone.
//! The scheduling framework itself is an external collaborator; the narrow
//! interface it exposes to this plugin lives in [`framework`].

pub mod cache;
pub mod fit;
pub mod forecast;
pub mod framework;
pub mod lister;
pub mod overcommit;
pub mod plugin;
pub mod qos;
pub mod quantity;
pub mod scorer;
pub mod types;

pub use cache::UsageTemplateManager;
pub use plugin::TemporalUtilization;
pub use types::{Forecast, NamespacedPod};
