use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A finalized measurement handed to a [`crate::Publisher`].
///
/// `value` is already rounded to `accuracy_decimals` by the driver; sinks
/// should not re-scale it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedValue {
    /// Entity name, e.g. `temperature_probe_2`.
    pub entity: Arc<str>,
    /// Channel kind key the entity belongs to, e.g. `temperature`.
    pub channel: &'static str,
    pub value: f64,
    pub accuracy_decimals: u8,
    pub unit: &'static str,
    /// Poll cycle sequence number the value was read in.
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
}

impl PublishedValue {
    /// Render the value with its declared accuracy.
    pub fn display_value(&self) -> String {
        format!("{:.*}", self.accuracy_decimals as usize, self.value)
    }
}
