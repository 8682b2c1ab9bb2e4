use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Serial link connection state, broadcast on a `watch` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Failed with a human-readable reason string
    Failed(String),
}

impl serde::Serialize for ConnectionState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::Failed(_) => "Failed",
        };
        serializer.serialize_str(s)
    }
}

/// Point-in-time health snapshot of a driver.
#[derive(Debug, Clone, Serialize)]
pub struct DriverHealth {
    pub status: HealthStatus,
    pub last_activity: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub average_response_time: Duration,
}
