//! Backend health rollup.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Liveness of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Offline,
}

/// Aggregated service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every backend is online.
    Healthy,
    /// At least half of the backends are online.
    Degraded,
    /// Fewer than half of the backends are online.
    Unhealthy,
}

/// Probe result for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProbe {
    pub name: String,
    pub status: ProbeStatus,
}

/// The rolled-up health report returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub models: Vec<ModelProbe>,
    pub timestamp: String,
}

/// Roll individual probes up into a service status.
pub fn rollup(models: Vec<ModelProbe>) -> HealthReport {
    let total = models.len();
    let online = models
        .iter()
        .filter(|m| m.status == ProbeStatus::Online)
        .count();

    let status = if online == total {
        HealthStatus::Healthy
    } else if online * 2 >= total {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    };

    HealthReport {
        status,
        models,
        timestamp: Utc::now().to_rfc3339(),
    }
}
