//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the gobang-hall
//! service, including readiness and liveness probes.

use crate::service::app::AppState;
use crate::types::{Area, Tier};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported to Prometheus
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.as_gauge() <= other.as_gauge() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional detail when not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Live sessions
    pub active_sessions: usize,
    /// Users attached to the hall
    pub hall_users: usize,
    /// Users attached to a room
    pub room_users: usize,
    /// Players waiting per tier
    pub waiting_normal: usize,
    pub waiting_high: usize,
    pub waiting_super: usize,
    /// Pairs seated in a room since start
    pub matches_made: u64,
    /// Players put back in line since start
    pub requeues: u64,
    /// Service uptime information
    pub uptime_info: String,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: &AppState) -> Result<Self> {
        let mut checks = Vec::new();

        checks.push(Self::check_service_running(app_state).await);
        checks.push(Self::check_matchmaker(app_state));
        checks.push(Self::check_presence(app_state));

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |status, check| status.worst(check.status));

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(app_state),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: &AppState) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - the service can pair players
    pub async fn readiness_check(app_state: &AppState) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }
        Ok(Self::check_matchmaker(app_state).status)
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Workers must be alive for queued players to ever be paired
    fn check_matchmaker(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if app_state.matchmaker().is_running() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Matchmaking workers are not running".to_string()),
            )
        };

        ComponentCheck {
            name: "matchmaker".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_presence(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match app_state.presence().count(Area::Hall) {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                debug!("Presence check failed: {}", e);
                (HealthStatus::Degraded, Some(e.to_string()))
            }
        };

        ComponentCheck {
            name: "presence".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let matchmaker = app_state.matchmaker().stats();
        let presence = app_state.presence();

        ServiceStats {
            active_sessions: app_state.sessions().len(),
            hall_users: presence.count(Area::Hall).unwrap_or(0),
            room_users: presence.count(Area::Room).unwrap_or(0),
            waiting_normal: matchmaker.waiting[Tier::Normal.index()],
            waiting_high: matchmaker.waiting[Tier::High.index()],
            waiting_super: matchmaker.waiting[Tier::Super.index()],
            matches_made: matchmaker.matches_made,
            requeues: matchmaker.requeues,
            uptime_info: format!("Running since {}", app_state.started_at().to_rfc3339()),
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
