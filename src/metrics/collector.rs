//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the gobang-hall service:
//! tier queues and pairing, session lifecycle and online presence.

use crate::types::{Area, Tier};
use anyhow::Result;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the hall service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Matchmaking queue metrics
    queue_metrics: QueueMetrics,

    /// Session lifecycle metrics
    session_metrics: SessionMetrics,

    /// Online presence metrics
    presence_metrics: PresenceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Matchmaking queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Players currently waiting per tier
    pub queue_depth: IntGaugeVec,

    /// Players added to a tier queue
    pub players_queued_total: IntCounterVec,

    /// Match cancellations, split by whether the player was still queued
    pub players_cancelled_total: IntCounterVec,

    /// Pairs that got a room
    pub matches_total: IntCounterVec,

    /// Players pushed back onto a queue by a worker
    pub requeues_total: IntCounterVec,

    /// Room collaborator refusals
    pub room_failures_total: IntCounterVec,

    /// Match notifications that could not be delivered
    pub notification_failures_total: IntCounter,

    /// Time spent by a worker forming one pair
    pub pairing_duration_seconds: HistogramVec,
}

/// Session lifecycle metrics
#[derive(Clone)]
pub struct SessionMetrics {
    pub sessions_created_total: IntCounter,
    pub sessions_expired_total: IntCounter,
    pub sessions_removed_total: IntCounter,
    pub sessions_active: IntGauge,

    /// Expiry transitions (arm, disarm, rearm)
    pub expiry_changes_total: IntCounterVec,
}

/// Online presence metrics
#[derive(Clone)]
pub struct PresenceMetrics {
    /// Users attached per area
    pub online_users: IntGaugeVec,

    /// Connections refused because the user was already online
    pub duplicate_logins_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let session_metrics = SessionMetrics::new(&registry)?;
        let presence_metrics = PresenceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            session_metrics,
            presence_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn session(&self) -> &SessionMetrics {
        &self.session_metrics
    }

    pub fn presence(&self) -> &PresenceMetrics {
        &self.presence_metrics
    }

    /// Record a player entering a tier queue
    pub fn record_player_queued(&self, tier: Tier, depth: usize) {
        self.queue_metrics
            .players_queued_total
            .with_label_values(&[tier.as_str()])
            .inc();
        self.set_queue_depth(tier, depth);
    }

    /// Record a match cancellation request
    pub fn record_player_cancelled(&self, tier: Tier, was_queued: bool, depth: usize) {
        let outcome = if was_queued { "removed" } else { "absent" };
        self.queue_metrics
            .players_cancelled_total
            .with_label_values(&[tier.as_str(), outcome])
            .inc();
        self.set_queue_depth(tier, depth);
    }

    pub fn set_queue_depth(&self, tier: Tier, depth: usize) {
        self.queue_metrics
            .queue_depth
            .with_label_values(&[tier.as_str()])
            .set(depth as i64);
    }

    /// Record a pair that was given a room
    pub fn record_match(&self, tier: Tier, duration: Duration) {
        self.queue_metrics
            .matches_total
            .with_label_values(&[tier.as_str()])
            .inc();
        self.queue_metrics
            .pairing_duration_seconds
            .with_label_values(&[tier.as_str()])
            .observe(duration.as_secs_f64());
    }

    pub fn record_requeue(&self, tier: Tier, reason: &str) {
        self.queue_metrics
            .requeues_total
            .with_label_values(&[tier.as_str(), reason])
            .inc();
    }

    pub fn record_room_failure(&self, tier: Tier) {
        self.queue_metrics
            .room_failures_total
            .with_label_values(&[tier.as_str()])
            .inc();
    }

    pub fn record_notification_failure(&self) {
        self.queue_metrics.notification_failures_total.inc();
    }

    pub fn record_session_created(&self, active: usize) {
        self.session_metrics.sessions_created_total.inc();
        self.session_metrics.sessions_active.set(active as i64);
    }

    pub fn record_session_expired(&self, active: usize) {
        self.session_metrics.sessions_expired_total.inc();
        self.session_metrics.sessions_active.set(active as i64);
    }

    pub fn record_session_removed(&self, active: usize) {
        self.session_metrics.sessions_removed_total.inc();
        self.session_metrics.sessions_active.set(active as i64);
    }

    pub fn record_expiry_change(&self, transition: &str) {
        self.session_metrics
            .expiry_changes_total
            .with_label_values(&[transition])
            .inc();
    }

    pub fn set_online_users(&self, area: Area, count: usize) {
        let label = area.to_string();
        self.presence_metrics
            .online_users
            .with_label_values(&[label.as_str()])
            .set(count as i64);
    }

    pub fn record_duplicate_login(&self) {
        self.presence_metrics.duplicate_logins_total.inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("gobang_hall_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "gobang_hall_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("gobang_hall_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let queue_depth = IntGaugeVec::new(
            Opts::new("gobang_hall_queue_depth", "Players waiting per tier"),
            &["tier"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let players_queued_total = IntCounterVec::new(
            Opts::new(
                "gobang_hall_players_queued_total",
                "Players added to a matchmaking queue",
            ),
            &["tier"],
        )?;
        registry.register(Box::new(players_queued_total.clone()))?;

        let players_cancelled_total = IntCounterVec::new(
            Opts::new(
                "gobang_hall_players_cancelled_total",
                "Matchmaking cancellations",
            ),
            &["tier", "outcome"],
        )?;
        registry.register(Box::new(players_cancelled_total.clone()))?;

        let matches_total = IntCounterVec::new(
            Opts::new("gobang_hall_matches_total", "Pairs placed into a room"),
            &["tier"],
        )?;
        registry.register(Box::new(matches_total.clone()))?;

        let requeues_total = IntCounterVec::new(
            Opts::new(
                "gobang_hall_requeues_total",
                "Players pushed back onto a queue by a worker",
            ),
            &["tier", "reason"],
        )?;
        registry.register(Box::new(requeues_total.clone()))?;

        let room_failures_total = IntCounterVec::new(
            Opts::new(
                "gobang_hall_room_failures_total",
                "Room creation failures during pairing",
            ),
            &["tier"],
        )?;
        registry.register(Box::new(room_failures_total.clone()))?;

        let notification_failures_total = IntCounter::new(
            "gobang_hall_notification_failures_total",
            "Match notifications that could not be sent",
        )?;
        registry.register(Box::new(notification_failures_total.clone()))?;

        let pairing_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gobang_hall_pairing_duration_seconds",
                "Time taken to validate a pair and create its room",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["tier"],
        )?;
        registry.register(Box::new(pairing_duration_seconds.clone()))?;

        Ok(Self {
            queue_depth,
            players_queued_total,
            players_cancelled_total,
            matches_total,
            requeues_total,
            room_failures_total,
            notification_failures_total,
            pairing_duration_seconds,
        })
    }
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let sessions_created_total = IntCounter::new(
            "gobang_hall_sessions_created_total",
            "Login sessions created",
        )?;
        registry.register(Box::new(sessions_created_total.clone()))?;

        let sessions_expired_total = IntCounter::new(
            "gobang_hall_sessions_expired_total",
            "Login sessions removed by their expiry timer",
        )?;
        registry.register(Box::new(sessions_expired_total.clone()))?;

        let sessions_removed_total = IntCounter::new(
            "gobang_hall_sessions_removed_total",
            "Login sessions removed explicitly",
        )?;
        registry.register(Box::new(sessions_removed_total.clone()))?;

        let sessions_active =
            IntGauge::new("gobang_hall_sessions_active", "Login sessions alive")?;
        registry.register(Box::new(sessions_active.clone()))?;

        let expiry_changes_total = IntCounterVec::new(
            Opts::new(
                "gobang_hall_session_expiry_changes_total",
                "Session expiry transitions",
            ),
            &["transition"],
        )?;
        registry.register(Box::new(expiry_changes_total.clone()))?;

        Ok(Self {
            sessions_created_total,
            sessions_expired_total,
            sessions_removed_total,
            sessions_active,
            expiry_changes_total,
        })
    }
}

impl PresenceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let online_users = IntGaugeVec::new(
            Opts::new("gobang_hall_online_users", "Users attached per area"),
            &["area"],
        )?;
        registry.register(Box::new(online_users.clone()))?;

        let duplicate_logins_total = IntCounter::new(
            "gobang_hall_duplicate_logins_total",
            "Connections refused because the user was already online",
        )?;
        registry.register(Box::new(duplicate_logins_total.clone()))?;

        Ok(Self {
            online_users,
            duplicate_logins_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
