//! Metrics and monitoring for the gobang-hall service
//!
//! This module provides Prometheus metrics collection and the HTTP health
//! endpoints.

pub mod collector;
pub mod health;

pub use collector::{
    MetricsCollector, MetricsTimer, PresenceMetrics, QueueMetrics, ServiceMetrics, SessionMetrics,
};
pub use health::{HealthServer, HealthServerConfig};
