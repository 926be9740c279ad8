//! Service layer for the gobang-hall service
//!
//! This module contains the main application state, service coordination,
//! and health reporting for the production service.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{ComponentCheck, HealthCheck, HealthStatus, ServiceStats};
