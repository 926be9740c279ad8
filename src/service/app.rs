//! Main application state and service coordination
//!
//! `AppState` wires the hall components together, starts the matchmaking
//! workers and the health server, and tears them down again.

use crate::config::AppConfig;
use crate::directory::{InMemoryRoomService, InMemoryUserDirectory};
use crate::hall::HallService;
use crate::matchmaker::Matchmaker;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::presence::OnlineUserRegistry;
use crate::session::{SessionRegistry, TokioTimerService};
use crate::types::{Area, Tier};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Matchmaker error: {message}")]
    Matchmaker { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
///
/// Cloning is cheap; every clone refers to the same running service.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    config: Arc<AppConfig>,

    /// Prometheus metrics shared by every component
    metrics: Arc<MetricsCollector>,

    /// Collaborators backing the standalone service
    users: Arc<InMemoryUserDirectory>,
    rooms: Arc<InMemoryRoomService>,

    /// Hall core
    presence: Arc<OnlineUserRegistry>,
    sessions: SessionRegistry,
    matchmaker: Matchmaker,
    hall: HallService,

    /// Background task handles
    background_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,

    /// Stops the health server
    health_shutdown: Arc<Mutex<Option<broadcast::Sender<()>>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: DateTime<Utc>,
}

impl AppState {
    /// Initialize the application with all dependencies
    ///
    /// Must be called from within a tokio runtime, which hosts the session
    /// expiry timers.
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing gobang-hall service");
        info!(
            "Configuration: service={}, session_timeout={}ms, tiers={}/{}",
            config.service.name,
            config.session.timeout_ms,
            config.matchmaking.middle_tier_floor,
            config.matchmaking.top_tier_floor
        );

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let runtime = Handle::try_current().map_err(|e| ServiceError::Initialization {
            message: format!("No tokio runtime for session timers: {}", e),
        })?;

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let users = Arc::new(InMemoryUserDirectory::new());
        let rooms = Arc::new(InMemoryRoomService::new());
        let presence = Arc::new(OnlineUserRegistry::new());
        let sessions = SessionRegistry::with_metrics(
            Arc::new(TokioTimerService::new(runtime)),
            metrics.clone(),
        );
        let matchmaker = Matchmaker::with_config(
            users.clone(),
            rooms.clone(),
            presence.clone(),
            metrics.clone(),
            config.matchmaker_config(),
        );
        let hall = HallService::new(
            sessions.clone(),
            presence.clone(),
            matchmaker.clone(),
            users.clone(),
            rooms.clone(),
            metrics.clone(),
            config.session_timeout(),
            config.session.cookie_name.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            metrics,
            users,
            rooms,
            presence,
            sessions,
            matchmaker,
            hall,
            background_tasks: Arc::new(Mutex::new(Vec::new())),
            health_shutdown: Arc::new(Mutex::new(None)),
            is_running: Arc::new(RwLock::new(false)),
            started_at: current_timestamp(),
        })
    }

    /// Start matchmaking workers, health endpoints and background tasks
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting gobang-hall service");

        self.matchmaker
            .start()
            .map_err(|e| ServiceError::Matchmaker {
                message: format!("Failed to start workers: {}", e),
            })?;

        *self.is_running.write().await = true;

        self.start_health_server().await?;
        self.start_background_tasks().await;

        info!("✅ gobang-hall service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of gobang-hall service");

        *self.is_running.write().await = false;

        if let Some(shutdown_tx) = self.health_shutdown.lock().await.take() {
            if shutdown_tx.send(()).is_err() {
                debug!("Health server already stopped");
            }
        }

        // Joining the worker threads blocks
        let matchmaker = self.matchmaker.clone();
        tokio::task::spawn_blocking(move || matchmaker.shutdown())
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Matchmaker shutdown task failed: {}", e),
            })?
            .map_err(|e| ServiceError::Matchmaker {
                message: e.to_string(),
            })?;
        info!("✅ Matchmaking workers stopped");

        self.stop_background_tasks().await;

        info!("Final matchmaker statistics: {:?}", self.matchmaker.stats());
        info!("✅ gobang-hall service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn users(&self) -> &Arc<InMemoryUserDirectory> {
        &self.users
    }

    pub fn rooms(&self) -> &Arc<InMemoryRoomService> {
        &self.rooms
    }

    pub fn presence(&self) -> &OnlineUserRegistry {
        &self.presence
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    /// Entry points for the connection transport
    pub fn hall(&self) -> &HallService {
        &self.hall
    }

    async fn start_health_server(&self) -> Result<(), ServiceError> {
        let port = self.config.service.health_port;
        info!("Starting health endpoints on port {}", port);

        let health_config = HealthServerConfig {
            port,
            host: "0.0.0.0".to_string(),
        };
        let server = HealthServer::new(health_config, self.metrics.clone())
            .with_app_state(self.clone());
        *self.health_shutdown.lock().await = Some(server.shutdown_handle());

        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Health server failed: {}", e);
            } else {
                info!("Health server task completed");
            }
        });
        self.background_tasks.lock().await.push(handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    async fn start_background_tasks(&self) {
        info!("Starting metrics refresh task (15s interval)...");

        let app = self.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(15));
            let start_time = tokio::time::Instant::now();

            while app.is_running().await {
                interval.tick().await;
                app.refresh_metrics(start_time.elapsed());
            }

            debug!("Metrics refresh task stopped");
        });

        self.background_tasks.lock().await.push(task);
    }

    /// Push gauge values that are not updated on every operation
    fn refresh_metrics(&self, uptime: Duration) {
        let metrics = &self.metrics;
        metrics.service().uptime_seconds.set(uptime.as_secs() as i64);

        for tier in Tier::ALL {
            metrics.set_queue_depth(tier, self.matchmaker.queue_len(tier));
        }

        let mut healthy = true;
        for area in [Area::Hall, Area::Room] {
            match self.presence.count(area) {
                Ok(count) => metrics.set_online_users(area, count),
                Err(e) => {
                    warn!("Failed to count {} users: {}", area, e);
                    healthy = false;
                }
            }
        }

        let workers = self.matchmaker.is_running();
        metrics.update_component_health("matchmaker", workers);
        metrics.update_component_health("presence", healthy);
        metrics.update_health_status(match (workers, healthy) {
            (true, true) => 2,
            (true, false) => 1,
            (false, _) => 0,
        });

        debug!(
            "Refreshed metrics - uptime: {}s, sessions: {}",
            uptime.as_secs(),
            self.sessions.len()
        );
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let tasks: Vec<_> = self.background_tasks.lock().await.drain(..).collect();
        if tasks.is_empty() {
            return;
        }

        info!("Stopping {} background tasks...", tasks.len());
        for task in tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::ChannelConnection;
    use crate::types::{HallResponse, OpType, UserRecord};

    fn config(port: u16) -> AppConfig {
        let mut config = AppConfig::default();
        config.service.health_port = port;
        config.matchmaking.worker_idle_poll_ms = 20;
        config
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = config(18_741);
        config.session.timeout_ms = 0;

        let result = AppState::new(config).await;
        assert!(matches!(result, Err(ServiceError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let app = AppState::new(config(18_742)).await.unwrap();
        assert!(!app.is_running().await);

        app.start().await.unwrap();
        assert!(app.is_running().await);
        assert!(app.matchmaker().is_running());

        app.shutdown().await.unwrap();
        assert!(!app.is_running().await);
        assert!(!app.matchmaker().is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_players_matched_through_hall() {
        let app = AppState::new(config(18_743)).await.unwrap();
        app.start().await.unwrap();

        let mut receivers = Vec::new();
        for user_id in [1, 2] {
            app.users()
                .insert(UserRecord::new(user_id, format!("user{}", user_id)))
                .unwrap();
            let session = app.hall().login(user_id).unwrap();
            let (conn, rx) = ChannelConnection::pair(user_id);
            app.hall().open_hall(session.id(), conn).unwrap();
            let reply = app
                .hall()
                .handle_hall_message(session.id(), br#"{"optype":"match_start"}"#)
                .unwrap();
            assert!(reply.result);
            receivers.push(rx);
        }

        for rx in receivers.iter_mut() {
            let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let response: HallResponse = serde_json::from_slice(&payload).unwrap();
            assert_eq!(response.optype, OpType::MatchSuccess);
        }
        assert_eq!(app.rooms().room_count(), 1);

        app.shutdown().await.unwrap();
    }
}
