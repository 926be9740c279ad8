//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use gobang_hall::directory::{InMemoryRoomService, InMemoryUserDirectory};
use gobang_hall::error::{HallError, Result};
use gobang_hall::matchmaker::{Matchmaker, MatchmakerConfig};
use gobang_hall::metrics::MetricsCollector;
use gobang_hall::presence::{ConnectionHandle, OnlineUserRegistry, SharedConnection};
use gobang_hall::session::{ManualTimerService, SessionRegistry};
use gobang_hall::types::{HallResponse, UserId, UserRecord, SESSION_TIMEOUT};
use gobang_hall::HallService;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Connection that records every payload it is asked to deliver
#[derive(Debug)]
pub struct RecordingConnection {
    user_id: UserId,
    sent: Mutex<Vec<Vec<u8>>>,
    open: AtomicBool,
}

impl RecordingConnection {
    pub fn new(user_id: UserId) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        })
    }

    /// Make later sends fail as if the socket dropped
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn responses(&self) -> Vec<HallResponse> {
        self.sent
            .lock()
            .map(|sent| {
                sent.iter()
                    .filter_map(|payload| serde_json::from_slice(payload).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

impl ConnectionHandle for RecordingConnection {
    fn send(&self, payload: Vec<u8>) -> Result<()> {
        if !self.is_open() {
            return Err(HallError::ConnectionClosed {
                user_id: self.user_id,
            }
            .into());
        }
        self.sent
            .lock()
            .map_err(|_| HallError::poisoned("recording connection"))?
            .push(payload);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// A fully wired hall driven by a virtual clock
pub struct TestHall {
    pub timers: ManualTimerService,
    pub metrics: Arc<MetricsCollector>,
    pub users: Arc<InMemoryUserDirectory>,
    pub rooms: Arc<InMemoryRoomService>,
    pub presence: Arc<OnlineUserRegistry>,
    pub sessions: SessionRegistry,
    pub matchmaker: Matchmaker,
    pub hall: HallService,
}

impl TestHall {
    pub fn new() -> Self {
        Self::with_timers(ManualTimerService::new())
    }

    /// Hall whose timer cancellation never stops an armed callback
    pub fn with_lagging_timers() -> Self {
        Self::with_timers(ManualTimerService::lagging_cancel())
    }

    fn with_timers(timers: ManualTimerService) -> Self {
        let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));
        let users = Arc::new(InMemoryUserDirectory::new());
        let rooms = Arc::new(InMemoryRoomService::new());
        let presence = Arc::new(OnlineUserRegistry::new());
        let sessions = SessionRegistry::with_metrics(Arc::new(timers.clone()), metrics.clone());
        let matchmaker = Matchmaker::with_config(
            users.clone(),
            rooms.clone(),
            presence.clone(),
            metrics.clone(),
            MatchmakerConfig {
                idle_poll: Duration::from_millis(10),
                ..Default::default()
            },
        );
        let hall = HallService::new(
            sessions.clone(),
            presence.clone(),
            matchmaker.clone(),
            users.clone(),
            rooms.clone(),
            metrics.clone(),
            SESSION_TIMEOUT,
            "SSID",
        );

        Self {
            timers,
            metrics,
            users,
            rooms,
            presence,
            sessions,
            matchmaker,
            hall,
        }
    }

    pub fn register(&self, user_id: UserId, score: u32) {
        self.users
            .insert(UserRecord::new(user_id, format!("player{}", user_id)).with_score(score))
            .expect("insert user");
    }

    /// Register, log in and open the hall connection of a user
    pub fn enter_hall(&self, user_id: UserId, score: u32) -> (u64, Arc<RecordingConnection>) {
        self.register(user_id, score);
        let session = self.hall.login(user_id).expect("login");
        let conn = RecordingConnection::new(user_id);
        let shared: SharedConnection = conn.clone();
        let reply = self.hall.open_hall(session.id(), shared).expect("open hall");
        assert!(reply.result, "hall refused user {}: {:?}", user_id, reply.reason);
        (session.id(), conn)
    }
}

/// Poll `condition` until it holds or two seconds pass
pub fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
