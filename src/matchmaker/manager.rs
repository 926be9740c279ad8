//! Matchmaker: tier queues plus their worker threads

use crate::directory::{RoomService, UserDirectory};
use crate::error::{HallError, Result};
use crate::matchmaker::pairing::PairOutcome;
use crate::metrics::MetricsCollector;
use crate::presence::OnlineUserRegistry;
use crate::queue::BlockingTierQueue;
use crate::types::{Tier, TierBoundaries, UserId};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Matchmaker tuning
#[derive(Debug, Clone)]
pub struct MatchmakerConfig {
    /// Score floors of the upper tiers
    pub boundaries: TierBoundaries,
    /// How long a blocked worker waits before re-checking for shutdown
    pub idle_poll: Duration,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            boundaries: TierBoundaries::default(),
            idle_poll: Duration::from_millis(500),
        }
    }
}

/// Counters about matchmaker activity
#[derive(Debug, Clone, Default)]
pub struct MatchmakerStats {
    pub players_queued: u64,
    pub players_cancelled: u64,
    pub matches_made: u64,
    pub requeues: u64,
    pub notification_failures: u64,
    /// Players waiting right now, per tier in `Tier::ALL` order
    pub waiting: [usize; 3],
}

pub(crate) struct MatchmakerInner {
    queues: [BlockingTierQueue<UserId>; 3],
    config: MatchmakerConfig,
    users: Arc<dyn UserDirectory>,
    pub(crate) rooms: Arc<dyn RoomService>,
    pub(crate) presence: Arc<OnlineUserRegistry>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) stats: RwLock<MatchmakerStats>,
}

/// Pairs waiting players inside their score tier
#[derive(Clone)]
pub struct Matchmaker {
    inner: Arc<MatchmakerInner>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Matchmaker {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        rooms: Arc<dyn RoomService>,
        presence: Arc<OnlineUserRegistry>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self::with_config(users, rooms, presence, metrics, MatchmakerConfig::default())
    }

    pub fn with_config(
        users: Arc<dyn UserDirectory>,
        rooms: Arc<dyn RoomService>,
        presence: Arc<OnlineUserRegistry>,
        metrics: Arc<MetricsCollector>,
        config: MatchmakerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MatchmakerInner {
                queues: Default::default(),
                config,
                users,
                rooms,
                presence,
                metrics,
                stats: RwLock::new(MatchmakerStats::default()),
            }),
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a player in the tier matching their current score
    ///
    /// Fails with [`HallError::UserNotFound`] when the directory does not
    /// know the user.
    pub fn add(&self, user_id: UserId) -> Result<Tier> {
        self.inner.add(user_id)
    }

    /// Withdraw a player from the tier matching their current score
    ///
    /// A player already taken by a worker is not recalled; the match goes
    /// ahead.
    pub fn cancel(&self, user_id: UserId) -> Result<Tier> {
        let tier = self.inner.tier_of(user_id)?;
        let queue = self.inner.queue(tier);
        let removed = queue.remove(&user_id);

        self.inner
            .metrics
            .record_player_cancelled(tier, removed, queue.len());
        if removed {
            if let Ok(mut stats) = self.inner.stats.write() {
                stats.players_cancelled += 1;
            }
            debug!("User {} left the tier {} queue", user_id, tier);
        } else {
            debug!(
                "User {} was not waiting in tier {}; cancel has no effect",
                user_id, tier
            );
        }
        Ok(tier)
    }

    /// Run one pairing attempt on the calling thread
    pub fn pair_once(&self, tier: Tier) -> PairOutcome {
        self.inner.pair_once(tier)
    }

    /// Spawn one worker thread per tier
    pub fn start(&self) -> Result<()> {
        let mut workers = self
            .workers
            .lock()
            .map_err(|_| HallError::poisoned("matchmaker workers"))?;
        if !workers.is_empty() {
            warn!("Matchmaker workers already running");
            return Ok(());
        }

        for tier in Tier::ALL {
            let inner = self.inner.clone();
            let handle = thread::Builder::new()
                .name(format!("match-tier-{}", tier))
                .spawn(move || inner.run_tier_worker(tier))
                .map_err(|e| HallError::InternalError {
                    message: format!("Failed to spawn worker for tier {}: {}", tier, e),
                })?;
            workers.push(handle);
        }

        info!("Started {} matchmaking workers", workers.len());
        Ok(())
    }

    /// Close every queue and wait for the workers to exit
    ///
    /// Players still waiting are discarded; the matchmaker cannot be
    /// restarted afterwards.
    pub fn shutdown(&self) -> Result<()> {
        for queue in &self.inner.queues {
            queue.close();
        }

        let handles: Vec<_> = self
            .workers
            .lock()
            .map_err(|_| HallError::poisoned("matchmaker workers"))?
            .drain(..)
            .collect();

        for handle in handles {
            let name = handle.thread().name().unwrap_or("match-tier").to_string();
            if handle.join().is_err() {
                error!("Worker {} panicked", name);
            }
        }

        info!("Matchmaker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.workers
            .lock()
            .map(|workers| !workers.is_empty())
            .unwrap_or(false)
    }

    pub fn queue_len(&self, tier: Tier) -> usize {
        self.inner.queue(tier).len()
    }

    /// Players waiting in a tier, head first
    pub fn waiting(&self, tier: Tier) -> Vec<UserId> {
        self.inner.queue(tier).snapshot()
    }

    pub fn tier_of(&self, user_id: UserId) -> Result<Tier> {
        self.inner.tier_of(user_id)
    }

    pub fn stats(&self) -> MatchmakerStats {
        let mut stats = self
            .inner
            .stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default();
        for tier in Tier::ALL {
            stats.waiting[tier.index()] = self.queue_len(tier);
        }
        stats
    }
}

impl MatchmakerInner {
    pub(crate) fn queue(&self, tier: Tier) -> &BlockingTierQueue<UserId> {
        &self.queues[tier.index()]
    }

    pub(crate) fn tier_of(&self, user_id: UserId) -> Result<Tier> {
        let user = self
            .users
            .find_user(user_id)?
            .ok_or(HallError::UserNotFound { user_id })?;
        Ok(Tier::from_score(user.score, &self.config.boundaries))
    }

    pub(crate) fn add(&self, user_id: UserId) -> Result<Tier> {
        let tier = self.tier_of(user_id)?;
        let queue = self.queue(tier);
        queue.push(user_id);

        self.metrics.record_player_queued(tier, queue.len());
        if let Ok(mut stats) = self.stats.write() {
            stats.players_queued += 1;
        }
        debug!("User {} queued in tier {}", user_id, tier);
        Ok(tier)
    }

    fn run_tier_worker(&self, tier: Tier) {
        info!("Tier {} worker started", tier);
        let queue = self.queue(tier);

        loop {
            let ready = queue.wait_until_len_timeout(2, self.config.idle_poll);
            // Players left behind at close are discarded, not paired
            if queue.is_closed() {
                break;
            }
            if ready {
                self.pair_once(tier);
            }
        }

        info!("Tier {} worker stopped", tier);
    }
}
