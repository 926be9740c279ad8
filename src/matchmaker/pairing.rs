//! One pairing step of a tier worker

use crate::matchmaker::manager::MatchmakerInner;
use crate::presence::SharedConnection;
use crate::types::{Area, HallResponse, RoomHandle, Tier, UserId};
use tracing::{debug, error, info, warn};

/// Why a worker put a player back in a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequeueReason {
    /// The queue ran dry between the first and the second pop
    SecondPopFailed,
    /// The same player was queued twice and popped against themselves
    SamePlayer,
    /// The other player left the hall without cancelling
    PeerDisconnected,
    /// The room collaborator refused the pair
    RoomCreationFailed,
}

impl RequeueReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RequeueReason::SecondPopFailed => "second_pop_failed",
            RequeueReason::SamePlayer => "same_player",
            RequeueReason::PeerDisconnected => "peer_disconnected",
            RequeueReason::RoomCreationFailed => "room_creation_failed",
        }
    }
}

/// Result of a single pairing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// Nothing to pop
    Idle,
    /// A room was created and both players were notified
    Matched(RoomHandle),
    /// The attempt was abandoned and survivors went back in line
    Requeued(RequeueReason),
    /// Neither player was still in the hall
    Dropped,
}

impl MatchmakerInner {
    /// Pop two players from `tier` and try to seat them in a room
    ///
    /// Does not block; callers wait for the queue to hold two entries first.
    pub(crate) fn pair_once(&self, tier: Tier) -> PairOutcome {
        let queue = self.queue(tier);
        let timer = self.metrics.start_timer();

        let first = match queue.pop() {
            Some(user_id) => user_id,
            None => return PairOutcome::Idle,
        };
        let second = match queue.pop() {
            Some(user_id) => user_id,
            None => {
                self.requeue(tier, first, RequeueReason::SecondPopFailed);
                return PairOutcome::Requeued(RequeueReason::SecondPopFailed);
            }
        };
        self.metrics.set_queue_depth(tier, queue.len());

        if first == second {
            warn!("User {} was queued twice in tier {}", first, tier);
            self.requeue(tier, first, RequeueReason::SamePlayer);
            return PairOutcome::Requeued(RequeueReason::SamePlayer);
        }

        let first_conn = self.hall_connection(first);
        let second_conn = self.hall_connection(second);
        let (first_conn, second_conn) = match (first_conn, second_conn) {
            (Some(a), Some(b)) => (a, b),
            (Some(_), None) => {
                debug!("User {} left the hall before pairing", second);
                self.requeue(tier, first, RequeueReason::PeerDisconnected);
                return PairOutcome::Requeued(RequeueReason::PeerDisconnected);
            }
            (None, Some(_)) => {
                debug!("User {} left the hall before pairing", first);
                self.requeue(tier, second, RequeueReason::PeerDisconnected);
                return PairOutcome::Requeued(RequeueReason::PeerDisconnected);
            }
            (None, None) => {
                // Unlike a single disconnect, nobody is left to put back in line
                debug!(
                    "Users {} and {} both left the hall before pairing",
                    first, second
                );
                return PairOutcome::Dropped;
            }
        };

        let room = match self.rooms.create_room(first, second) {
            Ok(room) => room,
            Err(e) => {
                error!(
                    "Failed to create room for {} vs {} in tier {}: {}",
                    first, second, tier, e
                );
                self.metrics.record_room_failure(tier);
                self.requeue(tier, first, RequeueReason::RoomCreationFailed);
                self.requeue(tier, second, RequeueReason::RoomCreationFailed);
                return PairOutcome::Requeued(RequeueReason::RoomCreationFailed);
            }
        };

        self.notify_match(first, &first_conn);
        self.notify_match(second, &second_conn);

        self.metrics.record_match(tier, timer.stop());
        if let Ok(mut stats) = self.stats.write() {
            stats.matches_made += 1;
        }
        info!(
            "Matched {} vs {} in tier {} (room {})",
            first, second, tier, room.room_id
        );
        PairOutcome::Matched(room)
    }

    fn hall_connection(&self, user_id: UserId) -> Option<SharedConnection> {
        match self.presence.connection_of(Area::Hall, user_id) {
            Ok(conn) => conn,
            Err(e) => {
                error!("Presence lookup for user {} failed: {}", user_id, e);
                None
            }
        }
    }

    fn notify_match(&self, user_id: UserId, conn: &SharedConnection) {
        let delivered = HallResponse::match_success()
            .to_bytes()
            .and_then(|payload| conn.send(payload));

        if let Err(e) = delivered {
            warn!("Failed to notify user {} of their match: {}", user_id, e);
            self.metrics.record_notification_failure();
            if let Ok(mut stats) = self.stats.write() {
                stats.notification_failures += 1;
            }
        }
    }

    /// Put a player back in line, re-reading their score
    fn requeue(&self, tier: Tier, user_id: UserId, reason: RequeueReason) {
        self.metrics.record_requeue(tier, reason.as_str());
        if let Ok(mut stats) = self.stats.write() {
            stats.requeues += 1;
        }

        match self.add(user_id) {
            Ok(new_tier) => {
                debug!(
                    "Requeued user {} into tier {} ({})",
                    user_id,
                    new_tier,
                    reason.as_str()
                );
            }
            Err(e) => {
                warn!("Dropping user {} instead of requeueing: {}", user_id, e);
            }
        }
    }
}
