//! Hall service: glue between client connections and the hall core

use crate::directory::{RoomService, UserDirectory};
use crate::error::{HallError, Result};
use crate::matchmaker::Matchmaker;
use crate::metrics::MetricsCollector;
use crate::presence::{OnlineUserRegistry, SharedConnection};
use crate::session::{Session, SessionRegistry};
use crate::types::{Area, Expiry, HallRequest, HallResponse, OpType, SessionId, UserId};
use crate::utils::session_id_from_cookie;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Entry points called by the transport for each connection event
///
/// Refusals a client can act on (unknown session, duplicate login, no room)
/// come back as failed [`HallResponse`]s; `Err` is reserved for internal
/// failures.
#[derive(Clone)]
pub struct HallService {
    sessions: SessionRegistry,
    presence: Arc<OnlineUserRegistry>,
    matchmaker: Matchmaker,
    users: Arc<dyn UserDirectory>,
    rooms: Arc<dyn RoomService>,
    metrics: Arc<MetricsCollector>,
    session_timeout: Duration,
    cookie_name: String,
}

impl HallService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: SessionRegistry,
        presence: Arc<OnlineUserRegistry>,
        matchmaker: Matchmaker,
        users: Arc<dyn UserDirectory>,
        rooms: Arc<dyn RoomService>,
        metrics: Arc<MetricsCollector>,
        session_timeout: Duration,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            presence,
            matchmaker,
            users,
            rooms,
            metrics,
            session_timeout,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn presence(&self) -> &OnlineUserRegistry {
        &self.presence
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    /// Start a bounded session for an authenticated user
    pub fn login(&self, user_id: UserId) -> Result<Arc<Session>> {
        if self.users.find_user(user_id)?.is_none() {
            return Err(HallError::UserNotFound { user_id }.into());
        }

        let session = self.sessions.create(user_id)?;
        self.sessions
            .set_expiry(session.id(), Expiry::After(self.session_timeout))?;
        info!("User {} logged in with session {}", user_id, session.id());
        Ok(session)
    }

    /// Extend a session's lifetime by another timeout period
    pub fn refresh(&self, session_id: SessionId) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .find(session_id)?
            .ok_or(HallError::SessionNotFound { session_id })?;
        // A session attached to a live connection stays unbounded
        if session.is_bounded() {
            self.sessions
                .set_expiry(session_id, Expiry::After(self.session_timeout))?;
        }
        Ok(session)
    }

    /// Resolve the session named by a `Cookie` header
    pub fn session_from_cookie(&self, header: &str) -> Result<Option<Arc<Session>>> {
        match session_id_from_cookie(header, &self.cookie_name) {
            Some(session_id) => self.sessions.find(session_id),
            None => Ok(None),
        }
    }

    /// A client opened its hall connection
    pub fn open_hall(&self, session_id: SessionId, conn: SharedConnection) -> Result<HallResponse> {
        let session = match self.sessions.find(session_id)? {
            Some(session) => session,
            None => return Ok(HallResponse::fail(OpType::HallReady, "session not found")),
        };
        let user_id = session.user_id();

        if self.presence.is_online(user_id)? {
            warn!("User {} is already online; refusing hall connection", user_id);
            self.metrics.record_duplicate_login();
            return Ok(HallResponse::fail(OpType::HallReady, "duplicate login"));
        }

        // The session may have expired since it was looked up
        if !self.sessions.set_expiry(session_id, Expiry::Forever)? {
            return Ok(HallResponse::fail(OpType::HallReady, "session not found"));
        }
        self.presence.enter(Area::Hall, user_id, conn)?;
        self.update_presence_metrics(Area::Hall);

        info!("User {} entered the hall", user_id);
        Ok(HallResponse::ok(OpType::HallReady))
    }

    /// A client opened its room connection
    pub fn open_room(&self, session_id: SessionId, conn: SharedConnection) -> Result<HallResponse> {
        let session = match self.sessions.find(session_id)? {
            Some(session) => session,
            None => return Ok(HallResponse::fail(OpType::RoomReady, "session not found")),
        };
        let user_id = session.user_id();

        if self.presence.is_online(user_id)? {
            warn!("User {} is already online; refusing room connection", user_id);
            self.metrics.record_duplicate_login();
            return Ok(HallResponse::fail(OpType::RoomReady, "duplicate login"));
        }

        let room = match self.rooms.room_of_user(user_id)? {
            Some(room) => room,
            None => {
                debug!("User {} has no room to enter", user_id);
                return Ok(HallResponse::fail(OpType::RoomReady, "no room for user"));
            }
        };

        if !self.sessions.set_expiry(session_id, Expiry::Forever)? {
            return Ok(HallResponse::fail(OpType::RoomReady, "session not found"));
        }
        self.presence.enter(Area::Room, user_id, conn)?;
        self.update_presence_metrics(Area::Room);

        info!("User {} entered room {}", user_id, room.room_id);
        Ok(HallResponse::ok(OpType::RoomReady).with_room(&room, user_id))
    }

    /// A client's hall connection closed
    pub fn close_hall(&self, session_id: SessionId) -> Result<()> {
        let session = match self.sessions.find(session_id)? {
            Some(session) => session,
            None => return Ok(()),
        };
        let user_id = session.user_id();

        self.presence.exit(Area::Hall, user_id)?;
        self.sessions
            .set_expiry(session_id, Expiry::After(self.session_timeout))?;
        self.update_presence_metrics(Area::Hall);

        info!("User {} left the hall", user_id);
        Ok(())
    }

    /// A client's room connection closed
    pub fn close_room(&self, session_id: SessionId) -> Result<()> {
        let session = match self.sessions.find(session_id)? {
            Some(session) => session,
            None => return Ok(()),
        };
        let user_id = session.user_id();

        self.presence.exit(Area::Room, user_id)?;
        self.rooms.remove_room_user(user_id)?;
        self.sessions
            .set_expiry(session_id, Expiry::After(self.session_timeout))?;
        self.update_presence_metrics(Area::Room);

        info!("User {} left their room", user_id);
        Ok(())
    }

    /// Handle a request received over a hall connection
    pub fn handle_hall_request(
        &self,
        session_id: SessionId,
        request: &HallRequest,
    ) -> Result<HallResponse> {
        let session = match self.sessions.find(session_id)? {
            Some(session) => session,
            None => return Ok(HallResponse::fail(request.optype, "session not found")),
        };
        let user_id = session.user_id();

        let response = match request.optype {
            OpType::MatchStart => match self.matchmaker.add(user_id) {
                Ok(tier) => {
                    debug!("User {} started matching in tier {}", user_id, tier);
                    HallResponse::ok(OpType::MatchStart)
                }
                Err(e) => {
                    warn!("User {} could not start matching: {}", user_id, e);
                    HallResponse::fail(OpType::MatchStart, "failed to join matchmaking")
                }
            },
            OpType::MatchStop => match self.matchmaker.cancel(user_id) {
                Ok(_) => HallResponse::ok(OpType::MatchStop),
                Err(e) => {
                    warn!("User {} could not stop matching: {}", user_id, e);
                    HallResponse::fail(OpType::MatchStop, "failed to leave matchmaking")
                }
            },
            _ => HallResponse::fail(OpType::Unknown, "unknown optype"),
        };
        Ok(response)
    }

    /// Decode a raw hall message and handle it
    pub fn handle_hall_message(&self, session_id: SessionId, payload: &[u8]) -> Result<HallResponse> {
        match serde_json::from_slice::<HallRequest>(payload) {
            Ok(request) => self.handle_hall_request(session_id, &request),
            Err(e) => {
                debug!("Malformed hall message from session {}: {}", session_id, e);
                Ok(HallResponse::fail(OpType::Unknown, "malformed request"))
            }
        }
    }

    fn update_presence_metrics(&self, area: Area) {
        if let Ok(count) = self.presence.count(area) {
            self.metrics.set_online_users(area, count);
        }
    }
}
