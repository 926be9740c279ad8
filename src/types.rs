//! Common types used throughout the game hall service

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique identifier for registered users
pub type UserId = u64;

/// Unique identifier for login sessions
pub type SessionId = u64;

/// Unique identifier for game rooms
pub type RoomId = u64;

/// Default lifetime of a login session that is not attended by a live connection
pub const SESSION_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Login state carried by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoginState {
    LoggedOut,
    LoggedIn,
}

/// Where an online user's live connection is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Area {
    Hall,
    Room,
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Area::Hall => write!(f, "hall"),
            Area::Room => write!(f, "room"),
        }
    }
}

/// Requested lifetime for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Never expires while in this state
    Forever,
    /// Removed once the duration elapses without being re-armed
    After(Duration),
}

impl From<Duration> for Expiry {
    fn from(duration: Duration) -> Self {
        Expiry::After(duration)
    }
}

/// Ladder score boundaries separating the matchmaking tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBoundaries {
    /// Lowest score that lands in the high tier
    pub high_floor: u32,
    /// Lowest score that lands in the super tier
    pub super_floor: u32,
}

impl Default for TierBoundaries {
    fn default() -> Self {
        Self {
            high_floor: 2000,
            super_floor: 3000,
        }
    }
}

/// Skill bracket used to bucket waiting players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Normal,
    High,
    Super,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Normal, Tier::High, Tier::Super];

    /// Bucket a ladder score into its tier
    pub fn from_score(score: u32, boundaries: &TierBoundaries) -> Self {
        if score < boundaries.high_floor {
            Tier::Normal
        } else if score < boundaries.super_floor {
            Tier::High
        } else {
            Tier::Super
        }
    }

    /// Position of this tier in per-tier arrays
    pub fn index(self) -> usize {
        match self {
            Tier::Normal => 0,
            Tier::High => 1,
            Tier::Super => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Normal => "normal",
            Tier::High => "high",
            Tier::Super => "super",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored profile of a registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub score: u32,
    pub total_count: u32,
    pub win_count: u32,
}

impl UserRecord {
    /// A freshly registered user starts at 1000 points
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            score: 1000,
            total_count: 0,
            win_count: 0,
        }
    }

    pub fn with_score(mut self, score: u32) -> Self {
        self.score = score;
        self
    }
}

/// Handle to a room created for a matched pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomHandle {
    pub room_id: RoomId,
    pub white_id: UserId,
    pub black_id: UserId,
}

impl RoomHandle {
    pub fn contains(&self, user_id: UserId) -> bool {
        self.white_id == user_id || self.black_id == user_id
    }
}

/// Operation tags exchanged with hall and room clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    HallReady,
    RoomReady,
    MatchStart,
    MatchStop,
    MatchSuccess,
    #[serde(other)]
    Unknown,
}

/// Request sent by a client over its hall connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HallRequest {
    pub optype: OpType,
}

/// Response pushed to a client connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallResponse {
    pub optype: OpType,
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_id: Option<UserId>,
}

impl HallResponse {
    pub fn ok(optype: OpType) -> Self {
        Self {
            optype,
            result: true,
            reason: None,
            room_id: None,
            uid: None,
            white_id: None,
            black_id: None,
        }
    }

    pub fn fail(optype: OpType, reason: impl Into<String>) -> Self {
        Self {
            result: false,
            reason: Some(reason.into()),
            ..Self::ok(optype)
        }
    }

    /// Notification delivered to both players when a pair is formed
    pub fn match_success() -> Self {
        Self::ok(OpType::MatchSuccess)
    }

    /// Attach the room layout for a `room_ready` reply
    pub fn with_room(mut self, room: &RoomHandle, uid: UserId) -> Self {
        self.room_id = Some(room.room_id);
        self.uid = Some(uid);
        self.white_id = Some(room.white_id);
        self.black_id = Some(room.black_id);
        self
    }

    /// Serialize to the opaque payload handed to a connection
    pub fn to_bytes(&self) -> crate::error::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            crate::error::HallError::InternalError {
                message: format!("Failed to serialize response: {}", e),
            }
            .into()
        })
    }
}
