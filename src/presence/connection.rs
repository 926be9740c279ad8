//! Live connection handles
//!
//! The transport that owns the actual socket is external. The core only
//! needs something it can push opaque payloads into from any thread.

use crate::error::{HallError, Result};
use crate::types::UserId;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A client connection that accepts outbound payloads
///
/// Implementations must be callable from matchmaking worker threads, either
/// because the transport's send side is thread-safe or because they hand the
/// payload back to the event loop that owns the socket.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionHandle: Send + Sync {
    /// Queue a payload for delivery to the client
    fn send(&self, payload: Vec<u8>) -> Result<()>;

    /// Whether the underlying connection is still accepting payloads
    fn is_open(&self) -> bool;
}

/// Shared handle stored in the presence maps
pub type SharedConnection = Arc<dyn ConnectionHandle>;

/// Connection handle that marshals payloads onto the owning event loop
///
/// The transport task holds the receiving half and writes each payload to
/// the socket; dropping the receiver closes the handle.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    user_id: UserId,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelConnection {
    pub fn new(user_id: UserId, outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { user_id, outbound }
    }

    /// Create a handle together with the receiver the transport drains
    pub fn pair(user_id: UserId) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(user_id, tx)), rx)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl ConnectionHandle for ChannelConnection {
    fn send(&self, payload: Vec<u8>) -> Result<()> {
        self.outbound.send(payload).map_err(|_| {
            HallError::ConnectionClosed {
                user_id: self.user_id,
            }
            .into()
        })
    }

    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_connection_delivers_payloads() {
        let (conn, mut rx) = ChannelConnection::pair(42);
        assert_eq!(conn.user_id(), 42);
        assert!(conn.is_open());

        conn.send(b"hello".to_vec()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_channel_connection_closed_when_receiver_dropped() {
        let (conn, rx) = ChannelConnection::pair(7);
        drop(rx);

        assert!(!conn.is_open());
        let err = conn.send(b"late".to_vec()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HallError>(),
            Some(HallError::ConnectionClosed { user_id: 7 })
        ));
    }
}
