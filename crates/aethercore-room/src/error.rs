//! Error types for the room layer.

use aethercore_protocol::{RoomId, SessionId};

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room is full.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The session is already in a room.
    #[error("session {0} already in room {1}")]
    AlreadyInRoom(SessionId, RoomId),

    /// The session is not in any room.
    #[error("session {0} is not in a room")]
    NotInRoom(SessionId),

    /// The room's command channel is closed or rejected the command.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
