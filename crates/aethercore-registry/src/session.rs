//! Session types: the registry's record of a connected player.

use aethercore_protocol::{CharacterClass, PartyId, RoomId, SessionId, StatBlock};
use aethercore_transport::ConnectionId;

/// Identity supplied when a session first joins a room.
///
/// Until then the session is a bare connection with a session id and
/// nothing else — the original client picks a class and name on the
/// character screen, after the socket is already open.
#[derive(Debug, Clone)]
pub struct JoinInfo {
    pub username: String,
    pub class: CharacterClass,
    pub level: u32,
    pub stats: StatBlock,
}

/// One connected player, as the registry sees them.
///
/// `room_id` and `party_id` are pointers, not authority: the room actor
/// and the party manager own those aggregates. The pointers exist so
/// that `forget` can tell the caller which aggregates still reference
/// the departing session.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub session_id: SessionId,
    pub conn_id: ConnectionId,
    /// Verified account identity from the [`Authenticator`](crate::Authenticator).
    pub account_id: String,
    /// `None` until the first `JoinRoom` attaches an identity.
    pub identity: Option<JoinInfo>,
    pub room_id: Option<RoomId>,
    pub party_id: Option<PartyId>,
}

impl PlayerSession {
    /// The display name, or a placeholder for sessions that never
    /// attached an identity.
    pub fn username(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.username.as_str())
            .unwrap_or("<unattached>")
    }
}

/// What a forgotten session was still part of.
///
/// Returned by [`SessionRegistry::forget`](crate::SessionRegistry::forget)
/// so the disconnect path can notify the room and party subsystems.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub session_id: SessionId,
    pub username: String,
    pub room_id: Option<RoomId>,
    pub party_id: Option<PartyId>,
}
