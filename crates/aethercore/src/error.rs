//! Unified error type for the Aethercore server.

use aethercore_party::PartyError;
use aethercore_protocol::ProtocolError;
use aethercore_registry::RegistryError;
use aethercore_room::RoomError;
use aethercore_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `aethercore` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum AethercoreError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry-level error (auth, unknown session).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A room-level error (full, not found, invalid state).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A party-level error (bad invite, already partied).
    #[error(transparent)]
    Party(#[from] PartyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use aethercore_protocol::{PartyId, RoomId};

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let top: AethercoreError = err.into();
        assert!(matches!(top, AethercoreError::Transport(_)));
        assert!(top.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let top: AethercoreError = err.into();
        assert!(matches!(top, AethercoreError::Protocol(_)));
    }

    #[test]
    fn test_from_registry_error() {
        let err = RegistryError::AuthFailed("nope".into());
        let top: AethercoreError = err.into();
        assert!(matches!(top, AethercoreError::Registry(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::NotFound(RoomId::new("arena"));
        let top: AethercoreError = err.into();
        assert!(matches!(top, AethercoreError::Room(_)));
    }

    #[test]
    fn test_from_party_error() {
        let err = PartyError::InviteNotFound(PartyId(3));
        let top: AethercoreError = err.into();
        assert!(matches!(top, AethercoreError::Party(_)));
    }
}
