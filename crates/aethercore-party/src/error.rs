//! Error types for the party layer.

/// Errors that can occur in party operations.
///
/// All of these answer only the offending client; party state is left
/// untouched by a failed operation.
#[derive(Debug, thiserror::Error)]
pub enum PartyError {
    /// The target (or the accepting session) already belongs to a party.
    #[error("session {0} is already in a party")]
    AlreadyInParty(aethercore_protocol::SessionId),

    /// No matching pending invite: wrong party id, expired, superseded,
    /// or the inviter disconnected in the meantime.
    #[error("no pending invite for party {0}")]
    InviteNotFound(aethercore_protocol::PartyId),

    /// A session tried to invite itself.
    #[error("session {0} cannot invite itself")]
    SelfInvite(aethercore_protocol::SessionId),
}
