//! Error types for the registry layer.

/// Errors that can occur during session registration and lookup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Authentication failed — the token was invalid, expired, or
    /// rejected by the [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists with the given id. Stale messages from a
    /// connection that already disconnected land here.
    #[error("session {0} not found")]
    NotFound(aethercore_protocol::SessionId),
}
