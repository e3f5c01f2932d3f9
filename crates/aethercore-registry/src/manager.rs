//! The session registry: connection → session bookkeeping.
//!
//! One instance lives in the server state behind a `tokio::sync::Mutex`;
//! every method is synchronous and returns before any I/O happens, so
//! the lock is never held across an await point.

use std::collections::HashMap;

use aethercore_protocol::{PartyId, RoomId, SessionId};
use aethercore_transport::ConnectionId;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::session::{Departure, JoinInfo, PlayerSession};

/// Tracks every connected session and the connection it arrived on.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, PlayerSession>,
    /// Connection → session, for idempotent registration and for
    /// routing a transport-level disconnect back to its session.
    by_conn: HashMap<ConnectionId, SessionId>,
    next_session_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, creating a session for it.
    ///
    /// Idempotent per connection: registering the same connection twice
    /// returns the existing session id instead of minting a duplicate.
    pub fn register(&mut self, conn_id: ConnectionId, account_id: String) -> SessionId {
        if let Some(&existing) = self.by_conn.get(&conn_id) {
            debug!(%conn_id, session_id = %existing, "connection already registered");
            return existing;
        }

        self.next_session_id += 1;
        let session_id = SessionId(self.next_session_id);
        self.sessions.insert(
            session_id,
            PlayerSession {
                session_id,
                conn_id,
                account_id,
                identity: None,
                room_id: None,
                party_id: None,
            },
        );
        self.by_conn.insert(conn_id, session_id);
        info!(%session_id, %conn_id, "session registered");
        session_id
    }

    /// Attaches a game identity (username, class, level, stats) to a
    /// registered session. Called on the first successful room join.
    pub fn attach(
        &mut self,
        session_id: SessionId,
        info: JoinInfo,
    ) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(RegistryError::NotFound(session_id))?;
        debug!(%session_id, username = %info.username, class = %info.class, "identity attached");
        session.identity = Some(info);
        Ok(())
    }

    /// Looks up a session. Absence is a normal outcome: messages from a
    /// connection that just disconnected race with cleanup.
    pub fn lookup(&self, session_id: SessionId) -> Option<&PlayerSession> {
        self.sessions.get(&session_id)
    }

    pub fn lookup_mut(&mut self, session_id: SessionId) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&session_id)
    }

    /// Resolves the session for a transport connection, if any.
    pub fn session_for_conn(&self, conn_id: ConnectionId) -> Option<SessionId> {
        self.by_conn.get(&conn_id).copied()
    }

    /// Updates the room pointer. The room subsystem calls this after a
    /// join or leave actually happened.
    pub fn set_room(&mut self, session_id: SessionId, room_id: Option<RoomId>) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.room_id = room_id;
        }
    }

    /// Updates the party pointer.
    pub fn set_party(&mut self, session_id: SessionId, party_id: Option<PartyId>) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.party_id = party_id;
        }
    }

    /// Removes a session and reports what it was still part of.
    ///
    /// Idempotent: forgetting an unknown session returns `None` and
    /// changes nothing, so racing disconnect paths are harmless.
    pub fn forget(&mut self, session_id: SessionId) -> Option<Departure> {
        let session = self.sessions.remove(&session_id)?;
        self.by_conn.remove(&session.conn_id);
        info!(%session_id, username = %session.username(), "session forgotten");
        Some(Departure {
            session_id,
            username: session.username().to_string(),
            room_id: session.room_id,
            party_id: session.party_id,
        })
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
