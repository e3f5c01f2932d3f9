//! Scope-addressed broadcast fan-out.
//!
//! Every connected session gets one unbounded channel; the connection's
//! writer task drains it onto the socket, which gives per-recipient FIFO
//! ordering. Components push membership changes (`join_room`,
//! `join_party`, ...) and hand `(Scope, ServerEvent)` pairs to
//! [`Router::broadcast`]; the scope is resolved to live senders at
//! dispatch time.
//!
//! Resolution is deliberately forgiving: a session that disconnected
//! between enqueue and dispatch is skipped without error. Broadcasts
//! race with disconnects constantly and nothing upstream wants to hear
//! about it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use aethercore_protocol::{PartyId, RoomId, Scope, ServerEvent, SessionId};
use tokio::sync::mpsc;
use tracing::trace;

/// Receiving half handed to the connection's writer task.
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Cheap-to-clone handle to the shared fan-out state.
///
/// The interior mutex is a `std::sync::Mutex`: every critical section is
/// a few map operations and the lock is never held across an await.
#[derive(Clone, Default)]
pub struct Router {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    senders: HashMap<SessionId, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<RoomId, HashSet<SessionId>>,
    parties: HashMap<PartyId, HashSet<SessionId>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session's outbound channel and returns the receiving
    /// half for the writer task.
    pub fn connect(&self, session_id: SessionId) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.senders.insert(session_id, tx);
        rx
    }

    /// Drops the session's sender and any membership still recorded.
    ///
    /// Membership removal here is a backstop; the owning components
    /// normally call `leave_room`/`leave_party` first.
    pub fn disconnect(&self, session_id: SessionId) {
        let mut inner = self.lock();
        inner.senders.remove(&session_id);
        for members in inner.rooms.values_mut() {
            members.remove(&session_id);
        }
        for members in inner.parties.values_mut() {
            members.remove(&session_id);
        }
    }

    pub fn join_room(&self, room_id: RoomId, session_id: SessionId) {
        let mut inner = self.lock();
        inner.rooms.entry(room_id).or_default().insert(session_id);
    }

    pub fn leave_room(&self, room_id: &RoomId, session_id: SessionId) {
        let mut inner = self.lock();
        if let Some(members) = inner.rooms.get_mut(room_id) {
            members.remove(&session_id);
            if members.is_empty() {
                inner.rooms.remove(room_id);
            }
        }
    }

    pub fn join_party(&self, party_id: PartyId, session_id: SessionId) {
        let mut inner = self.lock();
        inner.parties.entry(party_id).or_default().insert(session_id);
    }

    pub fn leave_party(&self, party_id: PartyId, session_id: SessionId) {
        let mut inner = self.lock();
        if let Some(members) = inner.parties.get_mut(&party_id) {
            members.remove(&session_id);
            if members.is_empty() {
                inner.parties.remove(&party_id);
            }
        }
    }

    /// Delivers an event to every live session the scope resolves to.
    ///
    /// Send failures (receiver dropped mid-flight) are ignored, the
    /// same way a room drops messages for players who just left.
    pub fn broadcast(&self, scope: &Scope, event: &ServerEvent) {
        let inner = self.lock();
        let recipients = inner.resolve(scope);
        trace!(?scope, recipients = recipients.len(), "broadcast");
        for session_id in recipients {
            if let Some(sender) = inner.senders.get(&session_id) {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Convenience for one-recipient sends.
    pub fn send(&self, session_id: SessionId, event: ServerEvent) {
        let inner = self.lock();
        if let Some(sender) = inner.senders.get(&session_id) {
            let _ = sender.send(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("router mutex poisoned")
    }
}

impl Inner {
    fn resolve(&self, scope: &Scope) -> Vec<SessionId> {
        match scope {
            Scope::Room(room_id) => self
                .rooms
                .get(room_id)
                .map(|m| m.iter().copied().collect())
                .unwrap_or_default(),
            Scope::Party(party_id) => self
                .parties
                .get(party_id)
                .map(|m| m.iter().copied().collect())
                .unwrap_or_default(),
            Scope::AllExcept { base, except } => {
                let mut recipients = self.resolve(base);
                recipients.retain(|s| !except.contains(s));
                recipients
            }
            Scope::Direct(session_id) => vec![*session_id],
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
