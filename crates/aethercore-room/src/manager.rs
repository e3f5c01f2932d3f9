//! Room manager: creates, tracks, and routes sessions to rooms.
//!
//! Seeds the world room at construction and destroys ephemeral rooms
//! when their last member leaves. Enforces the one-room-per-session
//! invariant through the session → room index.

use std::collections::HashMap;

use aethercore_protocol::{RoomId, SessionId};
use aethercore_router::Router;

use crate::room::{JoinSnapshot, MemberProfile, RoomEvent, RoomHandle, RoomInfo, spawn_room};
use crate::{RoomConfig, RoomError};

/// Command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Manages all active rooms and tracks which session is in which room.
pub struct RoomManager {
    rooms: HashMap<RoomId, RoomHandle>,
    /// A session is in at most one room at a time (key invariant).
    session_rooms: HashMap<SessionId, RoomId>,
    config: RoomConfig,
    router: Router,
}

impl RoomManager {
    /// Creates the manager and seeds the always-on world room.
    pub fn new(config: RoomConfig, router: Router) -> Self {
        let config = config.validated();
        let mut rooms = HashMap::new();
        let world_id = RoomId::world();
        rooms.insert(
            world_id.clone(),
            spawn_room(
                world_id,
                true,
                config.clone(),
                router.clone(),
                DEFAULT_CHANNEL_SIZE,
            ),
        );
        Self {
            rooms,
            session_rooms: HashMap::new(),
            config,
            router,
        }
    }

    /// Adds a session to a room, creating the room on first reference.
    pub async fn join_room(
        &mut self,
        session_id: SessionId,
        room_id: RoomId,
        profile: MemberProfile,
    ) -> Result<JoinSnapshot, RoomError> {
        if let Some(current) = self.session_rooms.get(&session_id) {
            return Err(RoomError::AlreadyInRoom(session_id, current.clone()));
        }

        let handle = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            tracing::info!(%room_id, "room created");
            spawn_room(
                room_id.clone(),
                false,
                self.config.clone(),
                self.router.clone(),
                DEFAULT_CHANNEL_SIZE,
            )
        });

        let snapshot = handle.join(session_id, profile).await?;
        self.session_rooms.insert(session_id, room_id);
        Ok(snapshot)
    }

    /// Removes a session from its current room. Empty ephemeral rooms
    /// are destroyed on the way out.
    pub async fn leave_room(&mut self, session_id: SessionId) -> Result<RoomId, RoomError> {
        let room_id = self
            .session_rooms
            .remove(&session_id)
            .ok_or(RoomError::NotInRoom(session_id))?;

        let Some(handle) = self.rooms.get(&room_id) else {
            return Ok(room_id);
        };
        let outcome = handle.leave(session_id).await?;

        if outcome.now_empty && !room_id.is_world() {
            if let Some(handle) = self.rooms.remove(&room_id) {
                let _ = handle.shutdown().await;
            }
            tracing::info!(%room_id, "room destroyed");
        }
        Ok(room_id)
    }

    /// Disconnect path: like [`leave_room`](Self::leave_room) but
    /// sessions without a room are a quiet no-op.
    pub async fn disconnect(&mut self, session_id: SessionId) -> Option<RoomId> {
        self.leave_room(session_id).await.ok()
    }

    /// Routes an in-room action from a session to its current room.
    pub async fn send_event(
        &self,
        session_id: SessionId,
        event: RoomEvent,
    ) -> Result<(), RoomError> {
        let room_id = self
            .session_rooms
            .get(&session_id)
            .ok_or(RoomError::NotInRoom(session_id))?;
        let handle = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        handle.send_event(session_id, event).await
    }

    /// The room a session is currently in, if any.
    pub fn session_room(&self, session_id: SessionId) -> Option<&RoomId> {
        self.session_rooms.get(&session_id)
    }

    /// Returns info about a specific room.
    pub async fn room_info(&self, room_id: &RoomId) -> Result<RoomInfo, RoomError> {
        let handle = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        handle.info().await
    }

    /// Number of live rooms, the world room included.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
