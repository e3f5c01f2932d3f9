//! Room lifecycle for Aethercore.
//!
//! Each room runs as an isolated Tokio task (the actor model): one
//! owner for the room's roster, spawn indices, lobby clocks, and combat
//! records, fed through an mpsc command channel. The [`RoomManager`]
//! tracks live rooms, enforces the one-room-per-session invariant, and
//! destroys ephemeral rooms when they empty.
//!
//! Rooms come in two kinds:
//! - **Ephemeral** rooms are created on first join, capped at
//!   `capacity`, run the lobby state machine
//!   (`Forming → CountingDown → Active`), and are destroyed when the
//!   last member leaves.
//! - The **world** room is seeded `Active` at startup, is unbounded,
//!   never runs lobby clocks, and is never destroyed.

mod config;
mod error;
mod manager;
mod room;

pub use config::{RoomConfig, RoomPhase};
pub use error::RoomError;
pub use manager::RoomManager;
pub use room::{JoinSnapshot, MemberProfile, RoomEvent, RoomHandle, RoomInfo};
