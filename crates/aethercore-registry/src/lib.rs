//! Connected-player tracking for Aethercore.
//!
//! This crate owns the identity half of a player session:
//!
//! 1. **Authentication** — validating who a player is ([`Authenticator`])
//! 2. **Session registry** — connection id → session mapping and the
//!    per-session identity record ([`SessionRegistry`], [`PlayerSession`])
//! 3. **Character persistence seam** — an opaque async collaborator for
//!    loading/saving character data ([`CharacterStore`])
//!
//! What is deliberately NOT here: health, position, spawn index, respawn
//! timing. That state belongs to the room actor the session is in, which
//! is its single writer. The registry only keeps pointers (`room_id`,
//! `party_id`) so the disconnect path knows which aggregates to clean up.

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;
mod store;

pub use auth::{Authenticator, InsecureAuthenticator};
pub use error::RegistryError;
pub use manager::SessionRegistry;
pub use session::{Departure, JoinInfo, PlayerSession};
pub use store::{CharacterRecord, CharacterStore, MemoryStore, StoreError};
