//! # Aethercore
//!
//! Authoritative backend core for real-time multiplayer action games.
//!
//! Aethercore owns the server side of a small action RPG: WebSocket
//! connections, a session registry, room lifecycle with a lobby
//! countdown, server-authoritative combat (damage, death, respawn),
//! cross-room parties, and scope-addressed broadcast fan-out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aethercore::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AethercoreError> {
//!     let server = AethercoreServerBuilder::new()
//!         .bind("0.0.0.0:8080")
//!         .build(InsecureAuthenticator, MemoryStore::new())
//!         .await?;
//!     server.run().await
//! }
//! ```

mod error;
mod handler;
mod server;

pub use error::AethercoreError;
pub use server::{AethercoreServer, AethercoreServerBuilder};

pub mod prelude {
    pub use aethercore_party::PartyConfig;
    pub use aethercore_protocol::{
        CharacterClass, ChatChannel, ClientEvent, PROTOCOL_VERSION, PartyId,
        RoomId, ServerEvent, SessionId, StatBlock, Vec3,
    };
    pub use aethercore_registry::{
        Authenticator, CharacterStore, InsecureAuthenticator, MemoryStore,
        RegistryError,
    };
    pub use aethercore_room::RoomConfig;

    pub use crate::{AethercoreError, AethercoreServer, AethercoreServerBuilder};
}
