//! Wire protocol for Aethercore.
//!
//! This crate defines the language that clients and the server speak:
//!
//! - **Types** ([`SessionId`], [`RoomId`], [`RosterEntry`], etc.) — the
//!   structures that travel on the wire, plus [`Scope`], the server-side
//!   addressing type used by the broadcast router.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]) — the closed, tagged
//!   taxonomies for each direction.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how events are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while doing so.
//!
//! The protocol layer sits between transport (raw bytes) and the game
//! components (registry, rooms, combat, parties). It doesn't know about
//! connections or rooms — it only knows message shapes.

mod codec;
mod error;
mod event;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{ClientEvent, ServerEvent};
pub use types::{
    CharacterClass, ChatChannel, PartyId, RoomId, RosterEntry, Scope,
    SessionId, StatBlock, Vec3,
};

/// Protocol version checked during the handshake. Bump on any breaking
/// change to the event taxonomy.
pub const PROTOCOL_VERSION: u32 = 1;
