//! Core protocol types: identifiers, shared game data, and the
//! server-side broadcast [`Scope`].

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a connected player session.
///
/// Newtype over `u64` so a session id can't be confused with any other
/// counter. `#[serde(transparent)]` keeps the wire shape a plain number:
/// `SessionId(42)` serializes as `42`, not `{"0":42}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A unique identifier for a party (an ad-hoc player group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub u64);

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// A room identifier.
///
/// Room ids are client-chosen names: joining an unknown id creates the
/// room. The one reserved id is the world room (see [`RoomId::world`]),
/// which exists for the lifetime of the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

/// The reserved id of the always-on world room.
const WORLD_ROOM_ID: &str = "aether-world";

impl RoomId {
    /// Creates a room id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved world-room id.
    pub fn world() -> Self {
        Self(WORLD_ROOM_ID.to_string())
    }

    /// Returns `true` if this is the world room.
    pub fn is_world(&self) -> bool {
        self.0 == WORLD_ROOM_ID
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Shared game data
// ---------------------------------------------------------------------------

/// A position, rotation, or velocity in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A character's seven base attributes.
///
/// Advisory data carried for party/roster display; the server never
/// derives combat math from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    pub strength: u32,
    pub perception: u32,
    pub endurance: u32,
    pub wisdom: u32,
    pub intelligence: u32,
    pub agility: u32,
    pub luck: u32,
}

impl Default for StatBlock {
    fn default() -> Self {
        Self {
            strength: 5,
            perception: 5,
            endurance: 5,
            wisdom: 5,
            intelligence: 5,
            agility: 5,
            luck: 5,
        }
    }
}

/// The playable character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Mage,
    Warrior,
    Archer,
    Rogue,
    Paladin,
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mage => "Mage",
            Self::Warrior => "Warrior",
            Self::Archer => "Archer",
            Self::Rogue => "Rogue",
            Self::Paladin => "Paladin",
        };
        write!(f, "{name}")
    }
}

/// Which audience a chat message addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatChannel {
    /// Everyone in the sender's room.
    All,
    /// The sender's party.
    Party,
}

/// One player's entry in a room roster snapshot.
///
/// Sent inside `RoomPlayers` and `GameStart` so a joining client can
/// spawn every existing player at the right place in the right state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub session_id: SessionId,
    pub username: String,
    pub class: CharacterClass,
    pub level: u32,
    /// Unique within the room; lowest free index, assigned at join.
    pub spawn_index: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub animation: String,
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
    pub stats: StatBlock,
}

// ---------------------------------------------------------------------------
// Scope — who should receive a broadcast?
// ---------------------------------------------------------------------------

/// Specifies the audience of a server event.
///
/// Components hand `(Scope, ServerEvent)` pairs to the broadcast router,
/// which resolves the scope to live connections at dispatch time.
/// Sessions that vanished between enqueue and dispatch are skipped
/// silently — disconnects race with broadcasts by design.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    /// Every member of a room.
    Room(RoomId),

    /// Every member of a party.
    Party(PartyId),

    /// A base scope minus specific sessions. Used for relays where the
    /// originator already knows what it did.
    AllExcept {
        base: Box<Scope>,
        except: Vec<SessionId>,
    },

    /// One specific session.
    Direct(SessionId),
}

impl Scope {
    /// A room scope minus a single sender — the common relay audience.
    pub fn room_except(room_id: RoomId, sender: SessionId) -> Self {
        Self::AllExcept {
            base: Box::new(Self::Room(room_id)),
            except: vec![sender],
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire shapes here are load-bearing: a mismatch means the
    //! client can't parse our messages. These tests pin the serde
    //! attributes down.

    use super::*;

    #[test]
    fn test_session_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&SessionId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId(7).to_string(), "S-7");
    }

    #[test]
    fn test_party_id_display() {
        assert_eq!(PartyId(3).to_string(), "G-3");
    }

    #[test]
    fn test_room_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomId::new("dungeon-1")).unwrap();
        assert_eq!(json, "\"dungeon-1\"");
    }

    #[test]
    fn test_room_id_world_is_reserved() {
        assert!(RoomId::world().is_world());
        assert!(!RoomId::new("dungeon-1").is_world());
    }

    #[test]
    fn test_stat_block_defaults_to_all_fives() {
        let stats = StatBlock::default();
        assert_eq!(stats.strength, 5);
        assert_eq!(stats.luck, 5);
    }

    #[test]
    fn test_chat_channel_serializes_as_snake_case() {
        let json = serde_json::to_string(&ChatChannel::Party).unwrap();
        assert_eq!(json, "\"party\"");
    }

    #[test]
    fn test_character_class_round_trip() {
        let class = CharacterClass::Paladin;
        let bytes = serde_json::to_vec(&class).unwrap();
        let decoded: CharacterClass = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(class, decoded);
    }

    #[test]
    fn test_scope_room_except_wraps_room_scope() {
        let scope = Scope::room_except(RoomId::world(), SessionId(4));
        match scope {
            Scope::AllExcept { base, except } => {
                assert_eq!(*base, Scope::Room(RoomId::world()));
                assert_eq!(except, vec![SessionId(4)]);
            }
            other => panic!("expected AllExcept, got {other:?}"),
        }
    }
}
