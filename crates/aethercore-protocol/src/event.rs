//! The client/server event taxonomies.
//!
//! Both enums are internally tagged (`#[serde(tag = "type")]`), so a
//! message on the wire looks like:
//!
//! ```json
//! { "type": "JoinRoom", "room_id": "aether-world", "class": "Mage", "username": "ada" }
//! ```
//!
//! The taxonomies are closed: an unknown `type` tag fails to decode and
//! the handler drops the message with a debug log.

use serde::{Deserialize, Serialize};

use crate::types::{
    CharacterClass, ChatChannel, PartyId, RoomId, RosterEntry, SessionId,
    StatBlock, Vec3,
};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Everything a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// First message on every connection. The server verifies the
    /// protocol version and the auth token before anything else.
    Hello { version: u32, token: String },

    /// Join a room by name, creating it if it doesn't exist.
    JoinRoom {
        room_id: RoomId,
        username: String,
        class: CharacterClass,
    },

    /// Leave the current room.
    LeaveRoom,

    // -- Movement & presentation relays --
    /// Advisory position update, relayed to the rest of the room.
    Move {
        position: Vec3,
        rotation: Vec3,
        velocity: Vec3,
        moving: bool,
    },

    /// Advisory animation state ("idle", "run", "cast", ...).
    Animate { state: String },

    /// Cosmetic skill cast, relayed verbatim.
    UseSkill {
        skill_id: String,
        target_id: Option<SessionId>,
        position: Vec3,
        direction: Vec3,
    },

    /// Cosmetic effect spawn, relayed verbatim.
    VisualEffect {
        effect: String,
        position: Vec3,
        rotation: Vec3,
        target_id: Option<SessionId>,
        duration: f32,
    },

    // -- Combat --
    /// An attack. Without a target it is a pure swing relay; with one,
    /// the server applies the damage authoritatively.
    Attack {
        target_id: Option<SessionId>,
        damage: f32,
    },

    /// Heal another player (or self). Server-capped at max health.
    Heal { target_id: SessionId, amount: f32 },

    /// Self report of max health (and optionally current health and
    /// stats). Each session is the sole authority over its own maximum.
    ReportStats {
        max_health: f32,
        health: Option<f32>,
        stats: Option<StatBlock>,
    },

    /// Client-observed own death. Idempotent on the server side.
    Died,

    /// Ask to respawn. Ignored until the respawn window has elapsed.
    RequestRespawn,

    // -- Parties --
    /// Invite another session into the sender's party (creating one if
    /// the sender has none).
    PartyInvite { target_id: SessionId },

    /// Accept a pending invite to the given party.
    PartyAccept { party_id: PartyId },

    /// Decline a pending invite to the given party.
    PartyDecline { party_id: PartyId },

    /// Leave the current party.
    PartyLeave,

    // -- Misc --
    /// Chat to the room or the party.
    Chat { channel: ChatChannel, message: String },

    /// Keep-alive; echoed back as `Pong` with the server clock.
    Ping { client_time: u64 },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Everything the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Handshake acknowledgement carrying the assigned session id.
    Welcome { session_id: SessionId },

    /// A request failed. `code` follows HTTP conventions (400 bad
    /// request, 404 not found, 409 conflict, ...). Sent only to the
    /// offending client.
    Error { code: u16, message: String },

    /// Keep-alive echo for RTT calculation.
    Pong { client_time: u64, server_time: u64 },

    // -- Room membership --
    /// Join reply: the full roster, the joiner's own spawn index, and
    /// whether the game in this room is already running.
    RoomPlayers {
        room_id: RoomId,
        players: Vec<RosterEntry>,
        your_session_id: SessionId,
        your_spawn_index: u32,
        game_started: bool,
    },

    /// A new player entered the room.
    PlayerJoined { player: RosterEntry },

    /// A player left the room (or disconnected).
    PlayerLeft {
        session_id: SessionId,
        username: String,
    },

    // -- Lobby --
    /// The lobby reached the start threshold and the wait clock is
    /// running.
    LobbyCreated {
        room_id: RoomId,
        wait_secs: u64,
        player_count: usize,
    },

    /// One tick of the pre-start countdown (3, 2, 1).
    CountdownTick { count: u8 },

    /// The game started. Sent once per start to the whole room, and
    /// directly (with `already_started: true`) to anyone joining an
    /// active room later.
    GameStart {
        room_id: RoomId,
        players: Vec<RosterEntry>,
        already_started: bool,
    },

    /// Membership dropped below the threshold before the game started;
    /// all lobby clocks were cancelled.
    LobbyCancelled { room_id: RoomId, reason: String },

    // -- Relays --
    PlayerMoved {
        session_id: SessionId,
        position: Vec3,
        rotation: Vec3,
        velocity: Vec3,
        moving: bool,
    },

    PlayerAnimated {
        session_id: SessionId,
        state: String,
    },

    /// Attack swing relay (the visual; damage arrives separately).
    PlayerAttacked {
        session_id: SessionId,
        target_id: Option<SessionId>,
    },

    SkillUsed {
        session_id: SessionId,
        skill_id: String,
        target_id: Option<SessionId>,
        position: Vec3,
        direction: Vec3,
    },

    VisualEffectSpawned {
        session_id: SessionId,
        effect: String,
        position: Vec3,
        rotation: Vec3,
        target_id: Option<SessionId>,
        duration: f32,
    },

    // -- Combat --
    PlayerDamaged {
        target_id: SessionId,
        attacker_id: SessionId,
        damage: f32,
        health: f32,
        max_health: f32,
    },

    PlayerHealed {
        target_id: SessionId,
        healer_id: SessionId,
        amount: f32,
        health: f32,
        max_health: f32,
    },

    /// Exactly one per death. `respawn_ms` is the window the client
    /// must wait before `RequestRespawn` succeeds.
    PlayerDied {
        session_id: SessionId,
        killer_id: Option<SessionId>,
        respawn_ms: u64,
    },

    PlayerRespawned {
        session_id: SessionId,
        spawn_point: u32,
        health: f32,
        max_health: f32,
    },

    // -- Parties --
    PartyInviteReceived {
        party_id: PartyId,
        inviter_id: SessionId,
        inviter_name: String,
        inviter_class: CharacterClass,
        inviter_level: u32,
    },

    /// The target declined (or the invite expired); sent to the inviter.
    PartyInviteDeclined {
        party_id: PartyId,
        target_name: String,
    },

    PartyMemberJoined {
        party_id: PartyId,
        member_id: SessionId,
        member_name: String,
        member_class: CharacterClass,
        member_level: u32,
    },

    PartyMemberLeft {
        party_id: PartyId,
        member_id: SessionId,
        member_name: String,
        /// Set when leadership moved because the leader left.
        new_leader: Option<SessionId>,
    },

    /// Party-scoped mirror of a member's self-reported health.
    PartyMemberStats {
        party_id: PartyId,
        member_id: SessionId,
        health: f32,
        max_health: f32,
    },

    // -- Misc --
    ChatMessage {
        session_id: SessionId,
        username: String,
        channel: ChatChannel,
        message: String,
    },
}

// =========================================================================
// Tests
// =========================================================================
