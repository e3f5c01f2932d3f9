//! Room configuration and the lobby phase machine.

use std::time::Duration;

use aethercore_combat::CombatConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for ephemeral rooms. The world room ignores
/// `capacity` and the lobby fields.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum players in an ephemeral room.
    pub capacity: usize,

    /// Members required before the lobby wait clock starts.
    pub min_to_start: usize,

    /// How long the lobby waits for more players once the threshold is
    /// reached.
    pub lobby_wait: Duration,

    /// Countdown length in ticks (one per second: 3, 2, 1).
    pub countdown_ticks: u8,

    /// Combat tunables, owned per room.
    pub combat: CombatConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            min_to_start: 2,
            lobby_wait: Duration::from_secs(14),
            countdown_ticks: 3,
            combat: CombatConfig::default(),
        }
    }
}

impl RoomConfig {
    /// Returns a copy with out-of-range values clamped to workable
    /// minimums. A room with capacity 0 or a zero-tick countdown can't
    /// run its own state machine.
    pub fn validated(mut self) -> Self {
        self.capacity = self.capacity.max(1);
        self.min_to_start = self.min_to_start.clamp(2, self.capacity.max(2));
        self.countdown_ticks = self.countdown_ticks.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// RoomPhase
// ---------------------------------------------------------------------------

/// The lobby phase of a room.
///
/// ```text
/// Forming ──(threshold held for lobby_wait)──→ CountingDown ──(ticks)──→ Active
///    ↑                                              │
///    └────────(membership drops below min)──────────┘
/// ```
///
/// `Active` is terminal: once the game started, members leaving doesn't
/// un-start it. The world room is born `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomPhase {
    /// Accepting players, start threshold not held yet.
    Forming,
    /// Threshold held through the wait; counting 3, 2, 1.
    CountingDown,
    /// The game is running.
    Active,
}

impl RoomPhase {
    /// Returns `true` once the game has started.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if lobby clocks may run in this phase.
    pub fn in_lobby(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forming => write!(f, "Forming"),
            Self::CountingDown => write!(f, "CountingDown"),
            Self::Active => write!(f, "Active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.capacity, 20);
        assert_eq!(config.min_to_start, 2);
        assert_eq!(config.lobby_wait, Duration::from_secs(14));
        assert_eq!(config.countdown_ticks, 3);
    }

    #[test]
    fn test_room_config_validated_clamps_degenerate_values() {
        let config = RoomConfig {
            capacity: 0,
            min_to_start: 0,
            countdown_ticks: 0,
            ..RoomConfig::default()
        }
        .validated();
        assert_eq!(config.capacity, 1);
        assert_eq!(config.min_to_start, 2);
        assert_eq!(config.countdown_ticks, 1);
    }

    #[test]
    fn test_room_config_validated_caps_min_to_start_at_capacity() {
        let config = RoomConfig {
            capacity: 4,
            min_to_start: 10,
            ..RoomConfig::default()
        }
        .validated();
        assert_eq!(config.min_to_start, 4);
    }

    #[test]
    fn test_room_phase_is_active() {
        assert!(!RoomPhase::Forming.is_active());
        assert!(!RoomPhase::CountingDown.is_active());
        assert!(RoomPhase::Active.is_active());
    }

    #[test]
    fn test_room_phase_display() {
        assert_eq!(RoomPhase::CountingDown.to_string(), "CountingDown");
    }
}
