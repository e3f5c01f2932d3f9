//! Server-authoritative combat state.
//!
//! [`CombatAuthority`] is a plain state machine: no channels, no tasks,
//! no broadcasting. Each room actor owns one instance covering exactly
//! its members, which makes the actor the single writer of health and
//! keeps these rules testable without a runtime.
//!
//! Methods return outcome enums rather than firing events; the actor
//! translates outcomes into broadcasts. Timing uses
//! `tokio::time::Instant` so the respawn window can be tested under
//! paused time.
//!
//! Rules, in brief:
//! - A record starts uninitialized (max health 0) until the owning
//!   client's first stat report; damage against an uninitialized target
//!   is dropped and logged.
//! - Health is clamped to `[0, max]` after every mutation.
//! - Reaching zero marks the target dead, arms the respawn window, and
//!   yields exactly one death outcome. Re-reported deaths don't re-arm.
//! - Respawn is request-driven: the window gates eligibility, the
//!   client's request performs it.

use std::collections::HashMap;
use std::time::Duration;

use aethercore_protocol::SessionId;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Tunables for the combat rules.
#[derive(Debug, Clone)]
pub struct CombatConfig {
    /// How long a dead player waits before a respawn request succeeds.
    pub respawn_delay: Duration,
    /// Number of respawn points; a respawn picks one at random.
    pub respawn_points: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            respawn_delay: Duration::from_secs(10),
            respawn_points: 20,
        }
    }
}

/// One member's combat state.
#[derive(Debug, Clone)]
struct CombatRecord {
    health: f32,
    /// Zero until the owning client's first stat report.
    max_health: f32,
    alive: bool,
    /// Armed on death; cleared on respawn or removal.
    respawn_at: Option<Instant>,
}

impl CombatRecord {
    fn uninitialized() -> Self {
        Self {
            health: 0.0,
            max_health: 0.0,
            alive: true,
            respawn_at: None,
        }
    }

    fn initialized(&self) -> bool {
        self.max_health > 0.0
    }
}

/// Outcome of [`CombatAuthority::apply_damage`].
#[derive(Debug, Clone, PartialEq)]
pub enum DamageOutcome {
    /// Damage landed. `died` is `true` for the hit that reached zero.
    Applied {
        health: f32,
        max_health: f32,
        died: bool,
    },
    /// Target is already dead; the hit is dropped.
    TargetDead,
    /// Target never reported its max health; the hit is dropped.
    Uninitialized,
}

/// Outcome of [`CombatAuthority::apply_heal`].
#[derive(Debug, Clone, PartialEq)]
pub enum HealOutcome {
    Applied { health: f32, max_health: f32 },
    /// Absent, dead, or uninitialized target. Stale heals are expected
    /// crossfire and stay silent.
    Ignored,
}

/// Outcome of [`CombatAuthority::mark_dead`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeathOutcome {
    /// First death report; the respawn window is now armed.
    Died { respawn_ms: u64 },
    /// Already dead. The existing window is untouched.
    AlreadyDead,
}

/// Outcome of [`CombatAuthority::request_respawn`].
#[derive(Debug, Clone, PartialEq)]
pub enum RespawnOutcome {
    Respawned {
        spawn_point: u32,
        health: f32,
        max_health: f32,
    },
    /// The window hasn't elapsed yet; the request is ignored.
    Pending,
}

/// Errors answered only to the offending caller.
#[derive(Debug, thiserror::Error)]
pub enum CombatError {
    #[error("combat target {0} not found")]
    TargetNotFound(SessionId),

    /// Respawn requested while alive.
    #[error("session {0} is not dead")]
    NotDead(SessionId),
}

/// Combat records for the members of one room.
#[derive(Debug, Default)]
pub struct CombatAuthority {
    records: HashMap<SessionId, CombatRecord>,
    config: CombatConfig,
}

impl CombatAuthority {
    pub fn new(config: CombatConfig) -> Self {
        Self {
            records: HashMap::new(),
            config,
        }
    }

    /// Adds an uninitialized record for a joining member.
    pub fn insert(&mut self, session_id: SessionId) {
        self.records
            .insert(session_id, CombatRecord::uninitialized());
    }

    /// Drops a leaving member's record, and with it any armed respawn
    /// window.
    pub fn remove(&mut self, session_id: SessionId) {
        self.records.remove(&session_id);
    }

    /// Current `(health, max_health)`, if the member exists.
    pub fn health(&self, session_id: SessionId) -> Option<(f32, f32)> {
        self.records
            .get(&session_id)
            .map(|r| (r.health, r.max_health))
    }

    pub fn is_alive(&self, session_id: SessionId) -> bool {
        self.records.get(&session_id).is_some_and(|r| r.alive)
    }

    /// Applies damage from `attacker` to `target`.
    ///
    /// # Errors
    /// [`CombatError::TargetNotFound`] if the target isn't in this room.
    pub fn apply_damage(
        &mut self,
        attacker: SessionId,
        target: SessionId,
        amount: f32,
    ) -> Result<DamageOutcome, CombatError> {
        let config_delay = self.config.respawn_delay;
        let record = self
            .records
            .get_mut(&target)
            .ok_or(CombatError::TargetNotFound(target))?;

        if !record.initialized() {
            debug!(%attacker, %target, amount, "damage dropped: target has not reported stats");
            return Ok(DamageOutcome::Uninitialized);
        }
        if !record.alive {
            return Ok(DamageOutcome::TargetDead);
        }

        record.health = (record.health - amount).clamp(0.0, record.max_health);
        let died = record.health <= 0.0;
        if died {
            record.alive = false;
            record.respawn_at = Some(Instant::now() + config_delay);
            debug!(%target, %attacker, "combat death");
        }
        Ok(DamageOutcome::Applied {
            health: record.health,
            max_health: record.max_health,
            died,
        })
    }

    /// Applies a heal, capped at the target's max health.
    pub fn apply_heal(&mut self, target: SessionId, amount: f32) -> HealOutcome {
        let Some(record) = self.records.get_mut(&target) else {
            return HealOutcome::Ignored;
        };
        if !record.alive || !record.initialized() {
            return HealOutcome::Ignored;
        }

        record.health = (record.health + amount).clamp(0.0, record.max_health);
        HealOutcome::Applied {
            health: record.health,
            max_health: record.max_health,
        }
    }

    /// Handles a client-reported death. Idempotent: a second report
    /// while dead must not re-arm the respawn window.
    pub fn mark_dead(&mut self, session_id: SessionId) -> Result<DeathOutcome, CombatError> {
        let delay = self.config.respawn_delay;
        let record = self
            .records
            .get_mut(&session_id)
            .ok_or(CombatError::TargetNotFound(session_id))?;

        if !record.alive {
            return Ok(DeathOutcome::AlreadyDead);
        }
        record.alive = false;
        record.health = 0.0;
        record.respawn_at = Some(Instant::now() + delay);
        Ok(DeathOutcome::Died {
            respawn_ms: delay.as_millis() as u64,
        })
    }

    /// Handles a respawn request. The armed window is authoritative: a
    /// request before it elapses is ignored, not an error.
    ///
    /// # Errors
    /// [`CombatError::NotDead`] if the session is alive.
    pub fn request_respawn(
        &mut self,
        session_id: SessionId,
    ) -> Result<RespawnOutcome, CombatError> {
        let points = self.config.respawn_points;
        let record = self
            .records
            .get_mut(&session_id)
            .ok_or(CombatError::TargetNotFound(session_id))?;

        if record.alive {
            return Err(CombatError::NotDead(session_id));
        }
        match record.respawn_at {
            Some(at) if Instant::now() < at => Ok(RespawnOutcome::Pending),
            Some(_) | None => {
                record.alive = true;
                record.health = record.max_health;
                record.respawn_at = None;
                let spawn_point = rand::rng().random_range(0..points.max(1));
                Ok(RespawnOutcome::Respawned {
                    spawn_point,
                    health: record.health,
                    max_health: record.max_health,
                })
            }
        }
    }

    /// Accepts a member's self-reported stats. The first report
    /// initializes health to the reported current value (or to max).
    ///
    /// Returns the resulting `(health, max_health)`, or `None` for an
    /// unknown session.
    pub fn report_stats(
        &mut self,
        session_id: SessionId,
        max_health: f32,
        health: Option<f32>,
    ) -> Option<(f32, f32)> {
        let record = self.records.get_mut(&session_id)?;
        if max_health <= 0.0 {
            warn!(%session_id, max_health, "rejected non-positive max health report");
            return Some((record.health, record.max_health));
        }

        let first_report = !record.initialized();
        record.max_health = max_health;
        if first_report {
            record.health = health.unwrap_or(max_health);
        } else if let Some(h) = health {
            record.health = h;
        }
        record.health = record.health.clamp(0.0, record.max_health);
        Some((record.health, record.max_health))
    }
}

// =========================================================================
// Tests
// =========================================================================
