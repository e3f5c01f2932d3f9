//! Room actor: an isolated Tokio task that owns one room.
//!
//! The actor is the single writer for everything in the room: roster,
//! spawn indices, movement state, lobby clocks, and combat records. The
//! outside world talks to it through [`RoomHandle`]; fan-out to clients
//! goes through the shared [`Router`].
//!
//! Lobby clocks are `Option<Instant>` deadlines wired into the actor's
//! `select!` loop; an unarmed deadline pends forever, and cancelling is
//! just setting it back to `None` in the same handler that changes the
//! phase.

use std::collections::HashMap;

use aethercore_combat::{
    CombatAuthority, CombatError, DamageOutcome, DeathOutcome, HealOutcome,
    RespawnOutcome,
};
use aethercore_protocol::{
    RoomId, RosterEntry, Scope, ServerEvent, SessionId, StatBlock, Vec3,
};
use aethercore_router::Router;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

use crate::{RoomConfig, RoomError, RoomPhase};

/// Identity a member brings into a room.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub username: String,
    pub class: aethercore_protocol::CharacterClass,
    pub level: u32,
    pub stats: StatBlock,
}

/// In-room actions from a member, delivered fire-and-forget.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Move {
        position: Vec3,
        rotation: Vec3,
        velocity: Vec3,
        moving: bool,
    },
    Animate {
        state: String,
    },
    Attack {
        target_id: Option<SessionId>,
        damage: f32,
    },
    UseSkill {
        skill_id: String,
        target_id: Option<SessionId>,
        position: Vec3,
        direction: Vec3,
    },
    VisualEffect {
        effect: String,
        position: Vec3,
        rotation: Vec3,
        target_id: Option<SessionId>,
        duration: f32,
    },
    ReportStats {
        max_health: f32,
        health: Option<f32>,
    },
    Heal {
        target_id: SessionId,
        amount: f32,
    },
    Died,
    RequestRespawn,
}

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        session_id: SessionId,
        profile: MemberProfile,
        reply: oneshot::Sender<Result<JoinSnapshot, RoomError>>,
    },
    Leave {
        session_id: SessionId,
        reply: oneshot::Sender<Result<LeaveOutcome, RoomError>>,
    },
    Event {
        session_id: SessionId,
        event: RoomEvent,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Shutdown,
}

/// Reply to a successful join.
#[derive(Debug, Clone)]
pub struct JoinSnapshot {
    pub room_id: RoomId,
    pub spawn_index: u32,
    /// Full roster, joiner included.
    pub players: Vec<RosterEntry>,
    pub game_started: bool,
}

/// Reply to a leave, so the manager can destroy emptied rooms.
#[derive(Debug, Clone)]
pub(crate) struct LeaveOutcome {
    pub now_empty: bool,
}

/// A snapshot of room metadata.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub phase: RoomPhase,
    pub player_count: usize,
    /// `None` for the unbounded world room.
    pub capacity: Option<usize>,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Sends a join request and waits for the roster snapshot.
    pub async fn join(
        &self,
        session_id: SessionId,
        profile: MemberProfile,
    ) -> Result<JoinSnapshot, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
                session_id,
                profile,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?
    }

    pub(crate) async fn leave(
        &self,
        session_id: SessionId,
    ) -> Result<LeaveOutcome, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Leave {
                session_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?
    }

    /// Delivers an in-room action (fire-and-forget).
    pub async fn send_event(
        &self,
        session_id: SessionId,
        event: RoomEvent,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Event { session_id, event })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Info { reply: reply_tx })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }
}

/// One member's actor-owned state (identity plus advisory movement).
/// Combat state lives in the actor's `CombatAuthority`.
struct Member {
    profile: MemberProfile,
    spawn_index: u32,
    position: Vec3,
    rotation: Vec3,
    animation: String,
}

/// Armed while the pre-start countdown runs.
struct Countdown {
    next_tick: Instant,
    remaining: u8,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    /// World rooms skip capacity checks and never run lobby clocks.
    world: bool,
    config: RoomConfig,
    phase: RoomPhase,
    members: HashMap<SessionId, Member>,
    combat: CombatAuthority,
    router: Router,
    /// Armed when the start threshold is held in `Forming`.
    wait_deadline: Option<Instant>,
    countdown: Option<Countdown>,
    receiver: mpsc::Receiver<RoomCommand>,
}

/// Sleeps until the deadline, or forever if none is armed. Lets the
/// actor's `select!` treat unarmed clocks as inert branches.
async fn sleep_until_armed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl RoomActor {
    /// Runs the actor loop, processing commands and clock expiries
    /// until shutdown.
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, world = self.world, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(RoomCommand::Join { session_id, profile, reply }) => {
                            let result = self.handle_join(session_id, profile);
                            let _ = reply.send(result);
                        }
                        Some(RoomCommand::Leave { session_id, reply }) => {
                            let result = self.handle_leave(session_id);
                            let _ = reply.send(result);
                        }
                        Some(RoomCommand::Event { session_id, event }) => {
                            self.handle_event(session_id, event);
                        }
                        Some(RoomCommand::Info { reply }) => {
                            let _ = reply.send(self.info());
                        }
                        Some(RoomCommand::Shutdown) | None => break,
                    }
                }
                _ = sleep_until_armed(self.wait_deadline) => {
                    self.on_wait_elapsed();
                }
                _ = sleep_until_armed(self.countdown.as_ref().map(|c| c.next_tick)) => {
                    self.on_countdown_tick();
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    // -- Membership -------------------------------------------------------

    fn handle_join(
        &mut self,
        session_id: SessionId,
        profile: MemberProfile,
    ) -> Result<JoinSnapshot, RoomError> {
        if self.members.contains_key(&session_id) {
            return Err(RoomError::AlreadyInRoom(session_id, self.room_id.clone()));
        }
        if !self.world && self.members.len() >= self.config.capacity {
            return Err(RoomError::RoomFull(self.room_id.clone()));
        }

        let spawn_index = self.lowest_free_spawn_index();
        self.members.insert(
            session_id,
            Member {
                profile,
                spawn_index,
                position: Vec3::default(),
                rotation: Vec3::default(),
                animation: "idle".to_string(),
            },
        );
        self.combat.insert(session_id);
        self.router.join_room(self.room_id.clone(), session_id);

        tracing::info!(
            room_id = %self.room_id,
            %session_id,
            spawn_index,
            players = self.members.len(),
            "player joined"
        );

        self.broadcast_except(
            session_id,
            ServerEvent::PlayerJoined {
                player: self.roster_entry(session_id),
            },
        );

        let game_started = self.phase.is_active();
        if game_started {
            // Late joiner into a running game: hand them the roster as
            // a game-start so the client enters play immediately.
            self.router.send(
                session_id,
                ServerEvent::GameStart {
                    room_id: self.room_id.clone(),
                    players: self.roster(),
                    already_started: true,
                },
            );
        } else {
            self.evaluate_lobby();
        }

        Ok(JoinSnapshot {
            room_id: self.room_id.clone(),
            spawn_index,
            players: self.roster(),
            game_started,
        })
    }

    fn handle_leave(&mut self, session_id: SessionId) -> Result<LeaveOutcome, RoomError> {
        let member = self
            .members
            .remove(&session_id)
            .ok_or(RoomError::NotInRoom(session_id))?;
        self.combat.remove(session_id);
        self.router.leave_room(&self.room_id, session_id);

        tracing::info!(
            room_id = %self.room_id,
            %session_id,
            players = self.members.len(),
            "player left"
        );

        self.broadcast(ServerEvent::PlayerLeft {
            session_id,
            username: member.profile.username,
        });
        self.evaluate_lobby();

        Ok(LeaveOutcome {
            now_empty: self.members.is_empty(),
        })
    }

    // -- Lobby state machine ----------------------------------------------

    /// Re-checks the start threshold after any membership change.
    ///
    /// Arms the wait clock when the threshold is first held; cancels
    /// every lobby clock and reverts to `Forming` the moment membership
    /// drops below the threshold before the game started.
    fn evaluate_lobby(&mut self) {
        if self.world || self.phase.is_active() {
            return;
        }

        let enough = self.members.len() >= self.config.min_to_start;
        if enough {
            if self.phase == RoomPhase::Forming && self.wait_deadline.is_none() {
                self.wait_deadline = Some(Instant::now() + self.config.lobby_wait);
                tracing::info!(
                    room_id = %self.room_id,
                    players = self.members.len(),
                    wait_secs = self.config.lobby_wait.as_secs(),
                    "lobby wait started"
                );
                self.broadcast(ServerEvent::LobbyCreated {
                    room_id: self.room_id.clone(),
                    wait_secs: self.config.lobby_wait.as_secs(),
                    player_count: self.members.len(),
                });
            }
            return;
        }

        let was_armed = self.wait_deadline.is_some() || self.countdown.is_some();
        self.wait_deadline = None;
        self.countdown = None;
        self.phase = RoomPhase::Forming;
        if was_armed {
            tracing::info!(room_id = %self.room_id, "lobby cancelled");
            self.broadcast(ServerEvent::LobbyCancelled {
                room_id: self.room_id.clone(),
                reason: "not enough players".to_string(),
            });
        }
    }

    fn on_wait_elapsed(&mut self) {
        self.wait_deadline = None;
        self.phase = RoomPhase::CountingDown;
        self.countdown = Some(Countdown {
            next_tick: Instant::now() + Duration::from_secs(1),
            remaining: self.config.countdown_ticks,
        });
        tracing::info!(room_id = %self.room_id, "countdown started");
    }

    fn on_countdown_tick(&mut self) {
        let Some(countdown) = self.countdown.as_mut() else {
            return;
        };
        let count = countdown.remaining;
        countdown.remaining -= 1;
        if countdown.remaining == 0 {
            self.countdown = None;
        } else {
            countdown.next_tick += Duration::from_secs(1);
        }

        self.broadcast(ServerEvent::CountdownTick { count });
        if self.countdown.is_none() {
            self.start_game();
        }
    }

    fn start_game(&mut self) {
        self.phase = RoomPhase::Active;
        tracing::info!(
            room_id = %self.room_id,
            players = self.members.len(),
            "game started"
        );
        self.broadcast(ServerEvent::GameStart {
            room_id: self.room_id.clone(),
            players: self.roster(),
            already_started: false,
        });
    }

    // -- In-room actions --------------------------------------------------

    fn handle_event(&mut self, session_id: SessionId, event: RoomEvent) {
        if !self.members.contains_key(&session_id) {
            tracing::warn!(
                room_id = %self.room_id,
                %session_id,
                "event from non-member, ignoring"
            );
            return;
        }

        match event {
            RoomEvent::Move {
                position,
                rotation,
                velocity,
                moving,
            } => {
                if let Some(member) = self.members.get_mut(&session_id) {
                    member.position = position;
                    member.rotation = rotation;
                }
                self.broadcast_except(
                    session_id,
                    ServerEvent::PlayerMoved {
                        session_id,
                        position,
                        rotation,
                        velocity,
                        moving,
                    },
                );
            }

            RoomEvent::Animate { state } => {
                if let Some(member) = self.members.get_mut(&session_id) {
                    member.animation = state.clone();
                }
                self.broadcast_except(
                    session_id,
                    ServerEvent::PlayerAnimated { session_id, state },
                );
            }

            RoomEvent::Attack { target_id, damage } => {
                self.broadcast_except(
                    session_id,
                    ServerEvent::PlayerAttacked {
                        session_id,
                        target_id,
                    },
                );
                if let Some(target) = target_id {
                    self.apply_damage(session_id, target, damage);
                }
            }

            RoomEvent::UseSkill {
                skill_id,
                target_id,
                position,
                direction,
            } => {
                self.broadcast_except(
                    session_id,
                    ServerEvent::SkillUsed {
                        session_id,
                        skill_id,
                        target_id,
                        position,
                        direction,
                    },
                );
            }

            RoomEvent::VisualEffect {
                effect,
                position,
                rotation,
                target_id,
                duration,
            } => {
                self.broadcast_except(
                    session_id,
                    ServerEvent::VisualEffectSpawned {
                        session_id,
                        effect,
                        position,
                        rotation,
                        target_id,
                        duration,
                    },
                );
            }

            RoomEvent::ReportStats { max_health, health } => {
                self.combat.report_stats(session_id, max_health, health);
            }

            RoomEvent::Heal { target_id, amount } => {
                match self.combat.apply_heal(target_id, amount) {
                    HealOutcome::Applied { health, max_health } => {
                        self.broadcast(ServerEvent::PlayerHealed {
                            target_id,
                            healer_id: session_id,
                            amount,
                            health,
                            max_health,
                        });
                    }
                    HealOutcome::Ignored => {
                        tracing::debug!(
                            room_id = %self.room_id,
                            %session_id,
                            %target_id,
                            "heal ignored"
                        );
                    }
                }
            }

            RoomEvent::Died => match self.combat.mark_dead(session_id) {
                Ok(DeathOutcome::Died { respawn_ms }) => {
                    self.broadcast(ServerEvent::PlayerDied {
                        session_id,
                        killer_id: None,
                        respawn_ms,
                    });
                }
                Ok(DeathOutcome::AlreadyDead) | Err(_) => {}
            },

            RoomEvent::RequestRespawn => match self.combat.request_respawn(session_id) {
                Ok(RespawnOutcome::Respawned {
                    spawn_point,
                    health,
                    max_health,
                }) => {
                    self.broadcast(ServerEvent::PlayerRespawned {
                        session_id,
                        spawn_point,
                        health,
                        max_health,
                    });
                }
                Ok(RespawnOutcome::Pending) => {
                    tracing::debug!(
                        room_id = %self.room_id,
                        %session_id,
                        "respawn requested before window elapsed"
                    );
                }
                Err(CombatError::NotDead(_)) => {
                    self.router.send(
                        session_id,
                        ServerEvent::Error {
                            code: 409,
                            message: "not dead".to_string(),
                        },
                    );
                }
                Err(_) => {}
            },
        }
    }

    fn apply_damage(&mut self, attacker: SessionId, target: SessionId, damage: f32) {
        match self.combat.apply_damage(attacker, target, damage) {
            Ok(DamageOutcome::Applied {
                health,
                max_health,
                died,
            }) => {
                self.broadcast(ServerEvent::PlayerDamaged {
                    target_id: target,
                    attacker_id: attacker,
                    damage,
                    health,
                    max_health,
                });
                if died {
                    self.broadcast(ServerEvent::PlayerDied {
                        session_id: target,
                        killer_id: Some(attacker),
                        respawn_ms: self.config.combat.respawn_delay.as_millis() as u64,
                    });
                }
            }
            // Dropped hits are the target's normal protection, not
            // anyone's error.
            Ok(DamageOutcome::TargetDead | DamageOutcome::Uninitialized) => {}
            Err(CombatError::TargetNotFound(_)) => {
                self.router.send(
                    attacker,
                    ServerEvent::Error {
                        code: 404,
                        message: format!("target {target} not in room"),
                    },
                );
            }
            Err(_) => {}
        }
    }

    // -- Helpers ----------------------------------------------------------

    fn lowest_free_spawn_index(&self) -> u32 {
        let mut index = 0u32;
        let used: std::collections::HashSet<u32> =
            self.members.values().map(|m| m.spawn_index).collect();
        while used.contains(&index) {
            index += 1;
        }
        index
    }

    /// Roster sorted by spawn index for deterministic snapshots.
    fn roster(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self
            .members
            .keys()
            .map(|&id| self.roster_entry(id))
            .collect();
        entries.sort_by_key(|e| e.spawn_index);
        entries
    }

    fn roster_entry(&self, session_id: SessionId) -> RosterEntry {
        let member = &self.members[&session_id];
        let (health, max_health) =
            self.combat.health(session_id).unwrap_or((0.0, 0.0));
        RosterEntry {
            session_id,
            username: member.profile.username.clone(),
            class: member.profile.class,
            level: member.profile.level,
            spawn_index: member.spawn_index,
            position: member.position,
            rotation: member.rotation,
            animation: member.animation.clone(),
            health,
            max_health,
            alive: self.combat.is_alive(session_id),
            stats: member.profile.stats,
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        self.router
            .broadcast(&Scope::Room(self.room_id.clone()), &event);
    }

    fn broadcast_except(&self, sender: SessionId, event: ServerEvent) {
        self.router.broadcast(
            &Scope::room_except(self.room_id.clone(), sender),
            &event,
        );
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            phase: self.phase,
            player_count: self.members.len(),
            capacity: (!self.world).then_some(self.config.capacity),
        }
    }
}

/// Spawns a new room actor task and returns a handle to it.
pub(crate) fn spawn_room(
    room_id: RoomId,
    world: bool,
    config: RoomConfig,
    router: Router,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let combat = CombatAuthority::new(config.combat.clone());

    let actor = RoomActor {
        room_id: room_id.clone(),
        world,
        phase: if world {
            RoomPhase::Active
        } else {
            RoomPhase::Forming
        },
        config,
        members: HashMap::new(),
        combat,
        router,
        wait_deadline: None,
        countdown: None,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}
