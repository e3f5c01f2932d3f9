//! Per-connection handler: handshake, auth, and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Hello → validate version
//!   2. Authenticate token → register a session
//!   3. Send Welcome → player is connected
//!   4. Loop: pump router events out, dispatch client events in
//!
//! The loop owns the socket exclusively, so outbound router traffic and
//! inbound client events are multiplexed with `select!` instead of a
//! separate writer task.

use std::sync::Arc;

use aethercore_party::PartyError;
use aethercore_protocol::{
    CharacterClass, ChatChannel, ClientEvent, Codec, PROTOCOL_VERSION, PartyId,
    RoomId, Scope, ServerEvent, SessionId, StatBlock,
};
use aethercore_registry::{
    Authenticator, CharacterRecord, CharacterStore, JoinInfo,
};
use aethercore_room::{MemberProfile, RoomError, RoomEvent};
use aethercore_transport::{Connection, WebSocketConnection};
use tokio::time::{Duration, Instant};

use crate::AethercoreError;
use crate::server::ServerState;

/// How long the handshake may take before the connection is dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle cutoff. Clients ping well inside this window.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// Drop guard that cleans up a session when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async locks.
struct DisconnectGuard<A: Authenticator, S: CharacterStore, C: Codec> {
    session_id: SessionId,
    state: Arc<ServerState<A, S, C>>,
}

impl<A: Authenticator, S: CharacterStore, C: Codec> Drop
    for DisconnectGuard<A, S, C>
{
    fn drop(&mut self) {
        let session_id = self.session_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(cleanup(state, session_id));
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, S, C>>,
) -> Result<(), AethercoreError>
where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let session_id = perform_handshake(&conn, &state).await?;
    tracing::info!(%conn_id, %session_id, "player authenticated");

    let mut events = state.router.connect(session_id);
    let _guard = DisconnectGuard {
        session_id,
        state: Arc::clone(&state),
    };

    let started = Instant::now();
    let mut idle_deadline = Instant::now() + CLIENT_TIMEOUT;

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                // `None` means the router dropped us (cleanup raced us).
                let Some(event) = maybe_event else { break };
                let bytes = state.codec.encode(&event)?;
                if conn.send(&bytes).await.is_err() {
                    break;
                }
            }

            incoming = conn.recv() => {
                match incoming {
                    Ok(Some(data)) => {
                        idle_deadline = Instant::now() + CLIENT_TIMEOUT;
                        match state.codec.decode::<ClientEvent>(&data) {
                            Ok(event) => {
                                dispatch(&state, session_id, started, event)
                                    .await;
                            }
                            Err(e) => {
                                tracing::debug!(
                                    %session_id, error = %e,
                                    "failed to decode client event"
                                );
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!(%session_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%session_id, error = %e, "recv error");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep_until(idle_deadline) => {
                tracing::info!(%session_id, "connection timed out");
                break;
            }
        }
    }

    // _guard drops here → session cleanup fires.
    Ok(())
}

/// Performs the initial handshake: receive Hello, validate, auth, send
/// Welcome. The session registered here is forgotten again if the
/// Welcome can't be delivered.
async fn perform_handshake<A, S, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, S, C>>,
) -> Result<SessionId, AethercoreError>
where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(AethercoreError::Protocol(
                aethercore_protocol::ProtocolError::InvalidMessage(
                    "connection closed before handshake".into(),
                ),
            ));
        }
        Ok(Err(e)) => return Err(AethercoreError::Transport(e)),
        Err(_) => {
            return Err(AethercoreError::Protocol(
                aethercore_protocol::ProtocolError::InvalidMessage(
                    "handshake timed out".into(),
                ),
            ));
        }
    };

    let event: ClientEvent = state.codec.decode(&data)?;
    let (version, token) = match event {
        ClientEvent::Hello { version, token } => (version, token),
        _ => {
            send_error(conn, &state.codec, 400, "expected Hello").await?;
            return Err(AethercoreError::Protocol(
                aethercore_protocol::ProtocolError::InvalidMessage(
                    "first message must be Hello".into(),
                ),
            ));
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            conn,
            &state.codec,
            400,
            &format!(
                "version mismatch: expected {PROTOCOL_VERSION}, got {version}"
            ),
        )
        .await?;
        return Err(AethercoreError::Protocol(
            aethercore_protocol::ProtocolError::InvalidMessage(
                "protocol version mismatch".into(),
            ),
        ));
    }

    let account_id = match state.auth.authenticate(&token).await {
        Ok(account_id) => account_id,
        Err(e) => {
            send_error(conn, &state.codec, 401, "unauthorized").await?;
            return Err(AethercoreError::Registry(e));
        }
    };

    let session_id = state
        .registry
        .lock()
        .await
        .register(conn.id(), account_id);

    let welcome = ServerEvent::Welcome { session_id };
    let bytes = state.codec.encode(&welcome)?;
    if let Err(e) = conn.send(&bytes).await {
        state.registry.lock().await.forget(session_id);
        return Err(AethercoreError::Transport(e));
    }

    Ok(session_id)
}

/// Routes one decoded client event. Request-level failures are answered
/// with `ServerEvent::Error` (or just logged for fire-and-forget relays);
/// nothing here tears the connection down.
async fn dispatch<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    started: Instant,
    event: ClientEvent,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    match event {
        ClientEvent::Hello { .. } => {
            send_client_error(state, session_id, 400, "already connected");
        }

        ClientEvent::Ping { client_time } => {
            state.router.send(
                session_id,
                ServerEvent::Pong {
                    client_time,
                    server_time: started.elapsed().as_millis() as u64,
                },
            );
        }

        ClientEvent::JoinRoom {
            room_id,
            username,
            class,
        } => handle_join_room(state, session_id, room_id, username, class).await,

        ClientEvent::LeaveRoom => {
            let result = state.rooms.lock().await.leave_room(session_id).await;
            match result {
                Ok(room_id) => {
                    tracing::debug!(%session_id, %room_id, "left room");
                    state.registry.lock().await.set_room(session_id, None);
                }
                Err(e) => {
                    tracing::debug!(%session_id, error = %e, "leave room failed");
                }
            }
        }

        // -- In-room relays and combat: forwarded to the room actor --
        ClientEvent::Move {
            position,
            rotation,
            velocity,
            moving,
        } => {
            forward_room_event(
                state,
                session_id,
                RoomEvent::Move {
                    position,
                    rotation,
                    velocity,
                    moving,
                },
            )
            .await;
        }

        ClientEvent::Animate { state: animation } => {
            forward_room_event(
                state,
                session_id,
                RoomEvent::Animate { state: animation },
            )
            .await;
        }

        ClientEvent::UseSkill {
            skill_id,
            target_id,
            position,
            direction,
        } => {
            forward_room_event(
                state,
                session_id,
                RoomEvent::UseSkill {
                    skill_id,
                    target_id,
                    position,
                    direction,
                },
            )
            .await;
        }

        ClientEvent::VisualEffect {
            effect,
            position,
            rotation,
            target_id,
            duration,
        } => {
            forward_room_event(
                state,
                session_id,
                RoomEvent::VisualEffect {
                    effect,
                    position,
                    rotation,
                    target_id,
                    duration,
                },
            )
            .await;
        }

        ClientEvent::Attack { target_id, damage } => {
            forward_room_event(
                state,
                session_id,
                RoomEvent::Attack { target_id, damage },
            )
            .await;
        }

        ClientEvent::Heal { target_id, amount } => {
            forward_room_event(
                state,
                session_id,
                RoomEvent::Heal { target_id, amount },
            )
            .await;
        }

        ClientEvent::Died => {
            forward_room_event(state, session_id, RoomEvent::Died).await;
        }

        ClientEvent::RequestRespawn => {
            forward_room_event(state, session_id, RoomEvent::RequestRespawn)
                .await;
        }

        ClientEvent::ReportStats {
            max_health,
            health,
            stats,
        } => {
            handle_report_stats(state, session_id, max_health, health, stats)
                .await;
        }

        // -- Parties --
        ClientEvent::PartyInvite { target_id } => {
            handle_party_invite(state, session_id, target_id).await;
        }

        ClientEvent::PartyAccept { party_id } => {
            handle_party_accept(state, session_id, party_id).await;
        }

        ClientEvent::PartyDecline { party_id } => {
            handle_party_decline(state, session_id, party_id).await;
        }

        ClientEvent::PartyLeave => {
            handle_party_leave(state, session_id).await;
        }

        ClientEvent::Chat { channel, message } => {
            handle_chat(state, session_id, channel, message).await;
        }
    }
}

/// Loads the character, attaches the identity, and joins the room.
/// A store failure degrades to a fresh level-1 character; the join
/// itself never blocks on persistence being healthy.
async fn handle_join_room<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    room_id: RoomId,
    username: String,
    class: CharacterClass,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let account_id = {
        let registry = state.registry.lock().await;
        match registry.lookup(session_id) {
            Some(session) => session.account_id.clone(),
            None => return,
        }
    };

    let record = match state.store.load_character(&account_id, class).await {
        Ok(record) => record.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(
                %session_id, error = %e,
                "character load failed, using defaults"
            );
            CharacterRecord::default()
        }
    };

    let info = JoinInfo {
        username: username.clone(),
        class,
        level: record.level,
        stats: record.stats,
    };
    if let Err(e) = state.registry.lock().await.attach(session_id, info) {
        tracing::debug!(%session_id, error = %e, "attach failed");
        return;
    }

    let profile = MemberProfile {
        username,
        class,
        level: record.level,
        stats: record.stats,
    };
    let result = state
        .rooms
        .lock()
        .await
        .join_room(session_id, room_id, profile)
        .await;

    match result {
        Ok(snapshot) => {
            state
                .registry
                .lock()
                .await
                .set_room(session_id, Some(snapshot.room_id.clone()));
            state.router.send(
                session_id,
                ServerEvent::RoomPlayers {
                    room_id: snapshot.room_id,
                    players: snapshot.players,
                    your_session_id: session_id,
                    your_spawn_index: snapshot.spawn_index,
                    game_started: snapshot.game_started,
                },
            );
        }
        Err(e) => {
            let code = match &e {
                RoomError::RoomFull(_) | RoomError::AlreadyInRoom(..) => 409,
                RoomError::NotFound(_) => 404,
                _ => 500,
            };
            send_client_error(state, session_id, code, &e.to_string());
        }
    }
}

/// Forwards the stat report to the room (the combat authority) and
/// mirrors the new health to the reporter's party, if they have one.
async fn handle_report_stats<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    max_health: f32,
    health: Option<f32>,
    stats: Option<StatBlock>,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    forward_room_event(
        state,
        session_id,
        RoomEvent::ReportStats { max_health, health },
    )
    .await;

    if let Some(stats) = stats {
        let mut registry = state.registry.lock().await;
        if let Some(session) = registry.lookup_mut(session_id) {
            if let Some(identity) = session.identity.as_mut() {
                identity.stats = stats;
            }
        }
    }

    let party_id = state
        .parties
        .lock()
        .await
        .party_of(session_id)
        .map(|p| p.id);
    if let Some(party_id) = party_id {
        state.router.broadcast(
            &Scope::Party(party_id),
            &ServerEvent::PartyMemberStats {
                party_id,
                member_id: session_id,
                health: health.unwrap_or(max_health),
                max_health,
            },
        );
    }
}

async fn handle_party_invite<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    target_id: SessionId,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let (inviter, target_exists) = {
        let registry = state.registry.lock().await;
        let inviter = registry
            .lookup(session_id)
            .and_then(|s| s.identity.clone());
        (inviter, registry.lookup(target_id).is_some())
    };

    let Some(inviter) = inviter else {
        send_client_error(state, session_id, 400, "join a room before inviting");
        return;
    };
    if !target_exists {
        send_client_error(state, session_id, 404, "target not found");
        return;
    }

    let result = state.parties.lock().await.invite(session_id, target_id);
    match result {
        Ok(invite) => {
            state.router.send(
                target_id,
                ServerEvent::PartyInviteReceived {
                    party_id: invite.party_id,
                    inviter_id: session_id,
                    inviter_name: inviter.username,
                    inviter_class: inviter.class,
                    inviter_level: inviter.level,
                },
            );
        }
        Err(e @ PartyError::AlreadyInParty(_)) => {
            send_client_error(state, session_id, 409, &e.to_string());
        }
        Err(e) => {
            send_client_error(state, session_id, 400, &e.to_string());
        }
    }
}

async fn handle_party_accept<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    party_id: PartyId,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let member = state
        .registry
        .lock()
        .await
        .lookup(session_id)
        .and_then(|s| s.identity.clone());
    let Some(member) = member else {
        send_client_error(
            state,
            session_id,
            400,
            "join a room before joining a party",
        );
        return;
    };

    let result = state.parties.lock().await.accept(session_id, party_id);
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e @ PartyError::InviteNotFound(_)) => {
            send_client_error(state, session_id, 404, &e.to_string());
            return;
        }
        Err(e @ PartyError::AlreadyInParty(_)) => {
            send_client_error(state, session_id, 409, &e.to_string());
            return;
        }
        Err(e) => {
            send_client_error(state, session_id, 400, &e.to_string());
            return;
        }
    };

    let inviter_info = {
        let mut registry = state.registry.lock().await;
        registry.set_party(session_id, Some(party_id));
        if outcome.created {
            registry.set_party(outcome.inviter, Some(party_id));
        }
        registry
            .lookup(outcome.inviter)
            .and_then(|s| s.identity.clone())
    };

    // Router membership first, so both join announcements reach everyone.
    if outcome.created {
        state.router.join_party(party_id, outcome.inviter);
    }
    state.router.join_party(party_id, session_id);

    if outcome.created {
        if let Some(inviter) = inviter_info {
            state.router.broadcast(
                &Scope::Party(party_id),
                &ServerEvent::PartyMemberJoined {
                    party_id,
                    member_id: outcome.inviter,
                    member_name: inviter.username,
                    member_class: inviter.class,
                    member_level: inviter.level,
                },
            );
        }
    }
    state.router.broadcast(
        &Scope::Party(party_id),
        &ServerEvent::PartyMemberJoined {
            party_id,
            member_id: session_id,
            member_name: member.username,
            member_class: member.class,
            member_level: member.level,
        },
    );
}

async fn handle_party_decline<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    party_id: PartyId,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let result = state.parties.lock().await.decline(session_id, party_id);
    match result {
        Ok(invite) => {
            let target_name = state
                .registry
                .lock()
                .await
                .lookup(session_id)
                .map(|s| s.username().to_string())
                .unwrap_or_default();
            state.router.send(
                invite.inviter,
                ServerEvent::PartyInviteDeclined {
                    party_id,
                    target_name,
                },
            );
        }
        Err(e) => {
            tracing::debug!(%session_id, error = %e, "decline failed");
        }
    }
}

async fn handle_party_leave<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let Some(outcome) = state.parties.lock().await.leave(session_id) else {
        send_client_error(state, session_id, 400, "not in a party");
        return;
    };

    let member_name = {
        let mut registry = state.registry.lock().await;
        registry.set_party(session_id, None);
        registry
            .lookup(session_id)
            .map(|s| s.username().to_string())
            .unwrap_or_default()
    };

    // The leaver is still in the party scope: they get their own
    // departure as confirmation, then drop out of the scope.
    state.router.broadcast(
        &Scope::Party(outcome.party_id),
        &ServerEvent::PartyMemberLeft {
            party_id: outcome.party_id,
            member_id: session_id,
            member_name,
            new_leader: outcome.new_leader,
        },
    );
    state.router.leave_party(outcome.party_id, session_id);
}

async fn handle_chat<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    channel: ChatChannel,
    message: String,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let username = state
        .registry
        .lock()
        .await
        .lookup(session_id)
        .map(|s| s.username().to_string());
    let Some(username) = username else { return };

    let scope = match channel {
        ChatChannel::All => {
            let room_id = state
                .rooms
                .lock()
                .await
                .session_room(session_id)
                .cloned();
            match room_id {
                Some(room_id) => Scope::Room(room_id),
                None => {
                    send_client_error(state, session_id, 400, "not in a room");
                    return;
                }
            }
        }
        ChatChannel::Party => {
            let party_id = state
                .parties
                .lock()
                .await
                .party_of(session_id)
                .map(|p| p.id);
            match party_id {
                Some(party_id) => Scope::Party(party_id),
                None => {
                    send_client_error(state, session_id, 400, "not in a party");
                    return;
                }
            }
        }
    };

    state.router.broadcast(
        &scope,
        &ServerEvent::ChatMessage {
            session_id,
            username,
            channel,
            message,
        },
    );
}

/// Forwards an in-room action; sessions without a room just drop it.
/// Movement spam from a client that left the room mid-flight is normal.
async fn forward_room_event<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    event: RoomEvent,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    if let Err(e) = state
        .rooms
        .lock()
        .await
        .send_event(session_id, event)
        .await
    {
        tracing::debug!(%session_id, error = %e, "room event dropped");
    }
}

/// Tears down everything a departing session touched: registry record,
/// room membership, party membership, pending invites, router channel.
/// The character is saved best-effort on the way out.
async fn cleanup<A, S, C>(state: Arc<ServerState<A, S, C>>, session_id: SessionId)
where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    let (departure, persist) = {
        let mut registry = state.registry.lock().await;
        let persist = registry.lookup(session_id).and_then(|s| {
            s.identity.as_ref().map(|i| {
                (
                    s.account_id.clone(),
                    i.class,
                    CharacterRecord {
                        level: i.level,
                        stats: i.stats,
                    },
                )
            })
        });
        (registry.forget(session_id), persist)
    };

    let Some(departure) = departure else {
        // Another cleanup path won the race; nothing left to do.
        state.router.disconnect(session_id);
        return;
    };

    if departure.room_id.is_some() {
        state.rooms.lock().await.disconnect(session_id).await;
    }

    let outcome = state.parties.lock().await.forget(session_id);
    if let Some(left) = outcome.left {
        if !left.dissolved {
            state.router.broadcast(
                &Scope::Party(left.party_id),
                &ServerEvent::PartyMemberLeft {
                    party_id: left.party_id,
                    member_id: session_id,
                    member_name: departure.username.clone(),
                    new_leader: left.new_leader,
                },
            );
        }
        state.router.leave_party(left.party_id, session_id);
    }
    for invite in outcome.dropped_invites {
        if invite.target == session_id {
            state.router.send(
                invite.inviter,
                ServerEvent::PartyInviteDeclined {
                    party_id: invite.party_id,
                    target_name: departure.username.clone(),
                },
            );
        }
    }

    state.router.disconnect(session_id);

    if let Some((account_id, class, record)) = persist {
        if let Err(e) = state.store.save_character(&account_id, class, record).await
        {
            tracing::warn!(%session_id, error = %e, "character save failed");
        }
    }

    tracing::info!(%session_id, "session cleaned up");
}

/// Sends a `ServerEvent::Error` through the router to a connected client.
fn send_client_error<A, S, C>(
    state: &Arc<ServerState<A, S, C>>,
    session_id: SessionId,
    code: u16,
    message: &str,
) where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    state.router.send(
        session_id,
        ServerEvent::Error {
            code,
            message: message.to_string(),
        },
    );
}

/// Sends a `ServerEvent::Error` directly over the socket, for the
/// handshake phase before the session has a router channel.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    code: u16,
    message: &str,
) -> Result<(), AethercoreError> {
    let event = ServerEvent::Error {
        code,
        message: message.to_string(),
    };
    let bytes = codec.encode(&event)?;
    conn.send(&bytes).await.map_err(AethercoreError::Transport)?;
    Ok(())
}
