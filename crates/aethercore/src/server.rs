//! `AethercoreServer` builder and server loop.
//!
//! This is the entry point for running an Aethercore game server. It ties
//! together all the layers: transport → protocol → registry → rooms →
//! parties, with the router fanning server events back out to sockets.

use std::sync::Arc;
use std::time::Duration;

use aethercore_party::{PartyConfig, PartyManager};
use aethercore_protocol::{Codec, JsonCodec, ServerEvent};
use aethercore_registry::{Authenticator, CharacterStore, SessionRegistry};
use aethercore_room::{RoomConfig, RoomManager};
use aethercore_router::Router;
use aethercore_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::AethercoreError;
use crate::handler::handle_connection;

/// How often expired party invites are swept and their inviters notified.
const INVITE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The three
/// managers sit behind `tokio::sync::Mutex`es; the router carries its
/// own interior lock and is used without awaiting.
pub(crate) struct ServerState<A: Authenticator, S: CharacterStore, C: Codec> {
    pub(crate) registry: Mutex<SessionRegistry>,
    pub(crate) rooms: Mutex<RoomManager>,
    pub(crate) parties: Mutex<PartyManager>,
    pub(crate) router: Router,
    pub(crate) auth: A,
    pub(crate) store: S,
    pub(crate) codec: C,
}

/// Builder for configuring and starting an Aethercore server.
///
/// # Example
///
/// ```rust,ignore
/// use aethercore::prelude::*;
///
/// let server = AethercoreServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(my_auth, my_store)
///     .await?;
/// server.run().await
/// ```
pub struct AethercoreServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    party_config: PartyConfig,
}

impl AethercoreServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
            party_config: PartyConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the room configuration (capacity, lobby clocks, combat).
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Sets the party configuration (invite TTL).
    pub fn party_config(mut self, config: PartyConfig) -> Self {
        self.party_config = config;
        self
    }

    /// Builds and starts the server with the given authenticator and
    /// character store.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport` as defaults. Must be
    /// called inside a Tokio runtime: building seeds the world room,
    /// which spawns its actor task.
    pub async fn build<A: Authenticator, S: CharacterStore>(
        self,
        auth: A,
        store: S,
    ) -> Result<AethercoreServer<A, S, JsonCodec>, AethercoreError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let router = Router::new();

        let state = Arc::new(ServerState {
            registry: Mutex::new(SessionRegistry::new()),
            rooms: Mutex::new(RoomManager::new(self.room_config, router.clone())),
            parties: Mutex::new(PartyManager::new(self.party_config)),
            router,
            auth,
            store,
            codec: JsonCodec,
        });

        Ok(AethercoreServer { transport, state })
    }
}

impl Default for AethercoreServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Aethercore game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct AethercoreServer<A: Authenticator, S: CharacterStore, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, S, C>>,
}

impl<A, S, C> AethercoreServer<A, S, C>
where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> AethercoreServerBuilder {
        AethercoreServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, AethercoreError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections, performs the handshake, and spawns
    /// a handler task for each connected player. Also starts the
    /// periodic invite sweep. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), AethercoreError> {
        tracing::info!("Aethercore server running");

        spawn_invite_sweep(Arc::clone(&self.state));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Periodically purges expired party invites and tells each inviter
/// their invite lapsed. Lazy purging inside the manager already keeps
/// expired invites unacceptable; the sweep exists for the notification.
fn spawn_invite_sweep<A, S, C>(state: Arc<ServerState<A, S, C>>)
where
    A: Authenticator,
    S: CharacterStore,
    C: Codec,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(INVITE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let expired = state.parties.lock().await.purge_expired();
            if expired.is_empty() {
                continue;
            }

            let registry = state.registry.lock().await;
            for invite in expired {
                let target_name = registry
                    .lookup(invite.target)
                    .map(|s| s.username().to_string())
                    .unwrap_or_default();
                state.router.send(
                    invite.inviter,
                    ServerEvent::PartyInviteDeclined {
                        party_id: invite.party_id,
                        target_name,
                    },
                );
            }
        }
    });
}
