// Game server: owns the shared world behind one mutex, handles the
// join / input / disconnect lifecycle, runs the tick loop, and broadcasts
// messages to WebSocket subscribers.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics;
use crate::persistence::PersistenceHandle;

use super::config::GameConfig;
use super::game::{Game, Pickup};
use super::player::{sanitize_name, ConnectionId, InputState, Player};
use super::protocol::{JoinRequest, ProtocolError, ServerMessage};
use super::session::SessionStore;
use super::world::{Coin, WorldBounds};

/// Capacity of the outbound broadcast channel. Slow clients that fall further
/// behind than this skip messages.
const BROADCAST_CAPACITY: usize = 256;

/// What a joining connection learns about its session and the world.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinAck {
    pub session_id: String,
    pub reconnected: bool,
    pub world: WorldBounds,
    pub collectible: Coin,
}

impl JoinAck {
    pub fn into_message(self) -> ServerMessage {
        ServerMessage::Joined {
            session_id: self.session_id,
            world: self.world,
            collectible: self.collectible,
        }
    }
}

/// Runs the shared world and fans messages out to every connection.
pub struct GameServer {
    game: Mutex<Game>,
    sessions: SessionStore,
    persistence: PersistenceHandle,
    broadcast_tx: broadcast::Sender<String>,
    next_connection_id: AtomicU64,
}

impl GameServer {
    pub fn new(config: GameConfig, persistence: PersistenceHandle) -> Self {
        Self::with_game(Game::new(config), persistence)
    }

    pub fn with_game(game: Game, persistence: PersistenceHandle) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            game: Mutex::new(game),
            sessions: SessionStore::new(),
            persistence,
            broadcast_tx: tx,
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// The single serialization point over the world. A panic while the lock
    /// was held does not lock everyone else out.
    fn game(&self) -> MutexGuard<'_, Game> {
        self.game.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the world.
    pub fn with_world<R>(&self, f: impl FnOnce(&mut Game) -> R) -> R {
        f(&mut self.game())
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> GameConfig {
        self.game().config.clone()
    }

    pub fn player_count(&self) -> usize {
        self.game().player_count()
    }

    /// Subscribe to outbound messages. Returns a receiver that yields JSON strings.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.broadcast_tx.subscribe()
    }

    /// Register a new transport connection: assigns its id and subscribes it
    /// to broadcasts. The connection is not in the world until it joins.
    pub fn connect(&self) -> (ConnectionId, broadcast::Receiver<String>) {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(connection_id = id, "Client connected");
        (id, self.subscribe())
    }

    /// Serialize and send a message to every subscriber. Sending never blocks,
    /// so world-derived messages are sent while the world lock is held and
    /// reach subscribers in the order the world changed.
    pub fn broadcast(&self, msg: &ServerMessage) {
        match msg.to_json() {
            // No subscribers is not an error.
            Ok(json) => {
                let _ = self.broadcast_tx.send(json);
            }
            Err(e) => tracing::error!("Failed to encode broadcast: {e}"),
        }
    }

    /// Add a connection's player to the world.
    ///
    /// The live score always starts at 0, even when the session is known and
    /// its persisted record holds an earlier score.
    pub fn join(&self, conn: ConnectionId, req: JoinRequest) -> Result<JoinAck, ProtocolError> {
        let name = {
            let max_len = self.game().config.name_max_len;
            sanitize_name(req.name.as_deref(), max_len)
        };

        let (ack, player_count) = {
            let mut game = self.game();
            if game.contains_player(conn) {
                return Err(ProtocolError::AlreadyJoined);
            }
            let session = self.sessions.resolve(req.session_id.as_deref(), &name);
            let player = game.add_player(conn, session.session_id.clone(), name.clone());
            let joined = ServerMessage::PlayerJoined {
                id: player.id,
                name: player.name.clone(),
                x: player.x,
                y: player.y,
            };
            let ack = JoinAck {
                session_id: session.session_id,
                reconnected: session.reconnected,
                world: game.bounds(),
                collectible: game.coin(),
            };
            self.broadcast(&joined);
            (ack, game.player_count())
        };

        metrics::LIVE_PLAYERS.set(player_count as i64);
        tracing::info!(
            connection_id = conn,
            session_id = %ack.session_id,
            reconnected = ack.reconnected,
            "Player '{}' joined",
            name
        );

        self.persistence
            .upsert_session(&ack.session_id, &name, None, Utc::now());
        Ok(ack)
    }

    /// Update a player's velocity. Unknown connections are ignored.
    pub fn set_input(&self, conn: ConnectionId, input: InputState) {
        if !self.game().set_input(conn, &input) {
            tracing::trace!(connection_id = conn, "Input for absent player ignored");
        }
    }

    /// Remove a connection's player, persist its final score and tell everyone.
    /// Returns the removed player, or `None` if the connection never joined.
    pub fn disconnect(&self, conn: ConnectionId) -> Option<Player> {
        let (removed, player_count) = {
            let mut game = self.game();
            let removed = game.remove_player(conn);
            if removed.is_some() {
                self.broadcast(&ServerMessage::PlayerLeft { id: conn });
            }
            (removed, game.player_count())
        };

        let Some(player) = removed else {
            tracing::info!(connection_id = conn, "Client disconnected before joining");
            return None;
        };

        metrics::LIVE_PLAYERS.set(player_count as i64);
        tracing::info!(
            connection_id = conn,
            session_id = %player.session_id,
            score = player.score,
            "Player '{}' left",
            player.name
        );

        let now = Utc::now();
        self.sessions.touch(&player.session_id, &player.name);
        self.persistence
            .upsert_session(&player.session_id, &player.name, Some(player.score), now);
        self.persistence.append_score(&player.name, player.score, now);
        Some(player)
    }

    /// Run one simulation step of `dt` seconds, then broadcast score updates
    /// for every pickup followed by the full state snapshot.
    pub fn tick(&self, dt: f64) -> Vec<Pickup> {
        let tick_start = Instant::now();
        let pickups = {
            let mut game = self.game();
            let pickups = game.tick(dt);
            for pickup in &pickups {
                self.broadcast(&ServerMessage::ScoreUpdate {
                    id: pickup.player_id,
                    score: pickup.score,
                });
            }
            self.broadcast(&ServerMessage::State(game.snapshot()));
            pickups
        };

        let now = Utc::now();
        for pickup in &pickups {
            metrics::PICKUPS_TOTAL.inc();
            tracing::debug!(
                connection_id = pickup.player_id,
                score = pickup.score,
                "Coin picked up by '{}'",
                pickup.name
            );
            self.persistence
                .upsert_session(&pickup.session_id, &pickup.name, Some(pickup.score), now);
            self.persistence.append_score(&pickup.name, pickup.score, now);
        }

        metrics::TICKS_TOTAL.inc();
        metrics::TICK_DURATION_MS.observe(tick_start.elapsed().as_secs_f64() * 1000.0);
        pickups
    }

    /// Spawn the fixed-rate tick loop. Each tick integrates over the measured
    /// wall-clock time since the previous one. A panicking tick is logged and
    /// skipped; the loop keeps running.
    pub fn spawn_tick_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let server = Arc::clone(self);
        let period = server.config().tick_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();

            loop {
                ticker.tick().await;
                let now = Instant::now();
                let dt = now.duration_since(last).as_secs_f64();
                last = now;

                let result = std::panic::catch_unwind(AssertUnwindSafe(|| server.tick(dt)));
                if let Err(panic_info) = result {
                    let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    metrics::TICK_PANICS_TOTAL.inc();
                    tracing::error!("Tick panicked: {}", msg);
                }
            }
        })
    }
}
