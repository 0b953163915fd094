use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::config::GameConfig;
use super::player::{ConnectionId, InputState, Player};
use super::protocol::{PlayerState, StateSnapshot};
use super::world::{Coin, WorldBounds};

/// A coin pickup that happened during a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Pickup {
    pub player_id: ConnectionId,
    pub session_id: String,
    pub name: String,
    /// Score after the pickup.
    pub score: i64,
}

/// The shared world: live players and the current coin.
///
/// Players are kept in a `BTreeMap` keyed by a join sequence number assigned
/// when they enter the world, so iteration order is join order regardless of
/// when their connections were opened. `slots` maps a connection to its key.
pub struct Game {
    pub config: GameConfig,
    bounds: WorldBounds,
    players: BTreeMap<u64, Player>,
    slots: HashMap<ConnectionId, u64>,
    next_join_seq: u64,
    coin: Coin,
    rng: StdRng,
    pub tick_count: u64,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic game for tests and replays.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, mut rng: StdRng) -> Self {
        let bounds = WorldBounds::new(config.width, config.height);
        let coin = Coin::spawn(&bounds, config.coin_radius, &mut rng);
        Game {
            config,
            bounds,
            players: BTreeMap::new(),
            slots: HashMap::new(),
            next_join_seq: 0,
            coin,
            rng,
            tick_count: 0,
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }

    pub fn player(&self, id: ConnectionId) -> Option<&Player> {
        self.slots.get(&id).and_then(|seq| self.players.get(seq))
    }

    fn player_mut(&mut self, id: ConnectionId) -> Option<&mut Player> {
        let seq = self.slots.get(&id)?;
        self.players.get_mut(seq)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn contains_player(&self, id: ConnectionId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Insert a new player at a uniformly random position inside the bounds,
    /// at rest and with a score of zero. Re-adding a live connection replaces
    /// its player and moves it to the back of the join order.
    pub fn add_player(&mut self, id: ConnectionId, session_id: String, name: String) -> &Player {
        self.remove_player(id);
        let radius = self.config.player_radius;
        let (x, y) = self.bounds.random_point(&mut self.rng, radius);
        let seq = self.next_join_seq;
        self.next_join_seq += 1;
        self.slots.insert(id, seq);
        self.players
            .insert(seq, Player::new(id, session_id, name, x, y, radius));
        &self.players[&seq]
    }

    pub fn remove_player(&mut self, id: ConnectionId) -> Option<Player> {
        let seq = self.slots.remove(&id)?;
        self.players.remove(&seq)
    }

    /// Update a player's velocity from input. Returns false if the player is gone.
    pub fn set_input(&mut self, id: ConnectionId, input: &InputState) -> bool {
        let speed = self.config.speed;
        match self.player_mut(id) {
            Some(player) => {
                player.apply_input(input, speed);
                true
            }
            None => false,
        }
    }

    /// Move a player, clamped to the bounds. Used for scripted scenarios.
    pub fn place_player(&mut self, id: ConnectionId, x: f64, y: f64) -> bool {
        let bounds = self.bounds;
        match self.player_mut(id) {
            Some(player) => {
                (player.x, player.y) = bounds.clamp(x, y, player.radius);
                true
            }
            None => false,
        }
    }

    /// Move the coin. Used for scripted scenarios.
    pub fn place_coin(&mut self, x: f64, y: f64) {
        self.coin.x = x;
        self.coin.y = y;
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Each player in join order is integrated, clamped, then tested against
    /// the coin. A pickup respawns the coin immediately, so players processed
    /// later in the same tick test against the new position and may pick it
    /// up again.
    pub fn tick(&mut self, dt: f64) -> Vec<Pickup> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let Game {
            config,
            bounds,
            players,
            coin,
            rng,
            ..
        } = self;
        let mut pickups = Vec::new();

        for player in players.values_mut() {
            let x = player.x + player.vx * dt;
            let y = player.y + player.vy * dt;
            (player.x, player.y) = bounds.clamp(x, y, player.radius);

            if coin.touches(player.x, player.y, player.radius) {
                player.score += 1;
                *coin = Coin::spawn(bounds, config.coin_radius, &mut *rng);
                pickups.push(Pickup {
                    player_id: player.id,
                    session_id: player.session_id.clone(),
                    name: player.name.clone(),
                    score: player.score,
                });
            }
        }

        self.tick_count += 1;
        pickups
    }

    /// Full snapshot for the per-tick `state` broadcast. Positions are rounded.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            players: self
                .players
                .values()
                .map(|p| PlayerState {
                    id: p.id,
                    x: p.x.round() as i64,
                    y: p.y.round() as i64,
                    name: p.name.clone(),
                    score: p.score,
                })
                .collect(),
            collectible: self.coin,
        }
    }
}
