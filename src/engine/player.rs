use super::config::DEFAULT_PLAYER_NAME;

/// Transient per-connection identifier. Assigned in increasing order, so sorting
/// by it yields join order.
pub type ConnectionId = u64;

/// Directional intent as last reported by a client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputState {
    /// Velocity for this input: each held direction adds `speed` on its axis.
    ///
    /// The combined vector is not normalized, so diagonal movement is
    /// `speed * sqrt(2)` and opposing keys cancel out.
    pub fn velocity(&self, speed: f64) -> (f64, f64) {
        let mut vx = 0.0;
        let mut vy = 0.0;
        if self.left {
            vx -= speed;
        }
        if self.right {
            vx += speed;
        }
        if self.up {
            vy -= speed;
        }
        if self.down {
            vy += speed;
        }
        (vx, vy)
    }
}

/// A live player in the world, one per joined connection.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: ConnectionId,
    pub session_id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub score: i64,
}

impl Player {
    pub fn new(
        id: ConnectionId,
        session_id: String,
        name: String,
        x: f64,
        y: f64,
        radius: f64,
    ) -> Self {
        Self {
            id,
            session_id,
            name,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            radius,
            score: 0,
        }
    }

    pub fn apply_input(&mut self, input: &InputState, speed: f64) {
        let (vx, vy) = input.velocity(speed);
        self.vx = vx;
        self.vy = vy;
    }
}

/// Trim a requested display name and bound it to `max_len` characters.
/// Empty or missing names become the placeholder name.
pub fn sanitize_name(raw: Option<&str>, max_len: usize) -> String {
    let name: String = raw
        .map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(max_len)
        .collect();
    let name = name.trim_end();
    if name.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        name.to_string()
    }
}
