use rand::Rng;
use serde::Serialize;

use super::config::COIN_SPAWN_MARGIN;

/// The rectangular movement area. Serialized as `{w, h}` in the `joined` reply.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WorldBounds {
    pub w: f64,
    pub h: f64,
}

impl WorldBounds {
    pub fn new(w: f64, h: f64) -> Self {
        Self { w, h }
    }

    /// Clamp a circle's center so the whole circle stays inside the bounds.
    /// If the circle is wider than the world, it is pinned to the low edge.
    pub fn clamp(&self, x: f64, y: f64, radius: f64) -> (f64, f64) {
        (
            clamp_axis(x, radius, self.w - radius),
            clamp_axis(y, radius, self.h - radius),
        )
    }

    /// Uniformly random point with at least `margin` clearance from every edge.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R, margin: f64) -> (f64, f64) {
        (
            random_axis(rng, margin, self.w - margin),
            random_axis(rng, margin, self.h - margin),
        )
    }

    #[cfg(test)]
    pub fn contains_circle(&self, x: f64, y: f64, radius: f64) -> bool {
        x >= radius && x <= self.w - radius && y >= radius && y <= self.h - radius
    }
}

fn clamp_axis(v: f64, lo: f64, hi: f64) -> f64 {
    if hi < lo {
        return lo;
    }
    v.max(lo).min(hi)
}

fn random_axis<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    // Also catches NaN and infinite bounds, which `gen_range` panics on.
    if !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return lo;
    }
    rng.gen_range(lo..=hi)
}

/// The single shared pickup.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Coin {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl Coin {
    /// Place a coin at a random position inside the spawn margin.
    pub fn spawn<R: Rng + ?Sized>(bounds: &WorldBounds, radius: f64, rng: &mut R) -> Self {
        let (x, y) = bounds.random_point(rng, COIN_SPAWN_MARGIN);
        Coin { x, y, radius }
    }

    /// Whether a circle at `(x, y)` with `radius` strictly overlaps the coin.
    pub fn touches(&self, x: f64, y: f64, radius: f64) -> bool {
        let dx = x - self.x;
        let dy = y - self.y;
        (dx * dx + dy * dy).sqrt() < radius + self.radius
    }
}
