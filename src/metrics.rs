// Prometheus metrics definitions for the coinrush backend.

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Live WebSocket connections (joined or not).
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("coinrush_connected_websockets", "Live WebSocket connections").unwrap();

    /// Players currently in the world.
    pub static ref LIVE_PLAYERS: IntGauge =
        IntGauge::new("coinrush_live_players", "Players currently in the world").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total simulation ticks run.
    pub static ref TICKS_TOTAL: IntCounter =
        IntCounter::new("coinrush_ticks_total", "Total simulation ticks").unwrap();

    /// Ticks that panicked and were skipped.
    pub static ref TICK_PANICS_TOTAL: IntCounter =
        IntCounter::new("coinrush_tick_panics_total", "Ticks that panicked").unwrap();

    /// Total coin pickups.
    pub static ref PICKUPS_TOTAL: IntCounter =
        IntCounter::new("coinrush_pickups_total", "Total coin pickups").unwrap();

    /// Persistence jobs written successfully.
    pub static ref PERSIST_JOBS_WRITTEN_TOTAL: IntCounter = IntCounter::new(
        "coinrush_persist_jobs_written_total",
        "Persistence jobs written",
    )
    .unwrap();

    /// Persistence jobs the store rejected.
    pub static ref PERSIST_JOBS_FAILED_TOTAL: IntCounter = IntCounter::new(
        "coinrush_persist_jobs_failed_total",
        "Persistence jobs that failed",
    )
    .unwrap();

    /// Persistence jobs dropped before reaching the worker (queue full or closed).
    pub static ref PERSIST_JOBS_DROPPED_TOTAL: IntCounter = IntCounter::new(
        "coinrush_persist_jobs_dropped_total",
        "Persistence jobs dropped at enqueue",
    )
    .unwrap();

    /// Leaderboards broadcast.
    pub static ref LEADERBOARD_BROADCASTS_TOTAL: IntCounter = IntCounter::new(
        "coinrush_leaderboard_broadcasts_total",
        "Leaderboards broadcast",
    )
    .unwrap();

    /// Leaderboard queries that failed.
    pub static ref LEADERBOARD_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "coinrush_leaderboard_failures_total",
        "Leaderboard queries that failed",
    )
    .unwrap();

    /// Total WebSocket messages sent to clients.
    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "coinrush_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    /// Client frames that could not be decoded.
    pub static ref PROTOCOL_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "coinrush_protocol_errors_total",
        "Client frames rejected as malformed",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Per-tick processing time in milliseconds.
    pub static ref TICK_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("coinrush_tick_duration_ms", "Per-tick processing time in ms")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(LIVE_PLAYERS.clone()),
        Box::new(TICKS_TOTAL.clone()),
        Box::new(TICK_PANICS_TOTAL.clone()),
        Box::new(PICKUPS_TOTAL.clone()),
        Box::new(PERSIST_JOBS_WRITTEN_TOTAL.clone()),
        Box::new(PERSIST_JOBS_FAILED_TOTAL.clone()),
        Box::new(PERSIST_JOBS_DROPPED_TOTAL.clone()),
        Box::new(LEADERBOARD_BROADCASTS_TOTAL.clone()),
        Box::new(LEADERBOARD_FAILURES_TOTAL.clone()),
        Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
        Box::new(PROTOCOL_ERRORS_TOTAL.clone()),
        Box::new(TICK_DURATION_MS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
