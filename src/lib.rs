pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod leaderboard;
pub mod metrics;
pub mod persistence;
