pub mod config;
pub mod game;
pub mod player;
pub mod protocol;
pub mod server;
pub mod session;
pub mod world;
