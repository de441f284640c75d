pub mod cli;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod gatekeeper;
pub mod middleware;
