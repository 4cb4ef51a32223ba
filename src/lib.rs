pub mod auth;
pub mod bot;
pub mod config;
pub mod error;
pub mod rest;
pub mod sims;
pub mod types;
pub mod websocket;
pub use error::{ConnectorError, Result};
