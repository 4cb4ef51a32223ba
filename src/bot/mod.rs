//! Bot driver: a minimal coding interface for bots over the realtime socket.
//!
//! [`Driver`] logs in and joins rooms, aggregates messages from the bot's
//! rooms into one filtered stream, and wraps the common room and message
//! methods. Room lookups go through a [`MethodCache`].

pub mod cache;
pub mod config;
pub mod driver;

pub use cache::{CacheOptions, MethodCache};
pub use config::DriverConfig;
pub use driver::{Content, Driver, MessageCallback, MessageFilters, Outgoing};
