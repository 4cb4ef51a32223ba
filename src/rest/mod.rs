//! REST API client for Rocket.Chat's `/api/v1/` endpoints.
//!
//! Complements the realtime [`Socket`](crate::websocket::Socket) for
//! endpoints without a method equivalent, such as the user listing.

pub mod client;

pub use client::{Client, RestLogin, Users};
