//! Realtime (DDP) websocket client for Rocket.Chat servers.
//!
//! [`Socket`] maintains a single websocket connection to the host and
//! exposes request/response calls, stream subscriptions and login on top
//! of it.
//!
//! # Architecture
//!
//! - A transport layer spawns reader and writer tasks for the websocket and
//!   hands every inbound text frame to the socket, in arrival order.
//! - Every outbound request gets an ID (`ddp-N`) and a one-shot handler that
//!   is settled by the reply carrying the same ID.
//! - Subscriptions are tracked in a registry and replayed after reconnects
//!   and logins. Event listeners stay attached to the subscription, not to
//!   the server ID, so they keep firing after a replay.
//! - A ping loop and a liveness check reopen the connection when the server
//!   stops answering.
//!
//! # Usage
//!
//! ```no_run
//! use rocket_connector_rs::config::SocketOptions;
//! use rocket_connector_rs::websocket::Socket;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let socket = Socket::new(SocketOptions::default());
//!     socket.login(None).await.expect("Failed to login");
//!
//!     let subscription = socket
//!         .subscribe(
//!             "stream-room-messages",
//!             vec![json!("__my_messages__"), json!(true)],
//!             Some(Arc::new(|event: &Value| println!("Event: {}", event))),
//!         )
//!         .await
//!         .expect("Failed to subscribe");
//!     println!("Subscribed with ID {}", subscription.id);
//!
//!     tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
//!     socket.close().await;
//! }
//! ```
//!
//! # Error Handling
//!
//! Method errors reported by the server surface as
//! [`ConnectorError::DdpError`](crate::error::ConnectorError::DdpError)
//! carrying the server's error payload:
//!
//! ```no_run
//! use rocket_connector_rs::config::SocketOptions;
//! use rocket_connector_rs::websocket::Socket;
//! use rocket_connector_rs::ConnectorError;
//!
//! #[tokio::main]
//! async fn main() {
//!     let socket = Socket::new(SocketOptions::default());
//!     match socket.call("getRoomIdByNameOrId", vec!["GENERAL".into()]).await {
//!         Ok(id) => println!("Room ID: {}", id),
//!         Err(ConnectorError::DdpError(payload)) => eprintln!("Server said: {}", payload),
//!         Err(e) => eprintln!("Call failed: {}", e),
//!     }
//! }
//! ```
//!
//! # Reconnection Behavior
//!
//! - An unexpected close (any code other than 1000) schedules a reopen after
//!   the `reopen` delay. Only one reopen is scheduled at a time.
//! - A missed pong within two ping intervals also triggers a reopen.
//! - After reconnecting, a held login token is resumed and subscriptions are
//!   replayed under new IDs.
//! - Requests in flight when the connection drops fail with
//!   [`ConnectorError::ConnectionClosed`](crate::error::ConnectorError::ConnectionClosed).
//!
//! Event callbacks run on the reader task and should return quickly.

pub mod client;
pub mod handlers;
pub mod subscription;
pub mod transport;

pub use client::{ConnectionState, SessionState, Socket};
pub use handlers::EventCallback;
pub use subscription::{Subscription, SubscriptionInfo};
pub use transport::NORMAL_CLOSURE;
