use super::client::Socket;
use super::handlers::EventCallback;
use crate::error::{ConnectorError, Result};
use serde_json::Value;
use std::fmt;

/// Registry entry for a live server-side stream registration.
///
/// `key` is local and never changes; `id` is assigned by the server and is
/// replaced every time the subscription is replayed on a new connection.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionRecord {
    pub(crate) key: u64,
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) params: Vec<Value>,
    /// Connection generation the current `id` belongs to.
    pub(crate) generation: u64,
}

/// Snapshot of a tracked subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    pub id: String,
    pub name: String,
    pub params: Vec<Value>,
}

impl From<&SubscriptionRecord> for SubscriptionInfo {
    fn from(record: &SubscriptionRecord) -> Self {
        SubscriptionInfo {
            id: record.id.clone(),
            name: record.name.clone(),
            params: record.params.clone(),
        }
    }
}

/// Handle returned by [`Socket::subscribe`].
#[derive(Clone)]
pub struct Subscription {
    socket: Socket,
    key: u64,
    /// Server-assigned ID at the time of subscribing.
    pub id: String,
    /// Stream name, also the collection its events arrive on.
    pub name: String,
    pub params: Vec<Value>,
}

impl Subscription {
    pub(crate) fn new(socket: Socket, key: u64, id: String, name: String, params: Vec<Value>) -> Self {
        Subscription {
            socket,
            key,
            id,
            name,
            params,
        }
    }

    /// ID currently registered with the server, which differs from `id`
    /// after a reconnect. `None` once unsubscribed.
    pub fn current_id(&self) -> Option<String> {
        self.socket.subscription_id(self.key)
    }

    pub fn is_active(&self) -> bool {
        self.current_id().is_some()
    }

    /// Adds a listener for events on this subscription's stream. Listeners
    /// stay attached across reconnects until the subscription is removed.
    /// Fails with `UnknownSubscription` once unsubscribed.
    pub fn on_event(&self, callback: EventCallback) -> Result<()> {
        if self.socket.listen(self.key, &self.name, callback) {
            Ok(())
        } else {
            Err(ConnectorError::UnknownSubscription(self.id.clone()))
        }
    }

    pub async fn unsubscribe(&self) -> Result<()> {
        match self.current_id() {
            Some(id) => self.socket.unsubscribe(&id).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}
