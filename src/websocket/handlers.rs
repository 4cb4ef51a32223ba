//! Dispatch table pairing inbound frames with the requests and stream
//! listeners waiting for them.

use crate::error::{ConnectorError, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Callback invoked for every event frame of a subscribed collection.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync + 'static>;

type Reply = oneshot::Sender<Result<Value>>;

/// One-shot entry for a request awaiting its reply.
struct Pending {
    key: u64,
    id: String,
    msg: String,
    error_msg: Option<String>,
    reply: Reply,
}

/// Persistent entry, bound to the local key of a subscription.
struct Listener {
    subscription: u64,
    collection: String,
    callback: EventCallback,
}

/// Work produced by matching a frame, run after the table lock is released.
pub(crate) enum Delivery {
    Event(EventCallback),
    Settle(Reply, Result<Value>),
}

impl Delivery {
    pub(crate) fn run(self, data: &Value) {
        match self {
            Delivery::Event(callback) => callback(data),
            Delivery::Settle(reply, outcome) => {
                // Receiver may have been dropped by an abandoned request
                let _ = reply.send(outcome);
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct HandlerTable {
    next_key: u64,
    pending: Vec<Pending>,
    listeners: Vec<Listener>,
}

impl HandlerTable {
    /// Registers a one-shot entry for `id`, resolved by a `msg` frame and
    /// rejected by an `error_msg` frame.
    pub(crate) fn expect(
        &mut self,
        id: &str,
        msg: &str,
        error_msg: Option<&str>,
    ) -> (u64, oneshot::Receiver<Result<Value>>) {
        self.next_key += 1;
        let (reply, rx) = oneshot::channel();
        self.pending.push(Pending {
            key: self.next_key,
            id: id.to_string(),
            msg: msg.to_string(),
            error_msg: error_msg.map(str::to_string),
            reply,
        });
        (self.next_key, rx)
    }

    /// Drops a one-shot entry whose request never made it onto the wire.
    pub(crate) fn cancel(&mut self, key: u64) {
        self.pending.retain(|p| p.key != key);
    }

    pub(crate) fn listen(&mut self, subscription: u64, collection: &str, callback: EventCallback) {
        self.listeners.push(Listener {
            subscription,
            collection: collection.to_string(),
            callback,
        });
    }

    pub(crate) fn remove_listeners(&mut self, subscription: u64) {
        self.listeners.retain(|l| l.subscription != subscription);
    }

    /// Collects every handler matching the frame. Matched one-shot entries
    /// are removed; listeners stay registered.
    pub(crate) fn match_frame(&mut self, data: &Value) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        if let Some(collection) = data.get("collection").and_then(Value::as_str) {
            deliveries.extend(
                self.listeners
                    .iter()
                    .filter(|l| l.collection == collection)
                    .map(|l| Delivery::Event(Arc::clone(&l.callback))),
            );
        }

        let Some(msg) = data.get("msg").and_then(Value::as_str) else {
            return deliveries;
        };
        // `ready` frames carry the request IDs in `subs` instead of `id`
        let frame_id = data.get("id").and_then(Value::as_str);
        let subs = data.get("subs").and_then(Value::as_array);
        let id_matches = |p: &Pending| match (frame_id, subs) {
            (Some(id), _) => id == p.id,
            (None, Some(subs)) => subs.iter().any(|s| s.as_str() == Some(p.id.as_str())),
            (None, None) => true,
        };

        let mut index = 0;
        while index < self.pending.len() {
            let pending = &self.pending[index];
            let outcome = if pending.msg == msg && id_matches(pending) {
                Some(match data.get("error") {
                    Some(error) => Err(ConnectorError::DdpError(error.clone())),
                    None => Ok(data.clone()),
                })
            } else if pending.error_msg.as_deref() == Some(msg) && id_matches(pending) {
                Some(Err(ConnectorError::Rejected {
                    msg: msg.to_string(),
                    data: data.clone(),
                }))
            } else {
                None
            };
            match outcome {
                Some(outcome) => {
                    let pending = self.pending.remove(index);
                    deliveries.push(Delivery::Settle(pending.reply, outcome));
                }
                None => index += 1,
            }
        }
        deliveries
    }

    /// Removes every one-shot entry, handing back their reply channels.
    pub(crate) fn drain_pending(&mut self) -> Vec<oneshot::Sender<Result<Value>>> {
        self.pending.drain(..).map(|p| p.reply).collect()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn listener_len(&self) -> usize {
        self.listeners.len()
    }
}
