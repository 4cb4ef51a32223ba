use super::cache::MethodCache;
use super::config::DriverConfig;
use crate::auth::Credentials;
use crate::error::{ConnectorError, Result};
use crate::types::{BotDetails, Message, MessageMeta, MessageReceipt, RoomType};
use crate::websocket::{EventCallback, Socket, Subscription};
use futures_util::future::join_all;
use log::{debug, error, info};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const ROOM_ID_METHOD: &str = "getRoomIdByNameOrId";
const ROOM_NAME_METHOD: &str = "getRoomNameById";
const DIRECT_MESSAGE_METHOD: &str = "createDirectMessage";

/// Receives each message that passes the filters, or an error for events
/// that carry no message.
pub type MessageCallback = Arc<dyn Fn(Result<(Message, MessageMeta)>) + Send + Sync + 'static>;

/// Overrides for the configured message source filters. `Some(true)`
/// ignores messages from that source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFilters {
    pub direct: Option<bool>,
    pub livechat: Option<bool>,
    pub edited: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ignore {
    direct: bool,
    livechat: bool,
    edited: bool,
}

/// Message content accepted by the send helpers.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Message(Message),
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Message> for Content {
    fn from(message: Message) -> Self {
        Content::Message(message)
    }
}

/// One or more messages to send to the same room.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing(pub Vec<Content>);

impl From<Content> for Outgoing {
    fn from(content: Content) -> Self {
        Outgoing(vec![content])
    }
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Outgoing(vec![Content::from(text)])
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Outgoing(vec![Content::Text(text)])
    }
}

impl From<Message> for Outgoing {
    fn from(message: Message) -> Self {
        Outgoing(vec![Content::Message(message)])
    }
}

impl From<Vec<String>> for Outgoing {
    fn from(texts: Vec<String>) -> Self {
        Outgoing(texts.into_iter().map(Content::Text).collect())
    }
}

impl From<Vec<&str>> for Outgoing {
    fn from(texts: Vec<&str>) -> Self {
        Outgoing(texts.into_iter().map(Content::from).collect())
    }
}

/// High-level bot interface over a [`Socket`]: login with room joins,
/// a filtered message stream, cached room lookups and message sends.
pub struct Driver {
    socket: Socket,
    config: DriverConfig,
    cache: MethodCache,
    subscription: tokio::sync::Mutex<Option<Subscription>>,
    /// IDs of rooms joined by the bot.
    joined: Mutex<Vec<String>>,
    uid: Arc<Mutex<Option<String>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Driver {
    pub fn new(socket: Socket, config: DriverConfig) -> Self {
        Driver {
            cache: MethodCache::new(Some(socket.clone())),
            socket,
            config,
            subscription: tokio::sync::Mutex::new(None),
            joined: Mutex::new(Vec::new()),
            uid: Arc::new(Mutex::new(None)),
        }
    }

    /// Driver with socket and bot settings from `RC_*` environment variables.
    pub fn from_env() -> Self {
        Driver::new(Socket::from_env(), DriverConfig::from_env())
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn cache(&self) -> &MethodCache {
        &self.cache
    }

    /// ID of the logged in bot user.
    pub fn uid(&self) -> Option<String> {
        locked(&self.uid).clone()
    }

    pub fn joined(&self) -> Vec<String> {
        locked(&self.joined).clone()
    }

    /// Logs in on the socket, then joins the configured rooms.
    pub async fn login(&self, credentials: Option<Credentials>) -> Result<String> {
        let result = self.socket.login(credentials).await?;
        *locked(&self.uid) = Some(result.id.clone());
        self.join_rooms(&self.config.join).await?;
        Ok(result.id)
    }

    /// Logs out on the socket, which also ends all subscriptions.
    pub async fn logout(&self) -> Result<()> {
        self.socket.logout().await?;
        *locked(&self.uid) = None;
        *self.subscription.lock().await = None;
        Ok(())
    }

    /// Sets up caches for room lookup results.
    pub fn setup_cache(&self) {
        debug!("[driver] Setting up method cache");
        self.cache.create(ROOM_ID_METHOD, Some(self.config.room_cache));
        self.cache.create(ROOM_NAME_METHOD, Some(self.config.room_cache));
        self.cache
            .create(DIRECT_MESSAGE_METHOD, Some(self.config.dm_cache));
    }

    /// Subscribes to the configured message stream, or the one given.
    pub async fn subscribe(&self, stream: Option<&str>, room: Option<&str>) -> Result<Subscription> {
        if self.uid().is_none() {
            return Err(ConnectorError::AuthenticationError(
                "Login required before subscription".to_string(),
            ));
        }
        let stream = stream.unwrap_or(&self.config.stream_name).to_string();
        let room = room.unwrap_or(&self.config.stream_room).to_string();
        let params = vec![json!(room), json!(true)];
        let callback: EventCallback = {
            let (stream, room) = (stream.clone(), room.clone());
            Arc::new(move |event: &Value| {
                debug!("[driver] {} event in {} collection: {}", stream, room, event);
            })
        };
        self.socket.subscribe(&stream, params, Some(callback)).await
    }

    /// Adds a callback to the aggregated message stream, subscribing first
    /// when needed. Messages sent by the bot itself are always skipped;
    /// direct, livechat and edited messages per the filters or config.
    pub async fn on_message(&self, callback: MessageCallback, filters: MessageFilters) -> Result<()> {
        let mut current = self.subscription.lock().await;
        let subscription = match current.as_ref() {
            Some(subscription) if subscription.is_active() => subscription.clone(),
            _ => {
                let subscription = self.subscribe(None, None).await?;
                *current = Some(subscription.clone());
                subscription
            }
        };
        drop(current);

        let ignore = Ignore {
            direct: filters.direct.unwrap_or(self.config.ignore_direct),
            livechat: filters.livechat.unwrap_or(self.config.ignore_livechat),
            edited: filters.edited.unwrap_or(self.config.ignore_edited),
        };
        let uid = Arc::clone(&self.uid);
        subscription.on_event(Arc::new(move |event: &Value| {
            let uid = locked(&uid).clone();
            if let Some(outcome) = filter_message(event, uid.as_deref(), ignore) {
                callback(outcome);
            }
        }))
    }

    /// Calls a server method on the socket.
    pub async fn async_call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        debug!(
            "[driver] Call {} (async): {}",
            method,
            Value::from(params.clone())
        );
        self.socket.call(method, params).await
    }

    /// Calls a method through its result cache, keyed by `key`.
    pub async fn cache_call(&self, method: &str, key: &str) -> Result<Value> {
        debug!("[driver] Returning cached result for {}({})", method, key);
        self.cache.call(method, key).await
    }

    /// Calls a method through the cache when one exists for it and the
    /// first parameter is a string key, or directly otherwise.
    pub async fn call_method(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let key = params
            .first()
            .and_then(Value::as_str)
            .filter(|_| self.cache.has(method))
            .map(str::to_string);
        let outcome = match key {
            Some(key) => self.cache_call(method, &key).await,
            None => self.async_call(method, params).await,
        };
        match &outcome {
            Ok(Value::Null) => debug!("[driver] Call {} success", method),
            Ok(result) => debug!("[driver] Call {} success: {}", method, result),
            Err(e) => error!("[driver] Call {} error: {}", method, e),
        }
        outcome
    }

    /// ID of a room, by name or ID.
    pub async fn get_room_id(&self, name: &str) -> Result<String> {
        let result = self.cache_call(ROOM_ID_METHOD, name).await?;
        expect_str(result, ROOM_ID_METHOD)
    }

    pub async fn get_room_name(&self, id: &str) -> Result<String> {
        let result = self.cache_call(ROOM_NAME_METHOD, id).await?;
        expect_str(result, ROOM_NAME_METHOD)
    }

    /// ID of the direct message room with a user, created when missing.
    pub async fn get_direct_message_room_id(&self, username: &str) -> Result<String> {
        let result = self.cache_call(DIRECT_MESSAGE_METHOD, username).await?;
        expect_str(result["rid"].clone(), DIRECT_MESSAGE_METHOD)
    }

    /// Joins a room by name or ID. Failure of the join itself is logged.
    pub async fn join_room(&self, room: &str) -> Result<()> {
        let room_id = self.get_room_id(room).await?;
        if locked(&self.joined).contains(&room_id) {
            error!("[driver] Join room failed, already joined {}", room_id);
            return Ok(());
        }
        if let Err(e) = self.async_call("joinRoom", vec![json!(room_id)]).await {
            error!("[driver] Join room failed, {}", e);
        }
        locked(&self.joined).push(room_id);
        Ok(())
    }

    /// Leaves a room by name or ID. Failure of the leave itself is logged.
    pub async fn leave_room(&self, room: &str) -> Result<()> {
        let room_id = self.get_room_id(room).await?;
        locked(&self.joined).retain(|id| *id != room_id);
        if let Err(e) = self.async_call("leaveRoom", vec![json!(room_id)]).await {
            error!("[driver] Leave room failed, {}", e);
        }
        Ok(())
    }

    pub async fn join_rooms(&self, rooms: &[String]) -> Result<()> {
        let results = join_all(rooms.iter().map(|room| self.join_room(room))).await;
        results.into_iter().collect()
    }

    /// Leaves the given rooms, or every joined room.
    pub async fn leave_rooms(&self, rooms: Option<&[String]>) -> Result<()> {
        let rooms = match rooms {
            Some(rooms) => rooms.to_vec(),
            None => self.joined(),
        };
        let results = join_all(rooms.iter().map(|room| self.leave_room(room))).await;
        results.into_iter().collect()
    }

    /// Structures message content tagged with the integration ID,
    /// optionally addressed to a room.
    pub fn prepare_message(&self, content: impl Into<Content>, room_id: Option<&str>) -> Message {
        let mut message = match content.into() {
            Content::Text(text) => Message::text(text, &self.config.integration_id),
            Content::Message(mut message) => {
                if message.bot.is_none() {
                    message.bot = Some(BotDetails {
                        i: self.config.integration_id.clone(),
                    });
                }
                message
            }
        };
        if let Some(room_id) = room_id {
            message.rid = Some(room_id.to_string());
        }
        message
    }

    /// Sends a prepared message, which must carry its room ID.
    pub async fn send_message(&self, message: &Message) -> Result<MessageReceipt> {
        if message.rid.is_none() {
            return Err(ConnectorError::ParameterRequiredError {
                param: "rid".to_string(),
            });
        }
        let result = self
            .async_call("sendMessage", vec![serde_json::to_value(message)?])
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Sends one or more messages to a room ID, returning a receipt for each.
    pub async fn send_to_room_id(
        &self,
        content: impl Into<Outgoing>,
        room_id: &str,
    ) -> Result<Vec<MessageReceipt>> {
        let messages: Vec<Message> = content
            .into()
            .0
            .into_iter()
            .map(|content| self.prepare_message(content, Some(room_id)))
            .collect();
        let results = join_all(messages.iter().map(|m| self.send_message(m))).await;
        results.into_iter().collect()
    }

    /// Sends to a room by name (or ID).
    pub async fn send_to_room(
        &self,
        content: impl Into<Outgoing>,
        room: &str,
    ) -> Result<Vec<MessageReceipt>> {
        let room_id = self.get_room_id(room).await?;
        self.send_to_room_id(content, &room_id).await
    }

    /// Sends to a user in a direct message room.
    pub async fn send_direct_to_user(
        &self,
        content: impl Into<Outgoing>,
        username: &str,
    ) -> Result<Vec<MessageReceipt>> {
        let room_id = self.get_direct_message_room_id(username).await?;
        self.send_to_room_id(content, &room_id).await
    }

    /// Edits an existing message, replacing the attributes given. The
    /// message must carry the ID of the message to edit.
    pub async fn edit_message(&self, message: &Message) -> Result<Value> {
        if message.id.is_none() {
            return Err(ConnectorError::ParameterRequiredError {
                param: "_id".to_string(),
            });
        }
        self.async_call("updateMessage", vec![serde_json::to_value(message)?])
            .await
    }

    /// Toggles a reaction such as `:thumbsup:` on a message.
    pub async fn set_reaction(&self, emoji: &str, message_id: &str) -> Result<Value> {
        self.async_call("setReaction", vec![json!(emoji), json!(message_id)])
            .await
    }
}

fn expect_str(value: Value, method: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ConnectorError::InvalidEvent(format!(
            "{} returned {}",
            method, other
        ))),
    }
}

/// Extracts the message and meta from a stream event. `None` when the
/// message is filtered out.
fn filter_message(
    event: &Value,
    uid: Option<&str>,
    ignore: Ignore,
) -> Option<Result<(Message, MessageMeta)>> {
    let args = &event["fields"]["args"];
    let message = serde_json::from_value::<Message>(args[0].clone())
        .ok()
        .filter(|m| m.id.is_some());
    let Some(message) = message else {
        return Some(Err(ConnectorError::InvalidEvent(
            "Message handler fired on event without message or meta data".to_string(),
        )));
    };
    let meta: MessageMeta = serde_json::from_value(args[1].clone()).unwrap_or_default();
    let message_id = message.id.as_deref().unwrap_or_default();

    let own = uid.is_some() && message.u.as_ref().map(|u| u.id.as_str()) == uid;
    let filtered = own
        || (meta.room_type == Some(RoomType::Direct) && ignore.direct)
        || (meta.room_type == Some(RoomType::Livechat) && ignore.livechat)
        || (message.edited_at.is_some() && ignore.edited);
    if filtered {
        debug!("[driver] Message {} ignored by filters", message_id);
        return None;
    }
    let username = message
        .u
        .as_ref()
        .map(|u| u.username.as_str())
        .unwrap_or("unknown");
    info!("[driver] Message {} received from {}", message_id, username);
    Some(Ok((message, meta)))
}
