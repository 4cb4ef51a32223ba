use super::handlers::{EventCallback, HandlerTable};
use super::subscription::{Subscription, SubscriptionInfo, SubscriptionRecord};
use super::transport::{self, CloseCallback, MessageCallback, NORMAL_CLOSURE};
use crate::auth::Credentials;
use crate::config::SocketOptions;
use crate::error::{ConnectorError, Result};
use crate::types::{LoginResult, SessionUser};
use futures_util::future::join_all;
use log::*;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;

/// Transport state of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// Authentication state of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

struct Connection {
    tx: mpsc::Sender<Message>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
    liveness: Option<JoinHandle<()>>,
    ping: Option<JoinHandle<()>>,
}

impl Timers {
    fn stop(&mut self) {
        if let Some(handle) = self.liveness.take() {
            handle.abort();
        }
        if let Some(handle) = self.ping.take() {
            handle.abort();
        }
    }
}

/// Drops the reply entry of a request whose caller stopped waiting.
struct PendingGuard<'a> {
    socket: &'a Socket,
    key: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.socket.handlers().cancel(self.key);
    }
}

struct SocketState {
    connection: Option<Connection>,
    connection_state: ConnectionState,
    /// Incremented on every open; stale transport events are ignored.
    generation: u64,
    /// An intentional disconnect is in progress or done.
    closing: bool,
    /// `close()` was called; pending reopens are abandoned.
    closed_by_user: bool,
    session: Option<String>,
    last_pong: Option<Instant>,
    timers: Timers,
    subscriptions: Vec<SubscriptionRecord>,
    next_subscription: u64,
    session_state: SessionState,
    credentials: Option<Credentials>,
    resume: Option<LoginResult>,
    user: Option<SessionUser>,
}

impl SocketState {
    fn alive(&self, ping: Duration) -> bool {
        self.last_pong
            .map_or(false, |last| last.elapsed() <= ping * 2)
    }
}

struct SocketInner {
    options: SocketOptions,
    url: String,
    sent: AtomicU64,
    reopening: AtomicBool,
    state: Mutex<SocketState>,
    handlers: Mutex<HandlerTable>,
}

impl Drop for SocketInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.timers.stop();
        if let Some(connection) = state.connection.take() {
            debug!(
                "[socket:{}] Socket dropped, closing connection to {}",
                self.options.integration, self.url
            );
            connection.task.abort();
        }
    }
}

/// Realtime (DDP) websocket client.
///
/// Sends request messages to the host, binding their responses to async
/// resolution, and manages subscriptions, login and reconnection. Cloning
/// is cheap and clones share the same connection.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    pub fn new(options: SocketOptions) -> Self {
        Socket::with_resume(options, None)
    }

    /// Socket configured from `RC_*` environment variables.
    pub fn from_env() -> Self {
        Socket::new(SocketOptions::from_env())
    }

    /// Socket that logs in with the given token as soon as it opens.
    pub fn with_resume(options: SocketOptions, resume: Option<LoginResult>) -> Self {
        let url = options.ws_url();
        let state = SocketState {
            connection: None,
            connection_state: ConnectionState::Closed,
            generation: 0,
            closing: false,
            closed_by_user: false,
            session: None,
            last_pong: None,
            timers: Timers::default(),
            subscriptions: Vec::new(),
            next_subscription: 0,
            session_state: SessionState::LoggedOut,
            credentials: None,
            resume,
            user: None,
        };
        Socket {
            inner: Arc::new(SocketInner {
                options,
                url,
                sent: AtomicU64::new(0),
                reopening: AtomicBool::new(false),
                state: Mutex::new(state),
                handlers: Mutex::new(HandlerTable::default()),
            }),
        }
    }

    fn from_weak(weak: &Weak<SocketInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Socket { inner })
    }

    fn state(&self) -> MutexGuard<'_, SocketState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> MutexGuard<'_, HandlerTable> {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // --- Accessors ---

    /// Integration name prefixed to lifecycle log lines.
    pub fn integration(&self) -> &str {
        &self.inner.options.integration
    }

    pub fn options(&self) -> &SocketOptions {
        &self.inner.options
    }

    /// Websocket URL the socket connects to.
    pub fn host(&self) -> &str {
        &self.inner.url
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state().connection_state
    }

    /// Session ID assigned by the server on handshake.
    pub fn session(&self) -> Option<String> {
        self.state().session.clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.state().session_state
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.state().user.clone()
    }

    /// Result of the last successful login, used to resume after reconnects.
    pub fn resume(&self) -> Option<LoginResult> {
        self.state().resume.clone()
    }

    /// Number of requests sent since the socket was created.
    pub fn sent(&self) -> u64 {
        self.inner.sent.load(Ordering::SeqCst)
    }

    pub fn is_reopening(&self) -> bool {
        self.inner.reopening.load(Ordering::SeqCst)
    }

    /// True when a pong arrived within two ping intervals.
    pub fn alive(&self) -> bool {
        self.state().alive(self.inner.options.ping)
    }

    /// True when the websocket is open, handshaken and alive.
    pub fn connected(&self) -> bool {
        let state = self.state();
        state.connection.is_some()
            && state.connection_state == ConnectionState::Open
            && state.alive(self.inner.options.ping)
    }

    /// True when connected and holding a resume token.
    pub fn logged_in(&self) -> bool {
        let state = self.state();
        state.connection.is_some()
            && state.connection_state == ConnectionState::Open
            && state.alive(self.inner.options.ping)
            && state.resume.is_some()
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.state()
            .subscriptions
            .iter()
            .map(SubscriptionInfo::from)
            .collect()
    }

    /// Requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.handlers().pending_len()
    }

    // --- Connection ---

    /// Opens the websocket and performs the handshake, resuming the login
    /// when a token is held. Resolves immediately when already connected.
    pub async fn open(&self) -> Result<()> {
        self.state().closed_by_user = false;
        self.connect().await
    }

    async fn connect(&self) -> Result<()> {
        if self.connected() {
            return Ok(());
        }
        self.disconnect().await;

        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.connection_state = ConnectionState::Connecting;
            state.closing = false;
            state.last_pong = Some(Instant::now());
            state.timers.liveness = Some(self.spawn_liveness_check());
            state.generation
        };

        let on_message: MessageCallback = {
            let weak = Arc::downgrade(&self.inner);
            Arc::new(move |text: String| {
                if let Some(socket) = Socket::from_weak(&weak) {
                    socket.on_message(&text);
                }
            })
        };
        let on_close: CloseCallback = {
            let weak = Arc::downgrade(&self.inner);
            Arc::new(move |code: Option<u16>| {
                if let Some(socket) = Socket::from_weak(&weak) {
                    socket.on_close(generation, code);
                }
            })
        };

        let (task, tx) =
            match transport::connect_managed(&self.inner.url, on_message, on_close).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(
                        "[socket:{}] Unable to open {}: {}",
                        self.integration(),
                        self.inner.url,
                        e
                    );
                    let mut state = self.state();
                    if state.generation == generation {
                        state.connection_state = ConnectionState::Closed;
                        state.timers.stop();
                    }
                    return Err(e);
                }
            };

        {
            let mut state = self.state();
            if state.generation != generation {
                task.abort();
                return Err(ConnectorError::ConnectionClosed);
            }
            state.connection = Some(Connection { tx, task });
        }

        let handshake = self.send(
            json!({ "msg": "connect", "version": "1", "support": ["1", "pre2", "pre1"] }),
            Some("connected"),
            None,
        );
        let connected = match timeout(self.inner.options.reopen, handshake).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                self.disconnect().await;
                return Err(e);
            }
            Err(_) => {
                self.disconnect().await;
                return Err(ConnectorError::Timeout("connected".to_string()));
            }
        };

        {
            let mut state = self.state();
            state.session = connected
                .get("session")
                .and_then(Value::as_str)
                .map(str::to_string);
            state.connection_state = ConnectionState::Open;
            state.last_pong = Some(Instant::now());
            state.timers.ping = Some(self.spawn_ping_loop());
        }
        info!("[socket:{}] Connected to {}", self.integration(), self.inner.url);

        let resume = self.state().resume.clone();
        if let Some(resume) = resume {
            match self.authenticate(Credentials::from(&resume)).await {
                Ok(_) => return Ok(()),
                // Rejected tokens are already cleared; the socket stays open logged out
                Err(e @ ConnectorError::DdpError(_)) if self.state().resume.is_none() => {
                    warn!(
                        "[socket:{}] Resume rejected, continuing without login: {}",
                        self.integration(),
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        let stale = self
            .state()
            .subscriptions
            .iter()
            .any(|s| s.generation != generation);
        if stale {
            self.subscribe_all().await?;
        }
        Ok(())
    }

    /// Unsubscribes everything, then closes the websocket with a normal
    /// closure and waits for the acknowledgment.
    pub async fn close(&self) {
        self.state().closed_by_user = true;
        if self.connected() {
            if let Err(e) = self.unsubscribe_all().await {
                warn!("[socket] Unsubscribe on close failed: {}", e);
            }
        }
        self.disconnect().await;
    }

    /// Closes the transport, keeping subscriptions for a later replay.
    async fn disconnect(&self) {
        let connection = {
            let mut state = self.state();
            state.timers.stop();
            state.closing = true;
            state.connection_state = ConnectionState::Closed;
            state.session = None;
            state.last_pong = None;
            state.connection.take()
        };
        if let Some(Connection { tx, mut task }) = connection {
            let _ = tx.send(transport::normal_close()).await;
            drop(tx);
            if timeout(self.inner.options.close, &mut task).await.is_err() {
                warn!(
                    "[socket:{}] Close was not acknowledged, dropping connection",
                    self.integration()
                );
                task.abort();
            }
        }
        self.reject_pending();
    }

    /// Closes, then opens again after the reopen delay. Calls made while a
    /// reopen is scheduled are ignored. Must be called within a Tokio runtime.
    pub fn reopen(&self, reason: Option<&str>) {
        if let Some(reason) = reason {
            debug!("[socket] Reopen due to {}", reason);
        }
        if self.inner.reopening.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.options.reopen;
        let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            match Socket::from_weak(&weak) {
                Some(socket) => socket.disconnect().await,
                None => return,
            }
            sleep(delay).await;
            let Some(socket) = Socket::from_weak(&weak) else {
                return;
            };
            socket.inner.reopening.store(false, Ordering::SeqCst);
            if socket.state().closed_by_user {
                debug!("[socket] Reopen abandoned, socket was closed");
                return;
            }
            if let Err(e) = socket.connect().await {
                error!("[socket:{}] Reopen error: {}", socket.integration(), e);
                socket.reopen(Some("reopen failed"));
            }
        });
        tokio::spawn(task);
    }

    fn spawn_liveness_check(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.options.reopen.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(socket) = Socket::from_weak(&weak) else {
                    break;
                };
                if socket.connection_state() == ConnectionState::Open && !socket.alive() {
                    socket.reopen(Some("missed pong"));
                }
            }
        })
    }

    fn spawn_ping_loop(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let every = self.inner.options.ping;
        tokio::spawn(async move {
            loop {
                sleep(every).await;
                let Some(socket) = Socket::from_weak(&weak) else {
                    break;
                };
                let ping = socket.send(json!({ "msg": "ping" }), Some("pong"), None);
                match timeout(every * 2, ping).await {
                    Ok(Ok(_)) => socket.state().last_pong = Some(Instant::now()),
                    Ok(Err(e)) => {
                        warn!("[socket:{}] Unable to ping server: {}", socket.integration(), e);
                        socket.reopen(Some("ping failed"));
                        break;
                    }
                    Err(_) => {
                        warn!("[socket:{}] Ping timed out", socket.integration());
                        socket.reopen(Some("ping timeout"));
                        break;
                    }
                }
            }
        })
    }

    fn on_close(&self, generation: u64, code: Option<u16>) {
        let intentional = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.connection = None;
            state.connection_state = ConnectionState::Closed;
            state.session = None;
            state.timers.stop();
            state.closing || state.closed_by_user
        };
        self.reject_pending();
        if intentional || code == Some(NORMAL_CLOSURE) {
            debug!("[socket] Connection closed");
            return;
        }
        warn!(
            "[socket:{}] Connection closed unexpectedly (code {:?})",
            self.integration(),
            code
        );
        self.reopen(Some("unexpected close"));
    }

    fn reject_pending(&self) {
        let replies = self.handlers().drain_pending();
        for reply in replies {
            let _ = reply.send(Err(ConnectorError::ConnectionClosed));
        }
    }

    // --- Messages ---

    /// Finds and runs the handlers matching an inbound frame.
    fn on_message(&self, text: &str) {
        let data: Value = match serde_json::from_str(text) {
            Ok(data) => data,
            Err(e) => {
                error!("[socket] JSON parse error: {}", e);
                return;
            }
        };
        if data.get("msg").and_then(Value::as_str) == Some("ping") {
            self.reply_pong(&data);
        }
        let deliveries = self.handlers().match_frame(&data);
        for delivery in deliveries {
            delivery.run(&data);
        }
    }

    fn reply_pong(&self, ping: &Value) {
        let mut pong = json!({ "msg": "pong" });
        if let Some(id) = ping.get("id") {
            pong["id"] = id.clone();
        }
        let tx = self.state().connection.as_ref().map(|c| c.tx.clone());
        if let Some(tx) = tx {
            if tx.try_send(Message::Text(pong.to_string())).is_err() {
                warn!("[socket] Unable to answer server ping");
            }
        }
    }

    /// Sends an object to the server, resolving with the reply of type
    /// `expect` for the same ID (or any reply of that type when the server
    /// omits the ID). A reply with an `error` attribute, or one of type
    /// `expect_error`, rejects. With `expect = None` nothing is awaited.
    /// Dropping the future before the reply arrives discards the request.
    pub async fn send(
        &self,
        payload: Value,
        expect: Option<&str>,
        expect_error: Option<&str>,
    ) -> Result<Value> {
        let Value::Object(mut frame) = payload else {
            return Err(ConnectorError::WebsocketError(
                "payload must be a JSON object".to_string(),
            ));
        };
        let count = self.inner.sent.fetch_add(1, Ordering::SeqCst) + 1;
        let id = match frame.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = format!("ddp-{}", count);
                frame.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let text = serde_json::to_string(&frame)?;

        let tx = self
            .state()
            .connection
            .as_ref()
            .map(|c| c.tx.clone())
            .ok_or(ConnectorError::NotConnected)?;

        let Some(msg) = expect else {
            tx.send(Message::Text(text))
                .await
                .map_err(|_| ConnectorError::ConnectionClosed)?;
            return Ok(Value::Null);
        };
        let (key, rx) = self.handlers().expect(&id, msg, expect_error);
        let _pending = PendingGuard { socket: self, key };
        tx.send(Message::Text(text))
            .await
            .map_err(|_| ConnectorError::ConnectionClosed)?;
        rx.await.unwrap_or(Err(ConnectorError::ConnectionClosed))
    }

    /// Calls a server method, resolving with its `result` (`Null` when the
    /// method returns nothing).
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let response = self
            .send(
                json!({ "msg": "method", "method": method, "params": params }),
                Some("result"),
                None,
            )
            .await
            .map_err(|e| {
                error!("[socket] Call {} error: {}", method, e);
                e
            })?;
        if response.get("result").is_some()
            || response.get("msg").and_then(Value::as_str) == Some("result")
        {
            Ok(response.get("result").cloned().unwrap_or(Value::Null))
        } else {
            Ok(response)
        }
    }

    // --- Session ---

    /// Logs in (opening the socket if needed) and replays subscriptions.
    ///
    /// Without credentials the configured username and password are used.
    /// Logging in again with the same credentials returns the current
    /// session; different credentials log the current user out first.
    pub async fn login(&self, credentials: Option<Credentials>) -> Result<LoginResult> {
        if !self.connected() {
            self.open().await?;
        }
        let credentials = credentials
            .unwrap_or_else(|| {
                Credentials::basic(
                    self.inner.options.username.clone(),
                    self.inner.options.password.clone(),
                )
            })
            .normalize();

        let logged_in = self.logged_in();
        let (cached, switching) = {
            let state = self.state();
            match (&state.credentials, &state.resume) {
                (Some(current), Some(resume)) if logged_in && *current == credentials => {
                    (Some(resume.clone()), false)
                }
                _ => (None, logged_in),
            }
        };
        if let Some(resume) = cached {
            debug!("[socket] Already logged in as {}", resume.id);
            return Ok(resume);
        }
        if switching {
            info!("[socket] Logging out previous user before login");
            self.logout().await?;
        }
        self.authenticate(credentials).await
    }

    async fn authenticate(&self, credentials: Credentials) -> Result<LoginResult> {
        self.state().session_state = SessionState::LoggingIn;
        let outcome = match self.call("login", vec![credentials.to_login_params()]).await {
            Ok(value) => serde_json::from_value::<LoginResult>(value).map_err(ConnectorError::from),
            Err(e) => Err(e),
        };
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!("[socket:{}] Login failed: {}", self.integration(), e);
                let mut state = self.state();
                state.session_state = SessionState::LoggedOut;
                state.resume = None;
                state.credentials = None;
                state.user = None;
                return Err(e);
            }
        };

        {
            let mut state = self.state();
            // A resume keeps the identity of the login it continues
            let resumed = matches!(credentials, Credentials::Resume { .. })
                && state.user.as_ref().map(|u| u.id.as_str()) == Some(result.id.as_str())
                && state.credentials.is_some();
            if !resumed {
                state.user = Some(SessionUser {
                    id: result.id.clone(),
                    username: credentials.username().map(str::to_string),
                });
                state.credentials = Some(credentials);
            }
            state.resume = Some(result.clone());
            state.session_state = SessionState::LoggedIn;
        }
        info!("[socket:{}] Logged in with ID {}", self.integration(), result.id);

        self.subscribe_all().await?;
        Ok(result)
    }

    /// Unsubscribes everything, logs out on the server and clears the session.
    pub async fn logout(&self) -> Result<()> {
        let outcome = async {
            self.unsubscribe_all().await?;
            if self.connected() {
                self.call("logout", vec![]).await?;
            }
            Ok::<(), ConnectorError>(())
        }
        .await;
        let mut state = self.state();
        state.resume = None;
        state.credentials = None;
        state.user = None;
        state.session_state = SessionState::LoggedOut;
        outcome
    }

    // --- Subscriptions ---

    /// Subscribes to a stream, resolving once the server reports it ready.
    /// The optional callback receives every event on the stream.
    pub async fn subscribe(
        &self,
        name: &str,
        params: Vec<Value>,
        callback: Option<EventCallback>,
    ) -> Result<Subscription> {
        info!(
            "[socket] Subscribe to {}, params: {}",
            name,
            Value::from(params.clone())
        );
        let id = self.request_subscription(name, &params).await?;
        let key = {
            let mut state = self.state();
            state.next_subscription += 1;
            let key = state.next_subscription;
            let generation = state.generation;
            state.subscriptions.push(SubscriptionRecord {
                key,
                id: id.clone(),
                name: name.to_string(),
                params: params.clone(),
                generation,
            });
            key
        };
        if let Some(callback) = callback {
            let _ = self.listen(key, name, callback);
        }
        Ok(Subscription::new(
            self.clone(),
            key,
            id,
            name.to_string(),
            params,
        ))
    }

    async fn request_subscription(&self, name: &str, params: &[Value]) -> Result<String> {
        let ready = self
            .send(
                json!({ "msg": "sub", "name": name, "params": params }),
                Some("ready"),
                None,
            )
            .await
            .map_err(|e| {
                error!("[socket] Subscribe error: {}", e);
                e
            })?;
        ready
            .get("subs")
            .and_then(|subs| subs.get(0))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ConnectorError::WebsocketError("ready reply without subscription ID".to_string())
            })
    }

    /// Adds a listener for events on `collection`, bound to subscription `id`.
    pub fn on_event(&self, id: &str, collection: &str, callback: EventCallback) -> Result<()> {
        let key = self
            .state()
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.key)
            .ok_or_else(|| ConnectorError::UnknownSubscription(id.to_string()))?;
        if self.listen(key, collection, callback) {
            Ok(())
        } else {
            Err(ConnectorError::UnknownSubscription(id.to_string()))
        }
    }

    /// Adds a listener while the subscription is still tracked. Returns
    /// false when it was removed.
    pub(crate) fn listen(&self, key: u64, collection: &str, callback: EventCallback) -> bool {
        let state = self.state();
        if !state.subscriptions.iter().any(|s| s.key == key) {
            return false;
        }
        self.handlers().listen(key, collection, callback);
        true
    }

    pub(crate) fn subscription_id(&self, key: u64) -> Option<String> {
        self.state()
            .subscriptions
            .iter()
            .find(|s| s.key == key)
            .map(|s| s.id.clone())
    }

    /// Stops a subscription. Unknown IDs are ignored, and a `nosub` reply
    /// (already gone on the server) counts as success.
    pub async fn unsubscribe(&self, id: &str) -> Result<()> {
        let (record, generation) = {
            let mut state = self.state();
            let position = state.subscriptions.iter().position(|s| s.id == id);
            (
                position.map(|p| state.subscriptions.remove(p)),
                state.generation,
            )
        };
        let Some(record) = record else {
            return Ok(());
        };
        self.handlers().remove_listeners(record.key);

        let live = self.state().connection.is_some() && record.generation == generation;
        if !live {
            return Ok(());
        }
        match self
            .send(json!({ "msg": "unsub", "id": id }), Some("result"), Some("nosub"))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_rejected_with("nosub") => Ok(()),
            Err(e) => {
                error!("[socket] Unsubscribe error: {}", e);
                Err(e)
            }
        }
    }

    /// Unsubscribes from all active subscriptions and resets the registry.
    pub async fn unsubscribe_all(&self) -> Result<()> {
        let ids: Vec<String> = self
            .state()
            .subscriptions
            .iter()
            .map(|s| s.id.clone())
            .collect();
        let results = join_all(ids.iter().map(|id| self.unsubscribe(id))).await;

        let leftover: Vec<SubscriptionRecord> = self.state().subscriptions.drain(..).collect();
        if !leftover.is_empty() {
            let mut handlers = self.handlers();
            for record in &leftover {
                handlers.remove_listeners(record.key);
            }
        }
        results.into_iter().collect()
    }

    /// Subscribes again to every tracked stream under a new server ID, e.g.
    /// after a reconnect or login. Listeners carry over to the new ID.
    pub async fn subscribe_all(&self) -> Result<Vec<Subscription>> {
        let (keys, generation) = {
            let state = self.state();
            let keys: Vec<(u64, bool)> = state
                .subscriptions
                .iter()
                .map(|s| (s.key, s.generation == state.generation))
                .collect();
            (keys, state.generation)
        };
        if !keys.is_empty() {
            info!("[socket] Resubscribing to {} streams", keys.len());
        }
        let results = join_all(
            keys.into_iter()
                .map(|(key, live)| self.resubscribe(key, live, generation)),
        )
        .await;
        results.into_iter().collect()
    }

    async fn resubscribe(&self, key: u64, live: bool, generation: u64) -> Result<Subscription> {
        let record = self
            .state()
            .subscriptions
            .iter()
            .find(|s| s.key == key)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownSubscription(key.to_string()))?;

        if live {
            let unsub = json!({ "msg": "unsub", "id": record.id });
            if let Err(e) = self.send(unsub, Some("result"), Some("nosub")).await {
                if !e.is_rejected_with("nosub") {
                    debug!("[socket] Replaced subscription {} was not removed: {}", record.id, e);
                }
            }
        }

        match self.request_subscription(&record.name, &record.params).await {
            Ok(id) => {
                let mut state = self.state();
                if let Some(entry) = state.subscriptions.iter_mut().find(|s| s.key == key) {
                    entry.id = id.clone();
                    entry.generation = generation;
                }
                Ok(Subscription::new(
                    self.clone(),
                    key,
                    id,
                    record.name,
                    record.params,
                ))
            }
            Err(e) => {
                self.state().subscriptions.retain(|s| s.key != key);
                self.handlers().remove_listeners(key);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}
