// tests/common.rs
//
// In-process DDP server speaking enough of the Rocket.Chat realtime API to
// drive the socket, bot driver and sims tests.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use rocket_connector_rs::auth::hash_password;
use rocket_connector_rs::config::SocketOptions;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

static INIT: Once = Once::new();

pub fn setup_logger() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Socket options pointing at a mock server, with short timers.
pub fn options(addr: SocketAddr) -> SocketOptions {
    SocketOptions {
        host: addr.to_string(),
        ssl: false,
        reopen: Duration::from_millis(100),
        ping: Duration::from_millis(200),
        close: Duration::from_millis(500),
        integration: "rc-test".to_string(),
        username: "bot".to_string(),
        password: "pass".to_string(),
    }
}

/// Polls `check` until it holds or five seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[derive(Default)]
struct Data {
    /// username -> (id, password)
    users: HashMap<String, (String, String)>,
    /// room name -> room ID
    rooms: HashMap<String, String>,
    /// connection -> (user ID, username)
    sessions: HashMap<usize, (String, String)>,
    frames: Vec<Value>,
    calls: HashMap<String, usize>,
    pongs: Vec<Value>,
    next_message: usize,
}

#[derive(Default)]
struct ServerState {
    connections: AtomicUsize,
    unsubs: AtomicUsize,
    muted: AtomicBool,
    peers: Mutex<HashMap<usize, mpsc::UnboundedSender<Message>>>,
    data: Mutex<Data>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl MockServer {
    /// Starts a server knowing the users `bot` and `admin` (password `pass`)
    /// and the rooms `GENERAL` and `random`.
    pub async fn start() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        {
            let mut data = state.data.lock().unwrap();
            for username in ["bot", "admin"] {
                data.users.insert(
                    username.to_string(),
                    (format!("id-{}", username), "pass".to_string()),
                );
            }
            data.rooms.insert("GENERAL".to_string(), "GENERAL".to_string());
            data.rooms.insert("random".to_string(), "room-random".to_string());
        }
        let task = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(handle_connection(stream, Arc::clone(&state)));
                }
            }
        });
        MockServer { addr, state, task }
    }

    pub fn options(&self) -> SocketOptions {
        options(self.addr)
    }

    /// Number of websocket connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.state.peers.lock().unwrap().len()
    }

    pub fn unsubs(&self) -> usize {
        self.state.unsubs.load(Ordering::SeqCst)
    }

    pub fn calls(&self, method: &str) -> usize {
        let data = self.state.data.lock().unwrap();
        data.calls.get(method).copied().unwrap_or(0)
    }

    /// Inbound frames with the given `msg` type, in arrival order.
    pub fn frames(&self, msg: &str) -> Vec<Value> {
        let data = self.state.data.lock().unwrap();
        data.frames.iter().filter(|f| f["msg"] == msg).cloned().collect()
    }

    pub fn pongs(&self) -> Vec<Value> {
        self.state.data.lock().unwrap().pongs.clone()
    }

    pub fn has_user(&self, username: &str) -> bool {
        self.state.data.lock().unwrap().users.contains_key(username)
    }

    pub fn has_room(&self, name: &str) -> bool {
        self.state.data.lock().unwrap().rooms.contains_key(name)
    }

    /// Stops answering client pings.
    pub fn mute_pings(&self, muted: bool) {
        self.state.muted.store(muted, Ordering::SeqCst);
    }

    fn broadcast(&self, message: Message) {
        for tx in self.state.peers.lock().unwrap().values() {
            let _ = tx.send(message.clone());
        }
    }

    /// Closes every open connection with code 1011 (internal error).
    pub fn kill_connections(&self) {
        self.broadcast(Message::Close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: Cow::Borrowed("killed"),
        })));
    }

    /// Sends a `changed` stream event to every connection.
    pub fn emit(&self, collection: &str, event_name: &str, args: Value) {
        self.broadcast(Message::Text(changed(collection, event_name, args).to_string()));
    }

    /// Sends a server-initiated DDP ping to every connection.
    pub fn ping_clients(&self, id: &str) {
        self.broadcast(Message::Text(json!({ "msg": "ping", "id": id }).to_string()));
    }
}

fn changed(collection: &str, event_name: &str, args: Value) -> Value {
    json!({
        "msg": "changed",
        "collection": collection,
        "id": "id",
        "fields": { "eventName": event_name, "args": args }
    })
}

async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let index = state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.peers.lock().unwrap().insert(index, tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if write.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = read.next().await {
        if let Message::Text(text) = message {
            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            for reply in respond(&state, index, &frame) {
                let _ = tx.send(Message::Text(reply.to_string()));
            }
        }
    }

    state.peers.lock().unwrap().remove(&index);
    state.data.lock().unwrap().sessions.remove(&index);
    writer.abort();
}

fn method_error(error: Value, reason: &str) -> Value {
    json!({
        "isClientSafe": true,
        "error": error,
        "reason": reason,
        "message": format!("{} [{}]", reason, error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string())),
        "errorType": "Meteor.Error"
    })
}

fn respond(state: &ServerState, index: usize, frame: &Value) -> Vec<Value> {
    let mut data = state.data.lock().unwrap();
    data.frames.push(frame.clone());
    let id = frame["id"].clone();

    match frame["msg"].as_str().unwrap_or_default() {
        "connect" => vec![json!({ "msg": "connected", "session": format!("session-{}", index) })],
        "ping" if state.muted.load(Ordering::SeqCst) => vec![],
        "ping" => vec![json!({ "msg": "pong", "id": id })],
        "pong" => {
            data.pongs.push(frame.clone());
            vec![]
        }
        "sub" => vec![json!({ "msg": "ready", "subs": [id] })],
        "unsub" => {
            state.unsubs.fetch_add(1, Ordering::SeqCst);
            vec![json!({ "msg": "nosub", "id": id })]
        }
        "method" => {
            let method = frame["method"].as_str().unwrap_or_default().to_string();
            *data.calls.entry(method.clone()).or_insert(0) += 1;
            let params = frame["params"].as_array().cloned().unwrap_or_default();
            call_method(&mut data, index, &method, &params, &id)
        }
        _ => vec![],
    }
}

fn call_method(data: &mut Data, index: usize, method: &str, params: &[Value], id: &Value) -> Vec<Value> {
    let param = params.first().cloned().unwrap_or(Value::Null);
    let ok = |result: Value| vec![json!({ "msg": "result", "id": id, "result": result })];
    let fail = |error: Value| vec![json!({ "msg": "result", "id": id, "error": error })];

    match method {
        "login" => {
            let login = if let Some(token) = param["resume"].as_str() {
                token
                    .strip_prefix("token-")
                    .filter(|username| data.users.contains_key(*username))
                    .map(str::to_string)
            } else {
                let username = param["user"]["username"].as_str().unwrap_or_default();
                let digest = param["password"]["digest"].as_str().unwrap_or_default();
                data.users
                    .get(username)
                    .filter(|(_, password)| hash_password(password) == digest)
                    .map(|_| username.to_string())
            };
            match login {
                Some(username) => {
                    let user_id = data.users[&username].0.clone();
                    data.sessions.insert(index, (user_id.clone(), username.clone()));
                    ok(json!({
                        "id": user_id,
                        "token": format!("token-{}", username),
                        "tokenExpires": { "$date": 1_900_000_000_000i64 },
                        "type": if param.get("resume").is_some() { "resume" } else { "password" }
                    }))
                }
                None => fail(json!({
                    "isClientSafe": true,
                    "error": 403,
                    "reason": "User not found",
                    "message": "User not found [403]",
                    "errorType": "Meteor.Error"
                })),
            }
        }
        "logout" => {
            data.sessions.remove(&index);
            vec![json!({ "msg": "result", "id": id })]
        }
        "echo" => ok(Value::from(params.to_vec())),
        "hang" => vec![],
        "emit" => {
            let collection = param.as_str().unwrap_or_default();
            let event_name = params.get(1).and_then(Value::as_str).unwrap_or_default();
            let args = params.get(2).cloned().unwrap_or_else(|| json!([]));
            let mut replies = vec![changed(collection, event_name, args)];
            replies.extend(ok(Value::Null));
            replies
        }
        "getRoomIdByNameOrId" => {
            let key = param.as_str().unwrap_or_default();
            let found = data
                .rooms
                .get(key)
                .cloned()
                .or_else(|| data.rooms.values().find(|rid| *rid == key).cloned());
            match found {
                Some(rid) => ok(json!(rid)),
                None => fail(method_error(json!("error-not-allowed"), "Not allowed")),
            }
        }
        "getRoomNameById" => {
            let rid = param.as_str().unwrap_or_default();
            match data.rooms.iter().find(|(_, id)| *id == rid) {
                Some((name, _)) => ok(json!(name)),
                None => fail(method_error(json!("error-not-allowed"), "Not allowed")),
            }
        }
        "createDirectMessage" => {
            let username = param.as_str().unwrap_or_default();
            ok(json!({ "rid": format!("dm-{}", username), "t": "d" }))
        }
        "joinRoom" | "leaveRoom" => {
            let rid = param.as_str().unwrap_or_default();
            if data.rooms.values().any(|id| id == rid) {
                ok(json!(true))
            } else {
                fail(method_error(json!("error-invalid-room"), "Invalid room"))
            }
        }
        "sendMessage" => {
            data.next_message += 1;
            let (user_id, username) = data
                .sessions
                .get(&index)
                .cloned()
                .unwrap_or_else(|| ("anonymous".to_string(), "anonymous".to_string()));
            let message_id = param["_id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("msg-{}", data.next_message));
            ok(json!({
                "_id": message_id,
                "rid": param["rid"],
                "msg": param["msg"],
                "alias": "",
                "parseUrls": false,
                "groupable": false,
                "bot": param["bot"],
                "ts": { "$date": 1_677_721_600_123i64 },
                "u": { "_id": user_id, "username": username },
                "_updatedAt": { "$date": 1_677_721_600_123i64 }
            }))
        }
        "updateMessage" => ok(param),
        "setReaction" => vec![json!({ "msg": "result", "id": id })],
        "getFullUserData" => {
            let username = param["username"].as_str().unwrap_or_default();
            match data.users.get(username) {
                Some((user_id, _)) => ok(json!([{ "_id": user_id, "username": username, "name": username }])),
                None => ok(json!([])),
            }
        }
        "insertOrUpdateUser" => {
            let username = param["username"].as_str().unwrap_or_default().to_string();
            let password = param["password"].as_str().unwrap_or_default().to_string();
            let user_id = format!("id-{}", username);
            data.users.insert(username, (user_id.clone(), password));
            ok(json!(user_id))
        }
        "deleteUser" => {
            let user_id = param.as_str().unwrap_or_default();
            data.users.retain(|_, (id, _)| id != user_id);
            ok(json!(true))
        }
        "createChannel" | "createPrivateGroup" => {
            let name = param.as_str().unwrap_or_default().to_string();
            let rid = format!("room-{}", name);
            data.rooms.insert(name, rid.clone());
            ok(json!({ "rid": rid }))
        }
        "eraseRoom" => {
            let rid = param.as_str().unwrap_or_default();
            let before = data.rooms.len();
            data.rooms.retain(|_, id| id != rid);
            if data.rooms.len() < before {
                ok(json!(true))
            } else {
                fail(method_error(json!("error-invalid-room"), "Invalid room"))
            }
        }
        _ => fail(method_error(json!(404), &format!("Method '{}' not found", method))),
    }
}
