use super::{random_first_name, random_password};
use crate::auth::Credentials;
use crate::error::{ConnectorError, Result};
use crate::types::{Message, MessageReceipt};
use crate::websocket::Socket;
use log::{info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Attributes for a new user; at least a name or username is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewUser {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub roles: Option<Vec<String>>,
    pub join_default_channels: Option<bool>,
    pub require_password_change: Option<bool>,
    pub send_welcome_email: Option<bool>,
    pub verified: Option<bool>,
}

impl NewUser {
    pub fn named(name: impl Into<String>) -> Self {
        NewUser {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_username(username: impl Into<String>) -> Self {
        NewUser {
            username: Some(username.into()),
            ..Default::default()
        }
    }
}

/// Account attributes as sent to `insertOrUpdateUser`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub name: String,
    pub username: String,
    pub password: String,
    pub email: String,
    pub roles: Vec<String>,
    pub join_default_channels: bool,
    pub require_password_change: bool,
    pub send_welcome_email: bool,
    pub verified: bool,
}

impl UserAccount {
    /// Fills in defaults: a random password, name from username (or the
    /// reverse) and a null email address.
    pub fn from_new_user(user: NewUser) -> Result<Self> {
        let (name, username) = match (user.name, user.username) {
            (Some(name), Some(username)) => (name, username),
            (Some(name), None) => {
                let username = safe_name(&name);
                (name, username)
            }
            (None, Some(username)) => (username.clone(), username),
            (None, None) => {
                return Err(ConnectorError::ParameterRequiredError {
                    param: "name or username".to_string(),
                })
            }
        };
        Ok(UserAccount {
            email: user.email.unwrap_or_else(|| null_address(&username)),
            password: user.password.unwrap_or_else(random_password),
            roles: user.roles.unwrap_or_else(|| vec!["user".to_string()]),
            join_default_channels: user.join_default_channels.unwrap_or(false),
            require_password_change: user.require_password_change.unwrap_or(false),
            send_welcome_email: user.send_welcome_email.unwrap_or(false),
            verified: user.verified.unwrap_or(true),
            name,
            username,
        })
    }
}

/// A known or created user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub account: UserAccount,
}

struct UserEntry {
    record: UserRecord,
    socket: Option<Socket>,
}

/// Email address at a null domain, unique per key.
pub fn null_address(key: &str) -> String {
    format!("bit-bucket+{}@test.smtp.org", strip_separators(key))
}

/// Converts a full name to a safe username.
pub fn safe_name(name: &str) -> String {
    strip_separators(&name.to_lowercase())
}

fn strip_separators(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | '.' | '@') && !c.is_whitespace())
        .collect()
}

/// Creates, logs in and deletes simulated users.
pub struct UserSims {
    socket: Socket,
    records: Mutex<HashMap<String, UserEntry>>,
}

impl UserSims {
    /// Sims administered through `socket`, which logs in with its defaults.
    pub fn new(socket: Socket) -> Self {
        UserSims {
            socket,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, UserEntry>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Users created (or found) in this session.
    pub fn users(&self) -> Vec<UserRecord> {
        self.records().values().map(|e| e.record.clone()).collect()
    }

    pub fn record(&self, id: &str) -> Option<UserRecord> {
        self.records().get(id).map(|e| e.record.clone())
    }

    /// Full user data for a username, `None` when not found.
    pub async fn lookup(&self, username: &str) -> Result<Option<Value>> {
        self.socket.login(None).await?;
        let result = self
            .socket
            .call("getFullUserData", vec![json!({ "username": username, "limit": 1 })])
            .await?;
        Ok(result.as_array().and_then(|users| users.first()).cloned())
    }

    /// Creates a user, or remembers the existing user with that username.
    pub async fn create(&self, user: NewUser) -> Result<UserRecord> {
        self.socket.login(None).await?;
        let password_given = user.password.is_some();
        let account = UserAccount::from_new_user(user)?;

        let existing = match self.lookup(&account.username).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!("[sims] Lookup of {} failed: {}", account.username, e);
                None
            }
        };
        let id = match existing.as_ref().and_then(|u| u["_id"].as_str()) {
            Some(id) => {
                if !password_given {
                    warn!("[sims] Using existing user without setting password, login will fail.");
                }
                id.to_string()
            }
            None => {
                let created = self
                    .socket
                    .call("insertOrUpdateUser", vec![serde_json::to_value(&account)?])
                    .await?;
                created
                    .as_str()
                    .or_else(|| created["_id"].as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ConnectorError::InvalidEvent(format!(
                            "insertOrUpdateUser returned {}",
                            created
                        ))
                    })?
            }
        };
        info!("[sims] User {} with ID {}", account.username, id);

        let record = UserRecord { id: id.clone(), account };
        self.records().insert(
            id,
            UserEntry {
                record: record.clone(),
                socket: None,
            },
        );
        Ok(record)
    }

    /// Creates a user with a random first name, unless one is given.
    pub async fn random(&self, custom: Option<NewUser>) -> Result<UserRecord> {
        let mut user = custom.unwrap_or_default();
        if user.name.is_none() && user.username.is_none() {
            user.name = Some(random_first_name());
        }
        self.create(user).await
    }

    fn unknown(id: &str) -> ConnectorError {
        ConnectorError::ParameterRequiredError {
            param: format!("known sim user ID ({})", id),
        }
    }

    /// Socket logged in as the user, opened on first use.
    pub async fn login_with_user(&self, id: &str) -> Result<Socket> {
        let (account, existing) = {
            let records = self.records();
            let entry = records.get(id).ok_or_else(|| Self::unknown(id))?;
            (entry.record.account.clone(), entry.socket.clone())
        };
        if let Some(socket) = existing.filter(Socket::logged_in) {
            return Ok(socket);
        }
        let socket = Socket::new(self.socket.options().clone());
        socket.open().await?;
        socket
            .login(Some(Credentials::basic(account.username, account.password)))
            .await?;
        if let Some(entry) = self.records().get_mut(id) {
            entry.socket = Some(socket.clone());
        }
        Ok(socket)
    }

    /// Sends a message from the user; the message must carry its room ID.
    pub async fn send_from_user(&self, id: &str, message: &Message) -> Result<MessageReceipt> {
        let socket = self.login_with_user(id).await?;
        let result = socket
            .call("sendMessage", vec![serde_json::to_value(message)?])
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn join_room_with_user(&self, id: &str, rid: &str) -> Result<Value> {
        let socket = self.login_with_user(id).await?;
        socket.call("joinRoom", vec![json!(rid)]).await
    }

    pub async fn leave_room_with_user(&self, id: &str, rid: &str) -> Result<Value> {
        let socket = self.login_with_user(id).await?;
        socket.call("leaveRoom", vec![json!(rid)]).await
    }

    /// Deletes a user on the server, closing its socket and forgetting it.
    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.socket.login(None).await?;
        let entry = self.records().remove(id);
        let server_id = match &entry {
            Some(entry) => self
                .lookup(&entry.record.account.username)
                .await?
                .and_then(|u| u["_id"].as_str().map(str::to_string)),
            None => Some(id.to_string()),
        };
        if let Some(server_id) = server_id {
            self.socket.call("deleteUser", vec![json!(server_id)]).await?;
        }
        if let Some(socket) = entry.and_then(|e| e.socket) {
            if socket.logged_in() {
                socket.close().await;
            }
        }
        Ok(())
    }

    /// Deletes a user by username if they exist.
    pub async fn delete_username(&self, username: &str) -> Result<()> {
        let found = self.lookup(username).await?;
        if let Some(id) = found.as_ref().and_then(|u| u["_id"].as_str()) {
            self.delete_user(id).await?;
        }
        Ok(())
    }

    /// Deletes every user created in this session.
    pub async fn delete_all(&self) -> Result<()> {
        let ids: Vec<String> = self.records().keys().cloned().collect();
        for id in ids {
            self.delete_user(&id).await?;
        }
        Ok(())
    }
}
