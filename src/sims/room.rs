use super::random_word;
use crate::error::{ConnectorError, Result};
use crate::websocket::Socket;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Attributes for a new channel or private group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRoom {
    pub name: String,
    /// Usernames added on creation.
    pub members: Vec<String>,
    pub read_only: bool,
}

impl NewRoom {
    pub fn named(name: impl Into<String>) -> Self {
        NewRoom {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A known or created room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub name: String,
    pub id: String,
}

/// Converts a full name to a safe room name.
pub fn safe_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Creates and deletes simulated rooms.
pub struct RoomSims {
    socket: Socket,
    records: Mutex<HashMap<String, RoomRecord>>,
}

impl RoomSims {
    /// Sims administered through `socket`, which logs in with its defaults.
    pub fn new(socket: Socket) -> Self {
        RoomSims {
            socket,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, RoomRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rooms created (or found) in this session.
    pub fn rooms(&self) -> Vec<RoomRecord> {
        self.records().values().cloned().collect()
    }

    /// ID of a room by name, `None` when the lookup fails.
    pub async fn lookup(&self, name: &str) -> Result<Option<String>> {
        self.socket.login(None).await?;
        match self
            .socket
            .call("getRoomIdByNameOrId", vec![json!(name)])
            .await
        {
            Ok(Value::String(id)) => Ok(Some(id)),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!("[sims] Room lookup failed for {}: {}", name, e);
                Ok(None)
            }
        }
    }

    /// Creates a room under its safe name, or remembers the existing one.
    pub async fn create(&self, room: NewRoom, private: bool) -> Result<RoomRecord> {
        self.socket.login(None).await?;
        let name = safe_name(&room.name);
        if name.is_empty() {
            return Err(ConnectorError::ParameterRequiredError {
                param: "name".to_string(),
            });
        }

        let id = match self.lookup(&name).await? {
            Some(id) => {
                info!("[sims] Room {} with ID {}", name, id);
                id
            }
            None => {
                let method = if private {
                    "createPrivateGroup"
                } else {
                    "createChannel"
                };
                let created = self
                    .socket
                    .call(
                        method,
                        vec![json!(name), json!(room.members), json!(room.read_only)],
                    )
                    .await?;
                let id = created["rid"].as_str().map(str::to_string).ok_or_else(|| {
                    ConnectorError::InvalidEvent(format!("{} returned {}", method, created))
                })?;
                info!("[sims] Created room {} with ID {}", name, id);
                id
            }
        };

        let record = RoomRecord { name, id };
        self.records().insert(record.id.clone(), record.clone());
        Ok(record)
    }

    /// Creates a public room with a random name, unless one is given.
    pub async fn random_channel(&self, custom: Option<NewRoom>) -> Result<RoomRecord> {
        self.create(Self::random_room(custom), false).await
    }

    pub async fn random_private(&self, custom: Option<NewRoom>) -> Result<RoomRecord> {
        self.create(Self::random_room(custom), true).await
    }

    /// Random public room.
    pub async fn random(&self, custom: Option<NewRoom>) -> Result<RoomRecord> {
        self.random_channel(custom).await
    }

    fn random_room(custom: Option<NewRoom>) -> NewRoom {
        let mut room = custom.unwrap_or_default();
        if room.name.is_empty() {
            room.name = random_word();
        }
        room
    }

    /// Erases a room by ID and forgets it. Server errors are logged.
    pub async fn delete_room(&self, id: &str) -> Result<()> {
        self.socket.login(None).await?;
        if let Err(e) = self.socket.call("eraseRoom", vec![json!(id)]).await {
            warn!("[sims] Erase room {} failed: {}", id, e);
        }
        self.records().remove(id);
        Ok(())
    }

    /// Erases a room by name if it exists.
    pub async fn delete_room_by_name(&self, name: &str) -> Result<()> {
        if let Some(id) = self.lookup(name).await? {
            self.delete_room(&id).await?;
        }
        Ok(())
    }

    /// Erases every room created in this session.
    pub async fn delete_all(&self) -> Result<()> {
        let ids: Vec<String> = self.records().keys().cloned().collect();
        for id in ids {
            self.delete_room(&id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("Team Room #1!"), "team-room-1");
        assert_eq!(safe_name("already_safe-name"), "already_safe-name");
    }
}
