use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- Enums ---

/// Room type literal as used by the server: channel, private, direct, livechat.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomType {
    #[serde(rename = "c")]
    Channel,
    #[serde(rename = "p")]
    Private,
    #[serde(rename = "d")]
    Direct,
    #[serde(rename = "l")]
    Livechat,
}

// --- Session ---

/// Server date wrapper, e.g. `{ "$date": 1677721600123 }`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerDate {
    #[serde(rename = "$date")]
    pub date: i64,
}

impl ServerDate {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.date).single()
    }
}

/// Result of the realtime `login` method.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    /// User ID.
    pub id: String,
    /// Resume token, usable for later logins without a password.
    pub token: String,
    #[serde(rename = "tokenExpires", skip_serializing_if = "Option::is_none")]
    pub token_expires: Option<ServerDate>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub login_type: Option<String>,
}

/// Identity of the user logged in on a socket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub username: Option<String>,
}

// --- Messages ---

/// User as embedded in messages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Integration details attached to messages sent by a bot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BotDetails {
    pub i: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub rid: Option<String>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groupable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot: Option<BotDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub u: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<ServerDate>,
    #[serde(rename = "editedBy", skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<User>,
    #[serde(rename = "editedAt", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<ServerDate>,
}

impl Message {
    /// Text message tagged with the sending integration.
    pub fn text(content: impl Into<String>, integration_id: &str) -> Self {
        Message {
            msg: Some(content.into()),
            bot: Some(BotDetails {
                i: integration_id.to_string(),
            }),
            ..Default::default()
        }
    }
}

/// Extra details emitted with a message in stream events.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageMeta {
    #[serde(rename = "roomParticipant", default)]
    pub room_participant: bool,
    #[serde(rename = "roomType", skip_serializing_if = "Option::is_none")]
    pub room_type: Option<RoomType>,
    #[serde(rename = "roomName", skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
}

/// Message receipt returned by `sendMessage` and `updateMessage`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageReceipt {
    #[serde(rename = "_id")]
    pub id: String,
    pub rid: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub alias: String,
    #[serde(rename = "parseUrls", default)]
    pub parse_urls: bool,
    #[serde(default)]
    pub groupable: bool,
    pub u: Option<User>,
    pub ts: Option<ServerDate>,
    #[serde(rename = "_updatedAt")]
    pub updated_at: Option<ServerDate>,
    #[serde(rename = "editedAt", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<ServerDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_result_from_server_payload() {
        let result: LoginResult = serde_json::from_value(json!({
            "id": "user-1",
            "token": "token-1",
            "tokenExpires": { "$date": 1677721600123_i64 },
            "type": "password"
        }))
        .unwrap();
        assert_eq!(result.id, "user-1");
        assert_eq!(result.login_type.as_deref(), Some("password"));
        let expires = result.token_expires.unwrap().to_datetime().unwrap();
        assert_eq!(expires.timestamp_millis(), 1677721600123);
    }

    #[test]
    fn test_message_meta_room_type() {
        let meta: MessageMeta =
            serde_json::from_value(json!({ "roomParticipant": true, "roomType": "d" })).unwrap();
        assert_eq!(meta.room_type, Some(RoomType::Direct));
        assert!(meta.room_participant);
    }

    #[test]
    fn test_text_message_serializes_sparse() {
        let message = Message::text("hello", "rc-bot");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "rid": null, "msg": "hello", "bot": { "i": "rc-bot" } })
        );
    }
}
