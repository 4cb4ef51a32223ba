use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use url::ParseError;

pub type Result<T, E = ConnectorError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Client Error: status={status}, message={message}, data={data:?}")]
    ClientError {
        status: StatusCode,
        message: String,
        data: Option<Value>,
    },

    #[error("Server Error: status={status}, message={message}")]
    ServerError {
        status: StatusCode,
        message: String,
        data: Option<Value>,
    },

    /// Error payload returned by the realtime API for a method or subscription.
    #[error("DDP Error: {}", describe_ddp_error(.0))]
    DdpError(Value),

    /// The reply matched the alternate (error) message type of a request.
    #[error("Rejected with '{msg}': {data}")]
    Rejected { msg: String, data: Value },

    #[error("Parameter Required Error: Missing required parameter '{param}'")]
    ParameterRequiredError { param: String },

    #[error("Invalid stream event: {0}")]
    InvalidEvent(String),

    #[error("Unknown subscription '{0}'")]
    UnknownSubscription(String),

    #[error("Not connected: sending without open connection")]
    NotConnected,

    #[error("Connection closed before a reply was received")]
    ConnectionClosed,

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("WebSocket Error: {0}")]
    WebsocketError(String),

    #[error("Authentication Error: {0}")]
    AuthenticationError(String),

    #[error("HTTP Request Error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON Serialization/Deserialization Error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL Parsing Error: {0}")]
    UrlParseError(#[from] ParseError),

    #[error("Invalid HTTP Header Value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConnectorError {
    /// The `error` code of a DDP error payload (e.g. `403` for a failed login).
    pub fn ddp_code(&self) -> Option<&Value> {
        match self {
            ConnectorError::DdpError(payload) => payload.get("error"),
            _ => None,
        }
    }

    /// True for a reply of the given alternate message type, e.g. `nosub`.
    pub fn is_rejected_with(&self, expected: &str) -> bool {
        matches!(self, ConnectorError::Rejected { msg, .. } if msg == expected)
    }
}

fn describe_ddp_error(payload: &Value) -> String {
    payload
        .get("message")
        .or_else(|| payload.get("reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ddp_error_uses_server_message() {
        let err = ConnectorError::DdpError(json!({
            "error": 403,
            "reason": "User not found",
            "message": "User not found [403]",
            "errorType": "Meteor.Error"
        }));
        assert_eq!(err.to_string(), "DDP Error: User not found [403]");
        assert_eq!(err.ddp_code(), Some(&json!(403)));
    }

    #[test]
    fn test_ddp_error_falls_back_to_payload() {
        let err = ConnectorError::DdpError(json!("boom"));
        assert_eq!(err.to_string(), "DDP Error: \"boom\"");
        assert!(err.ddp_code().is_none());
    }

    #[test]
    fn test_rejected_with() {
        let err = ConnectorError::Rejected {
            msg: "nosub".to_string(),
            data: json!({ "msg": "nosub", "id": "abc" }),
        };
        assert!(err.is_rejected_with("nosub"));
        assert!(!err.is_rejected_with("result"));
        assert!(!ConnectorError::NotConnected.is_rejected_with("nosub"));
    }
}
