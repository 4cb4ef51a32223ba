use crate::types::LoginResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Algorithm name sent alongside a password digest.
pub const DIGEST_ALGORITHM: &str = "sha-256";

/// Credentials accepted by the realtime `login` method.
///
/// `Basic` is never sent as-is: [`Credentials::normalize`] turns it into
/// `Hashed`, so the server only ever receives the password digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    Basic {
        username: String,
        password: String,
    },
    Hashed {
        username: String,
        digest: String,
        algorithm: String,
    },
    OAuth {
        credential_token: String,
        credential_secret: String,
    },
    Resume {
        token: String,
    },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn resume(token: impl Into<String>) -> Self {
        Credentials::Resume {
            token: token.into(),
        }
    }

    /// Converts plain passwords into their digest form. Other shapes pass through.
    pub fn normalize(self) -> Self {
        match self {
            Credentials::Basic { username, password } => Credentials::Hashed {
                username,
                digest: hash_password(&password),
                algorithm: DIGEST_ALGORITHM.to_string(),
            },
            other => other,
        }
    }

    /// Username carried by the credentials, if the shape has one.
    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::Basic { username, .. } | Credentials::Hashed { username, .. } => {
                Some(username)
            }
            _ => None,
        }
    }

    /// Builds the parameter object for the `login` method call.
    pub fn to_login_params(&self) -> Value {
        match self.clone().normalize() {
            Credentials::Hashed {
                username,
                digest,
                algorithm,
            } => json!({
                "user": { "username": username },
                "password": { "digest": digest, "algorithm": algorithm }
            }),
            Credentials::OAuth {
                credential_token,
                credential_secret,
            } => json!({
                "oauth": {
                    "credentialToken": credential_token,
                    "credentialSecret": credential_secret
                }
            }),
            Credentials::Resume { token } => json!({ "resume": token }),
            // normalize() never yields Basic
            Credentials::Basic { .. } => Value::Null,
        }
    }
}

impl From<&LoginResult> for Credentials {
    fn from(result: &LoginResult) -> Self {
        Credentials::resume(result.token.clone())
    }
}

/// Hex encoded SHA-256 digest of a plain password.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_is_sha256_hex() {
        assert_eq!(
            hash_password("pass"),
            "d74ff0ee8da3b9806b18c877dbf29bbde50b5bd8e4dad7a3a725000feb82e8f1"
        );
    }

    #[test]
    fn test_normalize_hashes_basic_credentials() {
        let normalized = Credentials::basic("bot", "pass").normalize();
        assert_eq!(
            normalized,
            Credentials::Hashed {
                username: "bot".to_string(),
                digest: hash_password("pass"),
                algorithm: "sha-256".to_string(),
            }
        );
    }

    #[test]
    fn test_normalize_is_stable_for_identical_credentials() {
        let a = Credentials::basic("bot", "pass").normalize();
        let b = Credentials::basic("bot", "pass").normalize();
        assert_eq!(a, b);
        assert_eq!(a.clone().normalize(), a);
    }

    #[test]
    fn test_login_params_never_carry_plain_password() {
        let params = Credentials::basic("bot", "secret").to_login_params();
        assert_eq!(params["user"]["username"], "bot");
        assert_eq!(params["password"]["algorithm"], "sha-256");
        assert_eq!(params["password"]["digest"], hash_password("secret"));
        assert!(!params.to_string().contains("\"secret\""));
    }

    #[test]
    fn test_login_params_for_oauth_and_resume() {
        let oauth = Credentials::OAuth {
            credential_token: "tok".to_string(),
            credential_secret: "sec".to_string(),
        };
        assert_eq!(
            oauth.to_login_params(),
            json!({ "oauth": { "credentialToken": "tok", "credentialSecret": "sec" } })
        );
        assert_eq!(
            Credentials::resume("abc").to_login_params(),
            json!({ "resume": "abc" })
        );
    }

    #[test]
    fn test_resume_from_login_result() {
        let result = LoginResult {
            id: "user-1".to_string(),
            token: "token-1".to_string(),
            token_expires: None,
            login_type: Some("password".to_string()),
        };
        assert_eq!(Credentials::from(&result), Credentials::resume("token-1"));
    }

    #[test]
    fn test_username() {
        assert_eq!(Credentials::basic("bot", "x").username(), Some("bot"));
        assert_eq!(Credentials::resume("t").username(), None);
    }
}
