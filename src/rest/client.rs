use crate::config::{Settings, UserSettings};
use crate::error::{ConnectorError, Result};
use log::{debug, error, info};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

const API_PREFIX: &str = "api/v1/";
const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Default fields requested by the user query helpers.
pub fn user_fields() -> Value {
    json!({ "name": 1, "username": 1, "status": 1, "type": 1 })
}

/// Auth state populated by a successful [`Client::login`].
#[derive(Debug, Clone)]
pub struct RestLogin {
    /// Username the login was made with, compared on the next login.
    pub username: String,
    pub user_id: String,
    pub auth_token: String,
    /// Full login response, returned again for repeated logins.
    pub result: Value,
}

/// A client for the Rocket.Chat REST API (`/api/v1/`).
///
/// Requests to endpoints that need auth log in first with the default
/// credentials, then carry the `X-Auth-Token` and `X-User-Id` headers.
///
/// # Examples
///
/// ```no_run
/// use rocket_connector_rs::config::Settings;
/// use rocket_connector_rs::rest::Client;
///
/// #[tokio::main]
/// async fn main() {
///     let client = Client::new(&Settings::from_env(), None).expect("Failed to create client");
///     let names = client.users().all_names().await.expect("Failed to list users");
///     println!("Users: {:?}", names);
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    http_client: HttpClient,
    /// Base URL including the `api/v1/` prefix.
    base_url: Url,
    /// Default credentials for automatic logins.
    user: UserSettings,
    current_login: Arc<RwLock<Option<RestLogin>>>,
}

impl Client {
    /// Creates a client for the instance URL in `settings`. A URL without
    /// a scheme gets `http://` (or `https://` with `ssl`) prepended.
    pub fn new(settings: &Settings, timeout_sec: Option<u64>) -> Result<Self> {
        let base = instance_base_url(&settings.instance.url, settings.instance.ssl);
        Client::with_base_url(&base, settings.user.clone(), timeout_sec)
    }

    /// Creates a client for a server root such as `http://localhost:3000`.
    pub fn with_base_url(url: &str, user: UserSettings, timeout_sec: Option<u64>) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/{}", url.trim_end_matches('/'), API_PREFIX))?;
        let timeout_duration = Duration::from_secs(timeout_sec.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        let http_client = HttpClient::builder().timeout(timeout_duration).build()?;

        Ok(Self {
            http_client,
            base_url,
            user,
            current_login: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn logged_in(&self) -> bool {
        self.current_login.read().await.is_some()
    }

    pub async fn current_login(&self) -> Option<RestLogin> {
        self.current_login.read().await.clone()
    }

    /// Does a request to an API endpoint, e.g. `chat.update`.
    ///
    /// GET requests send `data` as the query string, other methods as a JSON
    /// body. Statuses listed in `ignore` are not treated as errors. DELETE
    /// resolves with `{ "status", "data" }` instead of the body alone.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<Value>,
        auth: bool,
        ignore: &[StatusCode],
    ) -> Result<Value> {
        if auth && !self.logged_in().await {
            self.login(None).await?;
        }
        self.execute(method, endpoint, data, ignore).await
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<Value>,
        ignore: &[StatusCode],
    ) -> Result<Value> {
        let body = data.unwrap_or(Value::Null);
        debug!("[api] {} {}: {}", method, endpoint, body);

        let mut url = self.base_url.join(endpoint.trim_start_matches('/'))?;
        let mut request_builder = self.http_client.request(method.clone(), url.clone());
        if method == Method::GET {
            if !body.is_null() {
                let query = serde_qs::to_string(&body).map_err(|e| {
                    ConnectorError::ParameterRequiredError {
                        param: format!("query for {}: {}", endpoint, e),
                    }
                })?;
                url.set_query(Some(&query));
                request_builder = self.http_client.request(method.clone(), url);
            }
        } else if !body.is_null() {
            request_builder = request_builder.json(&body);
        }
        request_builder = request_builder.headers(self.auth_headers().await?);

        let response = request_builder.send().await?;
        let status = response.status();
        let value = Self::handle_response(response, ignore).await.map_err(|e| {
            error!("[api] {} error ({}): {}", method, endpoint, e);
            e
        })?;
        debug!("[api] {} {} result {}", method, endpoint, status);

        if method == Method::DELETE {
            Ok(json!({ "status": status.as_u16(), "data": value }))
        } else {
            Ok(value)
        }
    }

    async fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(login) = self.current_login.read().await.as_ref() {
            headers.insert(
                HeaderName::from_static("x-auth-token"),
                HeaderValue::from_str(&login.auth_token)?,
            );
            headers.insert(
                HeaderName::from_static("x-user-id"),
                HeaderValue::from_str(&login.user_id)?,
            );
        }
        Ok(headers)
    }

    /// Parses the body, turning failed statuses into client or server errors.
    async fn handle_response(response: Response, ignore: &[StatusCode]) -> Result<Value> {
        let status = response.status();
        let text = response.text().await?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(_) => Value::String(text),
            }
        };

        if status.is_success() || ignore.contains(&status) {
            return Ok(body);
        }

        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        let data = if body.is_null() { None } else { Some(body) };

        if status.is_client_error() {
            Err(ConnectorError::ClientError {
                status,
                message,
                data,
            })
        } else {
            Err(ConnectorError::ServerError {
                status,
                message,
                data,
            })
        }
    }

    pub async fn get(&self, endpoint: &str, data: Option<Value>) -> Result<Value> {
        self.request(Method::GET, endpoint, data, true, &[]).await
    }

    pub async fn post(&self, endpoint: &str, data: Option<Value>) -> Result<Value> {
        self.request(Method::POST, endpoint, data, true, &[]).await
    }

    pub async fn put(&self, endpoint: &str, data: Option<Value>) -> Result<Value> {
        self.request(Method::PUT, endpoint, data, true, &[]).await
    }

    pub async fn del(&self, endpoint: &str, data: Option<Value>) -> Result<Value> {
        self.request(Method::DELETE, endpoint, data, true, &[]).await
    }

    /// Logs in for the following requests, with the default credentials
    /// unless `(username, password)` is given.
    ///
    /// Logging in again as the same user returns the previous result; a
    /// different user logs the current one out first.
    pub async fn login(&self, credentials: Option<(&str, &str)>) -> Result<Value> {
        let (username, password) =
            credentials.unwrap_or((self.user.username.as_str(), self.user.password.as_str()));
        info!("[api] Logging in {}", username);

        let existing = self.current_login.read().await.clone();
        if let Some(existing) = existing {
            debug!("[api] Already logged in");
            if existing.username == username {
                return Ok(existing.result);
            }
            self.logout().await?;
        }

        let result = self
            .execute(
                Method::POST,
                "login",
                Some(json!({ "username": username, "password": password })),
                &[],
            )
            .await?;
        let auth_token = result["data"]["authToken"].as_str();
        let user_id = result["data"]["userId"].as_str();
        let (Some(auth_token), Some(user_id)) = (auth_token, user_id) else {
            return Err(ConnectorError::AuthenticationError(format!(
                "Login failed for {}",
                username
            )));
        };

        let login = RestLogin {
            username: username.to_string(),
            user_id: user_id.to_string(),
            auth_token: auth_token.to_string(),
            result: result.clone(),
        };
        info!("[api] Logged in ID {}", login.user_id);
        *self.current_login.write().await = Some(login);
        Ok(result)
    }

    /// Logs out and clears the auth headers. A no-op when not logged in.
    pub async fn logout(&self) -> Result<()> {
        let username = match self.current_login.read().await.as_ref() {
            Some(login) => login.username.clone(),
            None => {
                debug!("[api] Already logged out");
                return Ok(());
            }
        };
        info!("[api] Logging out {}", username);
        self.execute(Method::GET, "logout", None, &[]).await?;
        *self.current_login.write().await = None;
        Ok(())
    }

    /// Query helpers for the user collection.
    pub fn users(&self) -> Users<'_> {
        Users { client: self }
    }
}

/// User collection queries over `users.list`.
pub struct Users<'a> {
    client: &'a Client,
}

impl Users<'_> {
    async fn list(&self, fields: Value, online: bool) -> Result<Vec<Value>> {
        let mut query = json!({ "fields": fields });
        if online {
            query["query"] = json!({ "status": { "$ne": "offline" } });
        }
        let result = self.client.get("users.list", Some(query)).await?;
        match result.get("users") {
            Some(Value::Array(users)) => Ok(users.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn pluck(users: Vec<Value>, field: &str) -> Vec<String> {
        users
            .iter()
            .filter_map(|u| u.get(field).and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// All users, with the given fields or [`user_fields`].
    pub async fn all(&self, fields: Option<Value>) -> Result<Vec<Value>> {
        self.list(fields.unwrap_or_else(user_fields), false).await
    }

    pub async fn all_names(&self) -> Result<Vec<String>> {
        let users = self.list(json!({ "username": 1 }), false).await?;
        Ok(Self::pluck(users, "username"))
    }

    pub async fn all_ids(&self) -> Result<Vec<String>> {
        let users = self.list(json!({ "_id": 1 }), false).await?;
        Ok(Self::pluck(users, "_id"))
    }

    /// Users whose status is not `offline`.
    pub async fn online(&self, fields: Option<Value>) -> Result<Vec<Value>> {
        self.list(fields.unwrap_or_else(user_fields), true).await
    }

    pub async fn online_names(&self) -> Result<Vec<String>> {
        let users = self.list(json!({ "username": 1 }), true).await?;
        Ok(Self::pluck(users, "username"))
    }

    pub async fn online_ids(&self) -> Result<Vec<String>> {
        let users = self.list(json!({ "_id": 1 }), true).await?;
        Ok(Self::pluck(users, "_id"))
    }
}

/// Server root for an instance URL, adding a scheme when none is set.
pub fn instance_base_url(url: &str, ssl: bool) -> String {
    if url.contains("http") {
        url.to_string()
    } else {
        let scheme = if ssl { "https" } else { "http" };
        format!("{}://{}", scheme, url.trim_start_matches("//"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_base_url() {
        assert_eq!(instance_base_url("localhost:3000", false), "http://localhost:3000");
        assert_eq!(instance_base_url("//chat.local", false), "http://chat.local");
        assert_eq!(instance_base_url("chat.local", true), "https://chat.local");
        assert_eq!(
            instance_base_url("https://open.rocket.chat", false),
            "https://open.rocket.chat"
        );
    }

    #[test]
    fn test_base_url_has_api_prefix() {
        let client =
            Client::with_base_url("http://localhost:3000/", UserSettings::default(), None).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:3000/api/v1/");
        assert_eq!(
            client.base_url().join("users.list").unwrap().as_str(),
            "http://localhost:3000/api/v1/users.list"
        );
    }
}
