//! Creates a sim bot user that logs every message mentioning it in #general.
//!
//! Needs a server with admin credentials in `RC_USERNAME` / `RC_PASSWORD`.

use rocket_connector_rs::sims::{NewUser, UserSims};
use rocket_connector_rs::websocket::Socket;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let users = UserSims::new(Socket::from_env());
    let bot = users
        .create(NewUser {
            name: Some("Sim Bot".to_string()),
            username: Some("simbot".to_string()),
            password: Some("pass".to_string()),
            roles: Some(vec!["user".to_string(), "bot".to_string()]),
            ..Default::default()
        })
        .await?;
    info!("Bot {}, ID: {}", bot.account.username, bot.id);

    let socket = users.login_with_user(&bot.id).await?;
    socket.call("joinRoom", vec![json!("GENERAL")]).await?;

    let mention = format!("@{}", bot.account.username);
    socket
        .subscribe(
            "stream-room-messages",
            vec![json!("GENERAL"), json!(true)],
            Some(Arc::new(move |event: &Value| {
                let message = &event["fields"]["args"][0];
                match (message["msg"].as_str(), message["u"]["username"].as_str()) {
                    (Some(msg), Some(username)) if msg.contains(&mention) => {
                        info!("Bot mentioned by {}: {}", username, msg);
                    }
                    (Some(_), Some(_)) => {}
                    _ => debug!("Unexpected event object in stream"),
                }
            })),
        )
        .await?;
    info!("Listening in #general");

    tokio::signal::ctrl_c().await?;
    socket.close().await;
    Ok(())
}
