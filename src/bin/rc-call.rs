//! Calls a server method over the realtime socket and prints the result.
//!
//! # Usage
//!
//! ```bash
//! # Call with a JSON array of params
//! rc-call --method getRoomIdByNameOrId --params '["GENERAL"]'
//!
//! # Call with comma-separated string params, against another server
//! RC_URL=chat.local:3000 rc-call -m getUsersOfRoom -p GENERAL,true
//! ```

use anyhow::Context;
use clap::Parser;
use rocket_connector_rs::config::SocketOptions;
use rocket_connector_rs::websocket::Socket;
use serde_json::Value;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Rocket.Chat method call CLI
#[derive(Parser, Debug)]
#[command(name = "rc-call")]
#[command(about = "Call a Rocket.Chat method via the realtime socket")]
#[command(version)]
struct Args {
    /// A method to call via socket
    #[arg(short, long)]
    method: String,

    /// Method params, as JSON or comma-separated strings
    #[arg(short, long)]
    params: Option<String>,

    /// Server host, overriding RC_URL
    #[arg(long, env = "RC_URL")]
    host: Option<String>,

    /// Username to login with, overriding RC_USERNAME
    #[arg(short, long, env = "RC_USERNAME")]
    username: Option<String>,

    /// Password to login with, overriding RC_PASSWORD
    #[arg(long, env = "RC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Parses params as JSON (an array gives one param per item) or CSV.
fn parse_params(params: Option<&str>) -> Vec<Value> {
    let Some(params) = params else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(params) {
        Ok(Value::Array(items)) => items,
        Ok(value) => vec![value],
        Err(_) => params
            .split(',')
            .map(|p| Value::String(p.to_string()))
            .collect(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut options = SocketOptions::from_env();
    if let Some(host) = args.host {
        options = SocketOptions {
            ssl: options.ssl || host.starts_with("https"),
            host,
            ..options
        };
    }
    if let Some(username) = args.username {
        options.username = username;
    }
    if let Some(password) = args.password {
        options.password = password;
    }

    let socket = Socket::new(options);
    socket.login(None).await.context("login failed")?;
    tracing::info!("Calling {}", args.method);
    let result = socket
        .call(&args.method, parse_params(args.params.as_deref()))
        .await
        .with_context(|| format!("call to {} failed", args.method))?;
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "result": result }))?);

    socket.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_params() {
        assert!(parse_params(None).is_empty());
        assert_eq!(parse_params(Some("[\"GENERAL\", 2]")), vec![json!("GENERAL"), json!(2)]);
        assert_eq!(parse_params(Some("{\"rid\":\"x\"}")), vec![json!({ "rid": "x" })]);
        assert_eq!(parse_params(Some("GENERAL,true")), vec![json!("GENERAL"), json!("true")]);
    }
}
