use crate::error::{ConnectorError, Result};
use futures_util::{SinkExt, StreamExt};
use log::*;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use url::Url;

/// Close code used for intentional disconnects.
pub const NORMAL_CLOSURE: u16 = 1000;

pub(crate) type MessageCallback = Arc<dyn Fn(String) + Send + Sync + 'static>;
/// Receives the close code sent by the peer, `None` when the stream failed or ended without one.
pub(crate) type CloseCallback = Arc<dyn Fn(Option<u16>) + Send + Sync + 'static>;

/// Close frame for an intentional disconnect.
pub(crate) fn normal_close() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: Cow::Borrowed("disconnect"),
    }))
}

/// Aborts the reader and writer when the task group is cancelled before
/// either finishes.
struct TaskGuard {
    handles: [AbortHandle; 2],
    armed: bool,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.armed {
            for handle in &self.handles {
                handle.abort();
            }
        }
    }
}

/// Opens a websocket and spawns tasks to manage it, returning handles.
///
/// Returns a tuple containing:
/// - `JoinHandle<()>`: Handle for the combined reader/writer task group. It
///   completes when either task stops; the reader runs `on_close` on exit.
///   Aborting it also aborts both tasks, dropping the websocket.
/// - `mpsc::Sender<Message>`: Channel sender for outbound frames (Text, Close, etc.).
pub(crate) async fn connect_managed(
    url: &str,
    on_message: MessageCallback,
    on_close: CloseCallback,
) -> Result<(JoinHandle<()>, mpsc::Sender<Message>)> {
    let url_obj = Url::parse(url)?;

    info!("[socket] Connecting to {}", url_obj);
    let (ws_stream, response) = connect_async(url_obj.as_str())
        .await
        .map_err(|e| ConnectorError::WebsocketError(format!("WebSocket connection failed: {}", e)))?;
    debug!("[socket] Connected, handshake status {:?}", response.status());

    let (write, mut read) = ws_stream.split();
    let write = Arc::new(Mutex::new(write));

    let (tx, mut rx) = mpsc::channel::<Message>(32);
    let tx_for_pong = tx.clone();

    // --- Writer Task ---
    let writer_handle = tokio::spawn({
        let write = Arc::clone(&write);
        async move {
            while let Some(message) = rx.recv().await {
                trace!("[socket] Sending frame: {:?}", message.to_string());
                let mut writer = write.lock().await;
                if let Err(e) = writer.send(message).await {
                    error!("[socket] Send error: {}. Stopping writer task.", e);
                    break;
                }
            }
            debug!("[socket] Writer task finished.");
        }
    });

    // --- Reader Task ---
    // Text frames are handed to `on_message` one at a time, in arrival order.
    let reader_handle = tokio::spawn(async move {
        let mut close_code = None;
        loop {
            match read.next().await {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        trace!("[socket] Received: {}", text);
                        on_message(text);
                    }
                    Message::Binary(bin) => {
                        trace!("[socket] Ignoring binary frame of {} bytes", bin.len());
                    }
                    Message::Ping(ping_data) => {
                        if tx_for_pong.send(Message::Pong(ping_data)).await.is_err() {
                            error!("[socket] Failed to send Pong: writer channel closed.");
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(close_frame) => {
                        debug!("[socket] Received Close frame: {:?}", close_frame);
                        close_code = close_frame.map(|frame| u16::from(frame.code));
                        break;
                    }
                    Message::Frame(_) => {}
                },
                Some(Err(e)) => {
                    warn!("[socket] Read error: {}", e);
                    break;
                }
                None => {
                    debug!("[socket] Stream ended.");
                    break;
                }
            }
        }
        drop(tx_for_pong);
        on_close(close_code);
    });

    let mut guard = TaskGuard {
        handles: [reader_handle.abort_handle(), writer_handle.abort_handle()],
        armed: true,
    };
    let combined_handle = tokio::spawn(async move {
        let _ = &guard;
        tokio::select! {
            _ = reader_handle => {},
            _ = writer_handle => {},
        }
        guard.armed = false;
    });

    Ok((combined_handle, tx))
}
