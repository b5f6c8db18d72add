//! One WebSocket connection's lifecycle.
//!
//! A session owns the socket, a reader task that feeds inbound text frames
//! into a [`MessageQueue`], and the writer half for outbound JSON frames.
//! Opening is bounded by a connect timeout distinct from the read timeout;
//! closing gets a bounded grace period before the reader is torn down so a
//! misbehaving server cannot hold the connection half-open.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use futures::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::frame::MessageQueue;

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct WsSession {
    queue: Arc<MessageQueue>,
    writer: WsWriter,
    reader_task: JoinHandle<()>,
}

impl WsSession {
    /// Open a connection to `url` within `connect_timeout`. Inbound frames
    /// larger than `max_frame_bytes` are rejected by the socket layer to
    /// bound memory against a misbehaving server.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        max_frame_bytes: usize,
    ) -> Result<Self> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max_frame_bytes);
        config.max_frame_size = Some(max_frame_bytes);

        let (stream, _response) =
            tokio::time::timeout(connect_timeout, connect_async_with_config(url, Some(config), false))
                .await
                .map_err(|_| {
                    anyhow::anyhow!("connect to {url} timed out after {connect_timeout:?}")
                })?
                .with_context(|| format!("websocket connect failed: {url}"))?;

        debug!(url, "WebSocket session established");

        let (writer, mut reader) = stream.split();
        let queue = Arc::new(MessageQueue::new());
        let feed = queue.clone();
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.next().await {
                    Some(Ok(Message::Text(text))) => feed.push_payload(&text),
                    Some(Ok(Message::Close(_))) => {
                        feed.fail("connection closed by server");
                        break;
                    }
                    // Control frames and unexpected binary payloads carry
                    // nothing for the protocol layer.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        feed.fail(format!("websocket error: {err}"));
                        break;
                    }
                    None => {
                        feed.fail("connection closed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            queue,
            writer,
            reader_task,
        })
    }

    /// Handle to the inbound message queue.
    pub fn queue(&self) -> Arc<MessageQueue> {
        self.queue.clone()
    }

    /// Send one JSON value as one text frame.
    pub async fn send_json(&mut self, value: &serde_json::Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.writer
            .send(Message::Text(text))
            .await
            .context("websocket send failed")
    }

    /// Close politely: close frame, then at most `grace` for the server to
    /// finish the handshake, then the reader is aborted outright.
    pub async fn close(&mut self, grace: Duration) {
        let _ = self.writer.send(Message::Close(None)).await;
        let _ = tokio::time::timeout(grace, &mut self.reader_task).await;
        self.reader_task.abort();
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        // An attempt abandoned mid-stream must not leak its reader.
        self.reader_task.abort();
    }
}
