use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
};
use tracing::debug;
use url::Url;

/// What the transport reports upward: decoded text frames, then exactly one
/// close notice. `clean` is true only for a normal-closure close.
#[derive(Debug)]
pub enum TransportEvent {
    Frame(String),
    Closed { clean: bool },
}

/// Both directions of one open connection. Dropping `sender` makes the
/// transport issue a normal-closure close frame.
pub struct TransportLink {
    pub sender: mpsc::UnboundedSender<String>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<TransportLink>;
}

/// Production transport over tokio-tungstenite.
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {}", redacted(url)))?;
        let (mut writer, mut reader) = ws_stream.split();

        let (sender, mut outbound) = mpsc::unbounded_channel::<String>();
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                if writer.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            // Sender dropped: the connection owner is done with this link.
            let _ = writer
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                })))
                .await;
        });

        tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if events_tx.send(TransportEvent::Frame(text)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let clean = matches!(
                            &frame,
                            Some(CloseFrame {
                                code: CloseCode::Normal,
                                ..
                            })
                        );
                        debug!(clean, "websocket closed by peer");
                        let _ = events_tx.send(TransportEvent::Closed { clean });
                        return;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(error = %err, "websocket read error");
                        let _ = events_tx.send(TransportEvent::Closed { clean: false });
                        return;
                    }
                }
            }
            let _ = events_tx.send(TransportEvent::Closed { clean: false });
        });

        Ok(TransportLink { sender, events })
    }
}

/// Connect URIs carry the access token as a query parameter; keep it out of
/// logs and error messages.
fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
