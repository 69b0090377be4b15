//! Live half of the client: the gateway WebSocket.
//!
//! Connects with the session token, decodes inbound envelopes, and sends
//! subscription commands upstream. Reconnect policy is the embedding layer's
//! concern; a closed socket surfaces as `None` from [`Gateway::next_event`].

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use uuid::Uuid;

use tincan_types::events::{ClientCommand, Envelope};

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct Gateway {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl Gateway {
    /// Connect and authenticate. `base_url` is the http(s) origin of the
    /// server; the scheme is swapped for ws(s) and the token rides the query
    /// string.
    pub async fn connect(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let url = gateway_url(base_url, token);
        let (stream, _) = connect_async(url.as_str()).await?;
        let (write, read) = stream.split();
        debug!(%base_url, "gateway connected");
        Ok(Self { write, read })
    }

    /// Next decoded envelope, or None once the socket is closed. Heartbeat
    /// pings are answered by the transport and never surface here.
    pub async fn next_event(&mut self) -> Option<Result<Envelope, ClientError>> {
        while let Some(frame) = self.read.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => return Some(Err(err.into())),
            };
            match frame {
                Message::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).map_err(Into::into));
                }
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    }

    /// Start receiving a chat's topic (viewer opened the chat).
    pub async fn subscribe_chat(&mut self, chat_id: Uuid) -> Result<(), ClientError> {
        self.send(&ClientCommand::SubscribeChat { chat_id }).await
    }

    /// Stop receiving a chat's topic (viewer left the chat).
    pub async fn unsubscribe_chat(&mut self, chat_id: Uuid) -> Result<(), ClientError> {
        self.send(&ClientCommand::UnsubscribeChat { chat_id }).await
    }

    pub async fn send(&mut self, command: &ClientCommand) -> Result<(), ClientError> {
        let json = serde_json::to_string(command).unwrap();
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Close the socket cleanly.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}

fn gateway_url(base_url: &str, token: &str) -> String {
    let base = base_url
        .replace("http://", "ws://")
        .replace("https://", "wss://");
    format!("{}/gateway?token={}", base.trim_end_matches('/'), token)
}
