use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tincan_types::events::{ClientCommand, Envelope, SyncEvent};
use tincan_types::topic::Topic;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive a pre-authenticated WebSocket connection. The token was already
/// validated at the HTTP upgrade layer, so this goes straight to the
/// presence snapshot and the event loop.
pub async fn handle_socket(socket: WebSocket, dispatcher: Dispatcher, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    info!("user {} connected to gateway", user_id);

    // Subscribe to the firehose before snapshotting so no join or leave can
    // fall between the snapshot and the first delta.
    let (conn_id, mut user_rx) = dispatcher.register(user_id).await;
    let mut broadcast_rx = dispatcher.subscribe();

    let snapshot = Envelope {
        topic: Topic::Presence,
        event: SyncEvent::PresenceState {
            user_ids: dispatcher.online_snapshot().await,
        },
    };
    if sender
        .send(Message::Text(
            serde_json::to_string(&snapshot).unwrap().into(),
        ))
        .await
        .is_err()
    {
        dispatcher.unregister(user_id, conn_id).await;
        return;
    }

    dispatcher.user_online(user_id).await;

    // Per-connection chat subscriptions (shared between send and recv tasks).
    let subscribed_chats: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed_chats.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcast + targeted envelopes to the client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("broadcast receiver lagged by {} envelopes", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Topic::Chat(chat_id) = envelope.topic {
                        let subs = send_subscriptions
                            .read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&chat_id) {
                            continue;
                        }
                    }

                    let text = serde_json::to_string(&envelope).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let envelope = match result {
                        Some(envelope) => envelope,
                        None => break,
                    };
                    let text = serde_json::to_string(&envelope).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read subscription commands from the client.
    let recv_subscriptions = subscribed_chats.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(ClientCommand::SubscribeChat { chat_id }) => {
                        debug!("user {} subscribed to chat {}", user_id, chat_id);
                        recv_subscriptions
                            .write()
                            .expect("subscription lock poisoned")
                            .insert(chat_id);
                    }
                    Ok(ClientCommand::UnsubscribeChat { chat_id }) => {
                        debug!("user {} unsubscribed from chat {}", user_id, chat_id);
                        recv_subscriptions
                            .write()
                            .expect("subscription lock poisoned")
                            .remove(&chat_id);
                    }
                    Err(e) => {
                        let preview: String = text.chars().take(200).collect();
                        warn!("user {} bad command: {} -- raw: {}", user_id, e, preview);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever side finishes first tears down the other.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id, conn_id).await;
    info!("user {} disconnected from gateway", user_id);
}
