use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use tincan_types::events::{Envelope, SyncEvent};
use tincan_types::topic::Topic;

/// Fan-out hub between mutation handlers and gateway connections.
///
/// Chat and presence envelopes go over a single broadcast channel; each
/// connection filters chat envelopes against its own subscription set.
/// Personal-topic envelopes bypass the broadcast and go straight down the
/// recipient's targeted channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Shared firehose for chat and presence envelopes.
    broadcast_tx: broadcast::Sender<Envelope>,

    /// Currently online user ids.
    online: RwLock<HashSet<Uuid>>,

    /// Per-user targeted channels: user_id -> (conn_id, sender). A reconnect
    /// replaces the entry; the old connection's teardown carries a stale
    /// conn_id and leaves the new entry alone.
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<Envelope>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online: RwLock::new(HashSet::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to the broadcast firehose. Returns a receiver that sees
    /// every chat and presence envelope.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event on a topic. Delivery is best-effort: a send with no
    /// listeners (or to a closed targeted channel) is dropped silently.
    pub async fn publish(&self, topic: Topic, event: SyncEvent) {
        let envelope = Envelope { topic, event };
        match topic {
            Topic::User(user_id) => {
                let channels = self.inner.user_channels.read().await;
                if let Some((_, tx)) = channels.get(&user_id) {
                    let _ = tx.send(envelope);
                }
            }
            Topic::Chat(_) | Topic::Presence => {
                let _ = self.inner.broadcast_tx.send(envelope);
            }
        }
    }

    /// Register a targeted channel for a user's connection.
    /// Returns (conn_id, receiver).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<Envelope>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Remove a user's targeted channel, but only if conn_id still owns it.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Mark a user online and announce the join on the presence topic.
    pub async fn user_online(&self, user_id: Uuid) {
        self.inner.online.write().await.insert(user_id);
        self.publish(Topic::Presence, SyncEvent::PresenceJoin { user_id })
            .await;
    }

    /// Tear down a connection's presence. A no-op when a newer connection
    /// for the same user has already taken over.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels
                .get(&user_id)
                .map_or(false, |(cid, _)| *cid == conn_id)
        };
        if !is_current {
            return;
        }

        self.inner.online.write().await.remove(&user_id);
        self.unregister(user_id, conn_id).await;

        self.publish(Topic::Presence, SyncEvent::PresenceLeave { user_id })
            .await;
    }

    /// Sorted snapshot of online user ids.
    pub async fn online_snapshot(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.inner.online.read().await.iter().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_publish_reaches_broadcast_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let chat_id = Uuid::new_v4();

        dispatcher
            .publish(
                Topic::Chat(chat_id),
                SyncEvent::MessageDelete {
                    message_id: Uuid::nil(),
                },
            )
            .await;

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.topic, Topic::Chat(chat_id));
        assert_eq!(envelope.event.name(), "message:delete");
    }

    #[tokio::test]
    async fn test_user_publish_targets_only_the_recipient() {
        let dispatcher = Dispatcher::new();
        let mut broadcast_rx = dispatcher.subscribe();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (_, mut alice_rx) = dispatcher.register(alice).await;
        let (_, mut bob_rx) = dispatcher.register(bob).await;

        dispatcher
            .publish(
                Topic::User(alice),
                SyncEvent::ChatUpdate {
                    chat_id: Uuid::new_v4(),
                    latest_message: None,
                },
            )
            .await;

        let envelope = alice_rx.recv().await.unwrap();
        assert_eq!(envelope.topic, Topic::User(alice));
        assert!(bob_rx.try_recv().is_err());
        assert!(broadcast_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_listeners_is_silent() {
        let dispatcher = Dispatcher::new();
        // Neither a broadcast subscriber nor a registered channel exists.
        dispatcher
            .publish(
                Topic::User(Uuid::new_v4()),
                SyncEvent::MessageDelete {
                    message_id: Uuid::nil(),
                },
            )
            .await;
        dispatcher
            .publish(Topic::Presence, SyncEvent::PresenceState { user_ids: vec![] })
            .await;
    }

    #[tokio::test]
    async fn test_online_and_offline_emit_presence_deltas() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (conn_id, _rx) = dispatcher.register(user).await;
        let mut broadcast_rx = dispatcher.subscribe();

        dispatcher.user_online(user).await;
        assert_eq!(dispatcher.online_snapshot().await, vec![user]);
        let join = broadcast_rx.recv().await.unwrap();
        assert_eq!(join.event, SyncEvent::PresenceJoin { user_id: user });

        dispatcher.user_offline(user, conn_id).await;
        assert!(dispatcher.online_snapshot().await.is_empty());
        let leave = broadcast_rx.recv().await.unwrap();
        assert_eq!(leave.event, SyncEvent::PresenceLeave { user_id: user });
    }

    #[tokio::test]
    async fn test_stale_conn_id_does_not_tear_down_newer_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register(user).await;
        dispatcher.user_online(user).await;

        // Reconnect: a fresh channel replaces the old one.
        let (_new_conn, mut new_rx) = dispatcher.register(user).await;
        dispatcher.user_online(user).await;

        // The old connection's teardown must not take the user offline.
        dispatcher.user_offline(user, old_conn).await;
        assert_eq!(dispatcher.online_snapshot().await, vec![user]);

        dispatcher
            .publish(
                Topic::User(user),
                SyncEvent::MessageDelete {
                    message_id: Uuid::nil(),
                },
            )
            .await;
        assert!(new_rx.recv().await.is_some());
    }
}
