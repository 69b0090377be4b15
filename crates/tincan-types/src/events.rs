use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Chat, Message, User};
use crate::topic::Topic;

/// Events fanned out over the gateway. Wire names are stable; clients key
/// their merge logic on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SyncEvent {
    /// A chat was created with the recipient as the other participant.
    #[serde(rename = "chat:new")]
    ChatNew { chat: Chat },

    /// Chat-list-level refresh: latest message (or seen state) changed.
    #[serde(rename = "chat:update")]
    ChatUpdate {
        chat_id: Uuid,
        latest_message: Option<Message>,
    },

    /// A chat was deleted by one of its participants.
    #[serde(rename = "chat:delete")]
    ChatDelete {
        deleted_chat_id: Uuid,
        remover_id: Uuid,
    },

    /// A message was posted to the chat.
    #[serde(rename = "message:new")]
    MessageNew { message: Message },

    /// A message changed in place: seen set grew or reactions toggled.
    /// Carries the full updated message.
    #[serde(rename = "message:update")]
    MessageUpdate { message: Message },

    /// A message was removed by its sender.
    #[serde(rename = "message:delete")]
    MessageDelete { message_id: Uuid },

    /// Delivered to each other participant's personal topic.
    #[serde(rename = "chat:start-typing")]
    StartTyping { typing_user: User },

    /// Delivered on the chat topic, unlike start-typing which targets each
    /// other participant's personal topic.
    #[serde(rename = "chat:end-typing")]
    EndTyping { typing_user: User },

    /// Authoritative snapshot of connected users, sent on subscribe.
    #[serde(rename = "presence:state")]
    PresenceState { user_ids: Vec<Uuid> },

    /// Incremental delta: a user connected.
    #[serde(rename = "presence:join")]
    PresenceJoin { user_id: Uuid },

    /// Incremental delta: a user's last connection closed.
    #[serde(rename = "presence:leave")]
    PresenceLeave { user_id: Uuid },
}

impl SyncEvent {
    /// Wire name, for logs and tests.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::ChatNew { .. } => "chat:new",
            SyncEvent::ChatUpdate { .. } => "chat:update",
            SyncEvent::ChatDelete { .. } => "chat:delete",
            SyncEvent::MessageNew { .. } => "message:new",
            SyncEvent::MessageUpdate { .. } => "message:update",
            SyncEvent::MessageDelete { .. } => "message:delete",
            SyncEvent::StartTyping { .. } => "chat:start-typing",
            SyncEvent::EndTyping { .. } => "chat:end-typing",
            SyncEvent::PresenceState { .. } => "presence:state",
            SyncEvent::PresenceJoin { .. } => "presence:join",
            SyncEvent::PresenceLeave { .. } => "presence:leave",
        }
    }
}

/// What actually travels on the wire: the event plus the topic it was
/// published on, so clients can route without guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: Topic,
    #[serde(flatten)]
    pub event: SyncEvent,
}

/// Commands a connected client sends upstream over the gateway socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", content = "data")]
pub enum ClientCommand {
    /// Start receiving this chat's topic (viewer opened the chat).
    #[serde(rename = "subscribe:chat")]
    SubscribeChat { chat_id: Uuid },

    /// Stop receiving this chat's topic (viewer left the chat).
    #[serde(rename = "unsubscribe:chat")]
    UnsubscribeChat { chat_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_names() {
        let ev = SyncEvent::MessageDelete {
            message_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "message:delete");
        assert_eq!(json["data"]["message_id"], Uuid::nil().to_string());
    }

    #[test]
    fn test_envelope_shape() {
        let chat_id = Uuid::new_v4();
        let env = Envelope {
            topic: Topic::Chat(chat_id),
            event: SyncEvent::MessageDelete {
                message_id: Uuid::nil(),
            },
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["topic"], format!("chat.{chat_id}"));
        assert_eq!(json["event"], "message:delete");

        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_client_command_round_trip() {
        let chat_id = Uuid::new_v4();
        let cmd = ClientCommand::SubscribeChat { chat_id };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("subscribe:chat"));
        let back: ClientCommand = serde_json::from_str(&json).unwrap();
        match back {
            ClientCommand::SubscribeChat { chat_id: id } => assert_eq!(id, chat_id),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
