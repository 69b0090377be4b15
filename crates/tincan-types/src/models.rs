use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed set of reaction bodies the service accepts. Anything else is
/// rejected at the API boundary before it reaches the store.
pub const ALLOWED_REACTIONS: &[&str] = &["👍", "❤️", "😂", "😮", "😢", "🔥"];

/// Whether `body` is one of the permitted reaction emoji.
pub fn reaction_allowed(body: &str) -> bool {
    ALLOWED_REACTIONS.contains(&body)
}

/// Public view of a user. Password hashes never leave tincan-db.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Unique handle; None until backfilled on first session refresh.
    pub username: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A two-party chat. Exactly two participants, stored in creation order;
/// the *unordered* pair uniquely identifies the chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_ids: [Uuid; 2],
    /// Expanded participants, same order as `user_ids`.
    pub users: Vec<User>,
    /// Participants who muted this chat (subset of `user_ids`).
    pub muted_by: Vec<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Most recent message, when one exists. Drives chat-list previews.
    pub latest_message: Option<Message>,
}

impl Chat {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.user_ids.contains(&user_id)
    }

    /// The participant that isn't `user_id`. Total for any valid member id;
    /// None when `user_id` is not a participant at all.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        match self.user_ids {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn is_muted_by(&self, user_id: Uuid) -> bool {
        self.muted_by.contains(&user_id)
    }
}

/// A message inside a chat. `seen_by` contains the sender from creation and
/// only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    /// Expanded sender.
    pub sender: User,
    pub body: Option<String>,
    pub image: Option<String>,
    /// Message this one replies to, if any.
    pub reply_to: Option<Uuid>,
    pub seen_by: Vec<Uuid>,
    pub reactions: Vec<Reaction>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn seen_by_user(&self, user_id: Uuid) -> bool {
        self.seen_by.contains(&user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: Uuid) -> User {
        User {
            id,
            name: "u".into(),
            username: None,
            image: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_other_participant_total() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let chat = Chat {
            id: Uuid::new_v4(),
            user_ids: [a, b],
            users: vec![user(a), user(b)],
            muted_by: vec![],
            last_message_at: Utc::now(),
            created_at: Utc::now(),
            latest_message: None,
        };

        assert_eq!(chat.other_participant(a), Some(b));
        assert_eq!(chat.other_participant(b), Some(a));
        assert_eq!(chat.other_participant(Uuid::new_v4()), None);
    }

    #[test]
    fn test_reaction_allowed() {
        assert!(reaction_allowed("❤️"));
        assert!(!reaction_allowed("🦀"));
        assert!(!reaction_allowed(""));
    }
}
