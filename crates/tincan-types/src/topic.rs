//! Pub/sub channel naming.
//!
//! Chat topics carry message-level events for one chat, personal topics carry
//! chat-list-level updates for one user, and a single shared presence channel
//! tracks who is connected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Topic {
    /// All subscribers currently viewing (or having opened) the chat.
    Chat(Uuid),
    /// Catch-all for one user: new-chat notices, deletions, list updates.
    User(Uuid),
    /// Global presence channel shared by every connected client.
    Presence,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Chat(id) => write!(f, "chat.{id}"),
            Topic::User(id) => write!(f, "user.{id}"),
            Topic::Presence => write!(f, "presence"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTopicError(String);

impl fmt::Display for ParseTopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid topic: {}", self.0)
    }
}

impl std::error::Error for ParseTopicError {}

impl FromStr for Topic {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "presence" {
            return Ok(Topic::Presence);
        }
        if let Some(id) = s.strip_prefix("chat.") {
            return id
                .parse()
                .map(Topic::Chat)
                .map_err(|_| ParseTopicError(s.to_string()));
        }
        if let Some(id) = s.strip_prefix("user.") {
            return id
                .parse()
                .map(Topic::User)
                .map_err(|_| ParseTopicError(s.to_string()));
        }
        Err(ParseTopicError(s.to_string()))
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> String {
        topic.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = ParseTopicError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
