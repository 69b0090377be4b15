//! Unseen-count badge derivation.
//!
//! A pure function of the chat's message list and the viewer's focus
//! context. Recomputed whenever the list changes; nothing here is stored or
//! independently mutated.

use uuid::Uuid;

use tincan_types::models::Message;

/// What the viewer is looking at right now.
#[derive(Debug, Clone, Copy)]
pub struct ViewerContext {
    pub viewer_id: Uuid,
    /// The browser tab (or window) has focus.
    pub focused: bool,
    /// Chat screen currently on display, if any.
    pub active_chat: Option<Uuid>,
}

impl ViewerContext {
    pub fn new(viewer_id: Uuid) -> Self {
        Self {
            viewer_id,
            focused: false,
            active_chat: None,
        }
    }

    /// Whether the viewer is actively looking at `chat_id`.
    pub fn viewing(&self, chat_id: Uuid) -> bool {
        self.focused && self.active_chat == Some(chat_id)
    }
}

/// How many of the other participant's messages the viewer has not seen.
///
/// Zero when the chat is empty, when the viewer is actively looking at it,
/// or when the last message is already the viewer's own or in their seen
/// set. Otherwise: the other participant's messages strictly after the most
/// recent message the viewer has seen, or all of them if none.
pub fn unseen_count(chat_id: Uuid, messages: &[Message], ctx: &ViewerContext) -> usize {
    let Some(last) = messages.last() else {
        return 0;
    };
    if ctx.viewing(chat_id)
        || last.sender_id == ctx.viewer_id
        || last.seen_by_user(ctx.viewer_id)
    {
        return 0;
    }
    let last_seen = messages.iter().rposition(|m| m.seen_by_user(ctx.viewer_id));
    let start = last_seen.map_or(0, |i| i + 1);
    messages[start..]
        .iter()
        .filter(|m| m.sender_id != ctx.viewer_id)
        .count()
}
