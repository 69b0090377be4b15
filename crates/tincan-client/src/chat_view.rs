//! Per-open-chat reconciliation.
//!
//! One `ChatView` owns the ordered message list a chat screen renders. It
//! merges paginated history with live gateway events, keeps the
//! sender-grouping annotation current, and tells the embedding UI what to do
//! next through [`Effect`] values. All mutation happens on the caller's event
//! loop; the view itself never fetches or scrolls anything.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use tincan_types::api::HistoryResponse;
use tincan_types::events::SyncEvent;
use tincan_types::models::Message;

/// Fixed history page size.
pub const PAGE_SIZE: u32 = 30;

/// Where the view is in its load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    LoadingInitial,
    LoadingMore,
    Ready,
}

/// A history fetch the embedding layer should run against `GET /messages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub chat_id: Uuid,
    pub page: u32,
    pub limit: u32,
}

/// Side effects the UI must perform after a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Pin the viewport to the newest message.
    ScrollToBottom,
    /// After an older page lands, keep this message where it was on screen
    /// instead of letting the viewport jump to the new top.
    RestoreAnchor { message_id: Uuid },
    /// Fire the mark-seen mutation for this message.
    MarkSeen { message_id: Uuid },
}

/// A message plus its view-layer annotation.
#[derive(Debug, Clone)]
pub struct ViewMessage {
    pub message: Message,
    /// Whether this row shows its sender header: first message of a date
    /// group, or the previous message has a different sender.
    pub display_sender: bool,
}

type OrderKey = (DateTime<Utc>, Uuid);

pub struct ChatView {
    chat_id: Uuid,
    viewer_id: Uuid,
    state: LoadState,
    /// Chronological list keyed by (created_at, id); the id tiebreak keeps
    /// ordering deterministic for equal timestamps.
    messages: BTreeMap<OrderKey, ViewMessage>,
    /// Message id to ordering key, so dedupe and in-place updates are
    /// structural rather than scans.
    index: HashMap<Uuid, OrderKey>,
    /// Next older page to request. Page 1 is the newest.
    next_page: u32,
    /// Set once a short page shows there is nothing older to fetch.
    exhausted: bool,
    focused: bool,
    active: bool,
    at_bottom: bool,
    /// Last id surfaced through `Effect::MarkSeen`, so the derived seen
    /// condition fires at most once per message.
    seen_requested: Option<Uuid>,
}

impl ChatView {
    /// A fresh view for one chat. Opening a chat implies the tab is focused,
    /// the chat is the active screen, and the viewport starts pinned to the
    /// bottom; the setters adjust all three as the UI changes.
    pub fn new(chat_id: Uuid, viewer_id: Uuid) -> Self {
        Self {
            chat_id,
            viewer_id,
            state: LoadState::Idle,
            messages: BTreeMap::new(),
            index: HashMap::new(),
            next_page: 1,
            exhausted: false,
            focused: true,
            active: true,
            at_bottom: true,
            seen_requested: None,
        }
    }

    pub fn chat_id(&self) -> Uuid {
        self.chat_id
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Messages in chronological order, annotated for display.
    pub fn messages(&self) -> impl Iterator<Item = &ViewMessage> {
        self.messages.values()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message_id: Uuid) -> bool {
        self.index.contains_key(&message_id)
    }

    /// Kick off the first page fetch. None when a load already ran or is in
    /// flight.
    pub fn begin_initial_load(&mut self) -> Option<PageRequest> {
        if self.state != LoadState::Idle {
            return None;
        }
        self.state = LoadState::LoadingInitial;
        Some(PageRequest {
            chat_id: self.chat_id,
            page: 1,
            limit: PAGE_SIZE,
        })
    }

    /// Kick off an older-page fetch, triggered when the sentinel at the top
    /// of the scroll region becomes visible. None while a fetch is pending,
    /// before the initial page, or once history is exhausted.
    pub fn begin_load_older(&mut self) -> Option<PageRequest> {
        if self.state != LoadState::Ready || self.exhausted {
            return None;
        }
        self.state = LoadState::LoadingMore;
        Some(PageRequest {
            chat_id: self.chat_id,
            page: self.next_page,
            limit: PAGE_SIZE,
        })
    }

    /// Merge a history page. Responses carrying another chat's id are late
    /// replies meant for a view that no longer exists and are dropped; so
    /// are pages arriving when no fetch is pending.
    pub fn apply_history(&mut self, response: &HistoryResponse) -> Vec<Effect> {
        if response.chat_id != self.chat_id {
            debug!(
                got = %response.chat_id,
                want = %self.chat_id,
                "discarding stale history page"
            );
            return Vec::new();
        }
        let phase = self.state;
        if phase != LoadState::LoadingInitial && phase != LoadState::LoadingMore {
            debug!(page = response.page, "discarding history page with no fetch pending");
            return Vec::new();
        }

        let anchor = self.messages.values().next().map(|m| m.message.id);
        let mut inserted = 0usize;
        for message in &response.messages {
            if self.insert(message.clone()) {
                inserted += 1;
            }
        }
        if (response.messages.len() as u32) < PAGE_SIZE {
            self.exhausted = true;
        }
        self.next_page = response.page.saturating_add(1);
        self.state = LoadState::Ready;
        if inserted > 0 {
            self.reannotate();
        }

        let mut effects = Vec::new();
        match phase {
            LoadState::LoadingInitial => effects.push(Effect::ScrollToBottom),
            LoadState::LoadingMore => {
                if inserted > 0 {
                    if let Some(message_id) = anchor {
                        effects.push(Effect::RestoreAnchor { message_id });
                    }
                }
            }
            _ => {}
        }
        effects.extend(self.seen_effect());
        effects
    }

    /// Merge a live gateway event. Message events for other chats and
    /// non-message events are ignored.
    pub fn apply_event(&mut self, event: &SyncEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            SyncEvent::MessageNew { message } if message.chat_id == self.chat_id => {
                if self.insert(message.clone()) {
                    self.reannotate();
                    if self.at_bottom {
                        effects.push(Effect::ScrollToBottom);
                    }
                }
            }
            SyncEvent::MessageUpdate { message } if message.chat_id == self.chat_id => {
                if self.replace(message.clone()) {
                    self.reannotate();
                }
            }
            SyncEvent::MessageDelete { message_id } => {
                if self.remove(*message_id) {
                    self.reannotate();
                }
            }
            _ => {}
        }
        effects.extend(self.seen_effect());
        effects
    }

    /// Roll back a failed fetch so the view can retry.
    pub fn load_failed(&mut self) {
        self.state = match self.state {
            LoadState::LoadingInitial => LoadState::Idle,
            LoadState::LoadingMore => LoadState::Ready,
            other => other,
        };
    }

    /// Tab focus changed.
    pub fn set_focused(&mut self, focused: bool) -> Vec<Effect> {
        self.focused = focused;
        self.seen_effect().into_iter().collect()
    }

    /// The viewer navigated onto or away from this chat's screen.
    pub fn set_active(&mut self, active: bool) -> Vec<Effect> {
        self.active = active;
        self.seen_effect().into_iter().collect()
    }

    /// Viewport pinned state; new messages only auto-scroll while pinned.
    pub fn set_at_bottom(&mut self, at_bottom: bool) {
        self.at_bottom = at_bottom;
    }

    fn insert(&mut self, message: Message) -> bool {
        if self.index.contains_key(&message.id) {
            return false;
        }
        let key = (message.created_at, message.id);
        self.index.insert(message.id, key);
        self.messages.insert(
            key,
            ViewMessage {
                message,
                display_sender: false,
            },
        );
        true
    }

    fn replace(&mut self, message: Message) -> bool {
        let Some(&key) = self.index.get(&message.id) else {
            return false;
        };
        let new_key = (message.created_at, message.id);
        if new_key == key {
            if let Some(slot) = self.messages.get_mut(&key) {
                slot.message = message;
            }
        } else {
            self.messages.remove(&key);
            self.index.insert(message.id, new_key);
            self.messages.insert(
                new_key,
                ViewMessage {
                    message,
                    display_sender: false,
                },
            );
        }
        true
    }

    fn remove(&mut self, message_id: Uuid) -> bool {
        match self.index.remove(&message_id) {
            Some(key) => self.messages.remove(&key).is_some(),
            None => false,
        }
    }

    /// Recompute `display_sender` over the whole list. A row shows its
    /// header when its (date, sender) group differs from the previous row's.
    /// Idempotent on an unchanged list.
    fn reannotate(&mut self) {
        let mut prev: Option<(NaiveDate, Uuid)> = None;
        for slot in self.messages.values_mut() {
            let group = (slot.message.created_at.date_naive(), slot.message.sender_id);
            slot.display_sender = prev != Some(group);
            prev = Some(group);
        }
    }

    /// The derived mark-seen condition: last message in the list, sent by
    /// the other participant, not yet seen by the viewer, while the tab is
    /// focused and this chat is the active screen. Re-evaluated after every
    /// relevant change; surfaces each message id at most once.
    fn seen_effect(&mut self) -> Option<Effect> {
        if !(self.focused && self.active) {
            return None;
        }
        let last = self.messages.values().next_back()?;
        let message = &last.message;
        if message.sender_id == self.viewer_id || message.seen_by_user(self.viewer_id) {
            return None;
        }
        let message_id = message.id;
        if self.seen_requested == Some(message_id) {
            return None;
        }
        self.seen_requested = Some(message_id);
        Some(Effect::MarkSeen { message_id })
    }
}
