//! Online membership driven by the gateway's presence channel.

use std::collections::HashSet;

use uuid::Uuid;

use tincan_types::events::SyncEvent;

/// Which users currently have at least one live gateway connection.
///
/// The snapshot sent on subscribe is authoritative and replaces local state
/// wholesale; join and leave deltas apply between snapshots, so a missed
/// delta heals on the next snapshot.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashSet<Uuid>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a gateway event through. Returns whether membership changed;
    /// non-presence events are ignored.
    pub fn apply(&mut self, event: &SyncEvent) -> bool {
        match event {
            SyncEvent::PresenceState { user_ids } => {
                let next: HashSet<Uuid> = user_ids.iter().copied().collect();
                let changed = next != self.online;
                self.online = next;
                changed
            }
            SyncEvent::PresenceJoin { user_id } => self.online.insert(*user_id),
            SyncEvent::PresenceLeave { user_id } => self.online.remove(user_id),
            _ => false,
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online.contains(&user_id)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}
