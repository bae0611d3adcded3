//! Single source of truth for all time-tracking items
//!
//! The store exclusively owns every [`Item`]; the rest of the server only
//! ever receives materialized copies through the view layer. All mutation
//! funnels through the command handlers and the tick loop, which run on the
//! same event loop, so no locking is needed here.

use crate::engine::Item;
use log::{debug, info, warn};
use shared::ItemKind;
use std::collections::HashMap;

pub struct ItemStore {
    items: HashMap<u64, Item>,
    /// Monotonic id source. Wall-clock ids collide under rapid creation;
    /// a counter cannot.
    next_item_id: u64,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            next_item_id: 1,
        }
    }

    /// Creates an item and returns its id. Returns None when the request is
    /// invalid (empty name, or a countdown without a positive duration);
    /// invalid requests are logged and otherwise ignored.
    pub fn create(
        &mut self,
        name: &str,
        kind: ItemKind,
        duration_secs: Option<u64>,
        owner: &str,
    ) -> Option<u64> {
        if name.trim().is_empty() {
            warn!("Rejected item creation with empty name for {}", owner);
            return None;
        }

        let id = self.next_item_id;
        let item = match kind {
            ItemKind::Stopwatch => Item::stopwatch(id, name.to_string(), owner.to_string()),
            ItemKind::Countdown => {
                let duration = match duration_secs {
                    Some(d) if d > 0 => d,
                    _ => {
                        warn!(
                            "Rejected countdown {:?} for {} without a positive duration",
                            name, owner
                        );
                        return None;
                    }
                };
                Item::countdown(id, name.to_string(), owner.to_string(), duration)
            }
        };

        self.next_item_id += 1;
        info!("Created {} {} ({:?}) for {}", kind.label(), id, name, owner);
        self.items.insert(id, item);
        Some(id)
    }

    /// Starts an item. Unknown ids are tolerated: a command racing a stop
    /// is expected, not an error.
    pub fn start(&mut self, id: u64, now_ms: u64) {
        match self.items.get_mut(&id) {
            Some(item) => {
                if !item.start(now_ms) {
                    debug!("Refused start of exhausted countdown {}", id);
                }
            }
            None => debug!("start-item for unknown item {}", id),
        }
    }

    pub fn pause(&mut self, id: u64, now_ms: u64) {
        match self.items.get_mut(&id) {
            Some(item) => item.pause(now_ms),
            None => debug!("pause-item for unknown item {}", id),
        }
    }

    /// Removes an item. Removal is immediate and irreversible; removing an
    /// already-absent id is a no-op.
    pub fn stop(&mut self, id: u64) {
        if self.items.remove(&id).is_some() {
            info!("Removed item {}", id);
        } else {
            debug!("stop-item for unknown item {}", id);
        }
    }

    /// Runs the expiry check over every item. Returns true when at least
    /// one countdown transitioned to paused-at-zero.
    pub fn tick_all(&mut self, now_ms: u64) -> bool {
        let mut any_expired = false;
        for item in self.items.values_mut() {
            if item.expire(now_ms) {
                info!("Countdown {} ({:?}) expired", item.id, item.name);
                any_expired = true;
            }
        }
        any_expired
    }

    pub fn get(&self, id: u64) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
