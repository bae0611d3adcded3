//! Per-viewer filtering and snapshot assembly
//!
//! The admin sees every item; everyone else sees only their own. Snapshots
//! carry the materialized display value so clients never re-derive server
//! time arithmetic.

use crate::engine::Item;
use crate::registry::UserRegistry;
use crate::store::ItemStore;
use shared::{ItemKind, ItemSnapshot, ADMIN_USER_ID};

/// Items visible to `viewer`, ordered by item id.
pub fn items_for(
    store: &ItemStore,
    registry: &UserRegistry,
    viewer: &str,
    now_ms: u64,
) -> Vec<ItemSnapshot> {
    let mut items: Vec<ItemSnapshot> = store
        .iter()
        .filter(|item| viewer == ADMIN_USER_ID || item.owner == viewer)
        .map(|item| snapshot(item, registry, now_ms))
        .collect();
    items.sort_by_key(|s| s.id);
    items
}

fn snapshot(item: &Item, registry: &UserRegistry, now_ms: u64) -> ItemSnapshot {
    let display_ms = item.materialize(now_ms);
    let remaining_secs = match item.kind() {
        ItemKind::Stopwatch => None,
        ItemKind::Countdown => Some(display_ms as f64 / 1000.0),
    };

    ItemSnapshot {
        id: item.id,
        name: item.name.clone(),
        kind: item.kind(),
        is_running: item.is_running,
        user_id: item.owner.clone(),
        user_name: registry.display_name(&item.owner),
        display_ms,
        duration_secs: item.duration_secs(),
        remaining_secs,
    }
}
