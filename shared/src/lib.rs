use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// User id that is granted visibility into every user's items.
pub const ADMIN_USER_ID: &str = "admin";
/// Name shown when an item's owner is no longer registered.
pub const UNKNOWN_USER_NAME: &str = "Unknown User";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Register {
        user_id: String,
        user_name: String,
    },
    CreateItem {
        name: String,
        kind: ItemKind,
        duration_secs: Option<u64>,
        owner: Option<String>,
    },
    StartItem {
        item_id: u64,
    },
    PauseItem {
        item_id: u64,
    },
    StopItem {
        item_id: u64,
    },
    Heartbeat {
        timestamp: u64,
    },
    Disconnect,

    ActiveItems {
        items: Vec<ItemSnapshot>,
    },
    ConnectedUsers {
        users: Vec<UserInfo>,
    },
    RegistrationError {
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Stopwatch,
    Countdown,
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Stopwatch => "stopwatch",
            ItemKind::Countdown => "countdown",
        }
    }
}

/// Materialized item state as published to clients. `display_ms` is the
/// authoritative display value at the send timestamp; clients extrapolate
/// linearly from it while `is_running` instead of re-deriving server state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ItemSnapshot {
    pub id: u64,
    pub name: String,
    pub kind: ItemKind,
    pub is_running: bool,
    pub user_id: String,
    pub user_name: String,
    pub display_ms: u64,
    pub duration_secs: Option<u64>,
    pub remaining_secs: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub user_id: String,
    pub user_name: String,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_kind_labels() {
        assert_eq!(ItemKind::Stopwatch.label(), "stopwatch");
        assert_eq!(ItemKind::Countdown.label(), "countdown");
    }

    #[test]
    fn test_packet_serialization_register() {
        let packet = Packet::Register {
            user_id: "u1".to_string(),
            user_name: "Alice".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Register { user_id, user_name } => {
                assert_eq!(user_id, "u1");
                assert_eq!(user_name, "Alice");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_active_items() {
        let snapshot = ItemSnapshot {
            id: 7,
            name: "Standup".to_string(),
            kind: ItemKind::Countdown,
            is_running: true,
            user_id: "u1".to_string(),
            user_name: "Alice".to_string(),
            display_ms: 42_500,
            duration_secs: Some(60),
            remaining_secs: Some(42.5),
        };

        let packet = Packet::ActiveItems {
            items: vec![snapshot],
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::ActiveItems { items } => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].id, 7);
                assert_eq!(items[0].kind, ItemKind::Countdown);
                assert!(items[0].is_running);
                assert_eq!(items[0].display_ms, 42_500);
                assert_eq!(items[0].duration_secs, Some(60));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_now_ms_advances() {
        let a = now_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_ms();
        assert!(b > a);
    }
}
