//! Identity registry enforcing unique display names
//!
//! Keeps a bidirectional mapping between user ids and display names. A name
//! may belong to at most one user id at a time; re-registration by the same
//! id is idempotent, and registering a new name for an existing id releases
//! the previously held one.

use log::info;
use shared::{UserInfo, UNKNOWN_USER_NAME};
use std::collections::HashMap;
use std::fmt;

/// Registration failure surfaced to the offending connection only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    NameTaken,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::NameTaken => write!(f, "User name already taken."),
        }
    }
}

impl std::error::Error for RegisterError {}

#[derive(Default)]
pub struct UserRegistry {
    /// user id -> display name
    users: HashMap<String, String>,
    /// display name -> user id, for the uniqueness check
    names: HashMap<String, String>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `user_id` to `user_name`. Fails when the name is held by a
    /// different user id. Names are matched case-sensitively.
    pub fn register(&mut self, user_id: &str, user_name: &str) -> Result<(), RegisterError> {
        if let Some(holder) = self.names.get(user_name) {
            if holder != user_id {
                return Err(RegisterError::NameTaken);
            }
        }

        // Re-registering under a new name releases the old binding
        if let Some(previous) = self.users.insert(user_id.to_string(), user_name.to_string()) {
            if previous != user_name {
                self.names.remove(&previous);
            }
        }
        self.names
            .insert(user_name.to_string(), user_id.to_string());

        info!("Registered user {} as {:?}", user_id, user_name);
        Ok(())
    }

    /// Removes both directions of the mapping. No-op for unknown ids.
    pub fn unregister(&mut self, user_id: &str) {
        if let Some(user_name) = self.users.remove(user_id) {
            self.names.remove(&user_name);
            info!("Unregistered user {} ({:?})", user_id, user_name);
        }
    }

    /// Display name for a user id, falling back to a placeholder when the
    /// owner has since disconnected.
    pub fn display_name(&self, user_id: &str) -> String {
        self.users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_USER_NAME.to_string())
    }

    pub fn is_registered(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// All connected identities ordered by user id, for the admin roster.
    pub fn roster(&self) -> Vec<UserInfo> {
        let mut users: Vec<UserInfo> = self
            .users
            .iter()
            .map(|(user_id, user_name)| UserInfo {
                user_id: user_id.clone(),
                user_name: user_name.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
