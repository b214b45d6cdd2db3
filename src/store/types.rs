//! Core types of the shared list
//!
//! - `Item`: one entry of a list
//! - `Scope`: which list a request operates on, and the key layout derived
//!   from it

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Root of every item key
pub const KEY_ROOT: &str = "item";

/// Namespace prefix shared by all users
pub const GLOBAL_PREFIX: &str = "g";

/// Namespace prefix whose lists belong to a single user
pub const PERSONAL_PREFIX: &str = "my";

/// Namespace used when the client names none
pub const DEFAULT_NAMESPACE: &str = "default";

/// One entry of a shared list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_checked: bool,
}

impl Item {
    /// Create an unchecked item with a fresh uid
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            name: name.into(),
            category: category.into(),
            is_checked: false,
        }
    }
}

/// The list a request addresses.
///
/// Keys look like:
///
/// ```text
/// item:g:default:<uid>        shared list "default"
/// item:my:alice:work:<uid>    alice's personal list "work"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub prefix: String,
    pub username: String,
    pub namespace: String,
}

impl Scope {
    pub fn new(
        prefix: impl Into<String>,
        username: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            username: username.into(),
            namespace: namespace.into(),
        }
    }

    /// Shared list `namespace`
    pub fn global(namespace: impl Into<String>) -> Self {
        Self::new(GLOBAL_PREFIX, "", namespace)
    }

    fn base(&self) -> String {
        let mut parts = vec![KEY_ROOT, self.prefix.as_str()];
        if self.prefix == PERSONAL_PREFIX {
            parts.push(self.username.as_str());
        }
        parts.push(self.namespace.as_str());
        parts.join(":")
    }

    /// Key of one item in this list
    pub fn item_key(&self, uid: &str) -> String {
        format!("{}:{}", self.base(), uid)
    }

    /// Prefix shared by every key of this list
    pub fn key_prefix(&self) -> String {
        format!("{}:", self.base())
    }
}
