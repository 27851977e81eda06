//! Context type for tracing which poll or action produced a notification

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context for tracking the origin and causality of notifications
///
/// Every notification published by a coordinator carries a Context. All
/// notifications produced by one poll share the same context id, so a
/// consumer can group `album_changed` with the specific events fired
/// alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Parent context ID, set when an action triggers a follow-up refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// Create a new context with a specific ID
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
        }
    }

    /// Create a child context with this context as parent
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_links_parent() {
        let parent = Context::new();
        let child = parent.child();

        assert_ne!(parent.id, child.id);
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
    }
}
