//! Parallel route slots as resolved by the router.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a route segment or parallel slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The root layout.
    pub fn root() -> Self {
        Self::new("root")
    }
}

impl From<&str> for SlotId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A slot in the resolved route tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub id: SlotId,
    pub parent: Option<SlotId>,
    pub depth: u32,
    /// On the matched path for the current URL.
    pub matched: bool,
    /// Rendering a `default` placeholder because nothing matched.
    pub is_default: bool,
}

impl SlotInfo {
    /// Active slots supply metadata that wins dedup ties.
    pub fn is_active(&self) -> bool {
        self.matched && !self.is_default
    }
}

/// Dedup priority of a fragment source.
///
/// Ordered by tier, then depth: active slots beat default or non-matching
/// slots, which beat route defaults; deeper segments beat their ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotRank {
    tier: u8,
    depth: u32,
}

impl SlotRank {
    /// Rank of route-level defaults.
    pub const ROUTE_DEFAULT: SlotRank = SlotRank { tier: 0, depth: 0 };

    pub fn is_active(&self) -> bool {
        self.tier == 2
    }
}

/// Resolved tree of route segments and parallel slots.
#[derive(Debug, Clone)]
pub struct RouteTree {
    slots: Vec<SlotInfo>,
    index: HashMap<SlotId, usize>,
}

impl RouteTree {
    /// Tree holding only the root layout.
    pub fn new() -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            index: HashMap::new(),
        };
        tree.insert(SlotInfo {
            id: SlotId::root(),
            parent: None,
            depth: 0,
            matched: true,
            is_default: false,
        });
        tree
    }

    /// Tree with no slots at all; metadata is ready immediately.
    pub fn empty() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a matched segment below `parent`.
    pub fn with_segment(self, id: &str, parent: &str) -> Self {
        self.with_slot(id, parent, true, false)
    }

    /// Add a slot rendering its `default` placeholder.
    pub fn with_default_slot(self, id: &str, parent: &str) -> Self {
        self.with_slot(id, parent, false, true)
    }

    /// Add a slot that does not match the current URL.
    pub fn with_unmatched_slot(self, id: &str, parent: &str) -> Self {
        self.with_slot(id, parent, false, false)
    }

    fn with_slot(mut self, id: &str, parent: &str, matched: bool, is_default: bool) -> Self {
        let parent = SlotId::new(parent);
        let depth = match self.get(&parent) {
            Some(info) => info.depth + 1,
            None => {
                tracing::warn!(slot = id, %parent, "unknown parent slot");
                1
            }
        };
        self.insert(SlotInfo {
            id: SlotId::new(id),
            parent: Some(parent),
            depth,
            matched,
            is_default,
        });
        self
    }

    fn insert(&mut self, info: SlotInfo) {
        if let Some(&i) = self.index.get(&info.id) {
            self.slots[i] = info;
        } else {
            self.index.insert(info.id.clone(), self.slots.len());
            self.slots.push(info);
        }
    }

    /// Look up a slot.
    pub fn get(&self, id: &SlotId) -> Option<&SlotInfo> {
        self.index.get(id).map(|&i| &self.slots[i])
    }

    /// Dedup rank for fragments from `id`. Unknown slots rank with defaults.
    pub fn rank(&self, id: &SlotId) -> SlotRank {
        match self.get(id) {
            Some(info) if info.is_active() => SlotRank {
                tier: 2,
                depth: info.depth,
            },
            Some(info) => SlotRank {
                tier: 1,
                depth: info.depth,
            },
            None => SlotRank { tier: 1, depth: 0 },
        }
    }

    /// The deepest active slot.
    pub fn active_leaf(&self) -> Option<&SlotInfo> {
        self.slots
            .iter()
            .filter(|s| s.is_active())
            .max_by_key(|s| s.depth)
    }

    /// All slots in insertion order.
    pub fn slots(&self) -> &[SlotInfo] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for RouteTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parallel_tree() -> RouteTree {
        RouteTree::new()
            .with_segment("layout", "root")
            .with_segment("@foo", "layout")
            .with_default_slot("@bar", "layout")
    }

    #[test]
    fn test_depths() {
        let tree = parallel_tree();
        assert_eq!(tree.get(&SlotId::root()).unwrap().depth, 0);
        assert_eq!(tree.get(&"@foo".into()).unwrap().depth, 2);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_active_beats_default_and_ancestor() {
        let tree = parallel_tree();
        let foo = tree.rank(&"@foo".into());
        let bar = tree.rank(&"@bar".into());
        let layout = tree.rank(&"layout".into());

        assert!(foo > bar);
        assert!(foo > layout);
        assert!(layout > bar);
        assert!(bar > SlotRank::ROUTE_DEFAULT);
    }

    #[test]
    fn test_active_leaf() {
        let tree = parallel_tree();
        assert_eq!(tree.active_leaf().unwrap().id, SlotId::new("@foo"));
    }

    #[test]
    fn test_unknown_slot_ranks_low() {
        let tree = parallel_tree();
        let unknown = tree.rank(&"@ghost".into());
        assert!(!unknown.is_active());
        assert!(unknown < tree.rank(&SlotId::root()));
    }
}
