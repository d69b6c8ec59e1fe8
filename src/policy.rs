use serde::{Deserialize, Serialize};

/// Describes how a bulk mutation synchronizes with other threads updating the same tree.
///
/// The policy is chosen by the caller on every call, it's never stored in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockingPolicy {
    /// No locking, the caller guarantees a single writer.
    #[default]
    None,
    /// Every element is updated with a compare-and-swap loop.
    Atomic,
    /// One lock held for the whole operation.
    Coarse,
    /// One lock per row of every leaf.
    Fine,
}
