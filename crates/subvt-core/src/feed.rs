//! The per-feed adapter contract.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A push feed: its topic, its wire schema and how diffs fold into state.
///
/// One engine type serves every feed; a feed only supplies these pieces.
pub trait Feed: Send + Sync + 'static {
    /// Full state of the feed.
    type Snapshot: Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Partial update carrying only changed fields or entries.
    type Diff: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Topic name sent in the subscribe request.
    fn topic(&self) -> &'static str;

    /// Fold `diff` into `snapshot`, producing the next snapshot.
    ///
    /// Must be total over every diff the backend may send for a live
    /// subscription and must not have side effects. Each diff is applied
    /// exactly once.
    fn merge(&self, snapshot: &Self::Snapshot, diff: &Self::Diff) -> Self::Snapshot;
}
