//! Source store seam: the authoritative document store.

use async_trait::async_trait;
use searchsync_core::{ChangeEvent, Document, DocumentId, SyncResult};

/// A handle on the source's change feed.
///
/// Events arrive in commit order. The feed is consumed as a blocking
/// receive loop: the caller awaits one event, fully processes it, then
/// requests the next, so a slow downstream pauses the feed rather than
/// buffering it unboundedly.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Receives the next event.
    ///
    /// Returns `Ok(None)` when the feed closed cleanly; an `Err` signals
    /// an interruption (connection drop, cursor invalidation) after which
    /// the feed must be reopened via [`SourceStore::watch`].
    async fn next(&mut self) -> SyncResult<Option<ChangeEvent>>;

    /// Closes the feed handle. Subsequent `next` calls return `Ok(None)`.
    fn close(&mut self);
}

/// The authoritative document store.
///
/// All scans use the lexicographic id order as their stable sort.
#[async_trait]
pub trait SourceStore: Send + Sync + 'static {
    /// Counts all documents.
    async fn count(&self) -> SyncResult<u64>;

    /// Returns one page of documents, skip/limit over the stable order.
    ///
    /// Concurrent writes during a long scan can cause skip-based paging
    /// to skip or repeat documents; callers accept this approximation.
    async fn find_page(&self, skip: u64, limit: usize) -> SyncResult<Vec<Document>>;

    /// Looks up a single document.
    async fn find_by_id(&self, id: &DocumentId) -> SyncResult<Option<Document>>;

    /// Fetches the given documents in one round trip.
    ///
    /// Identifiers that no longer exist are silently absent from the
    /// result.
    async fn fetch_many(&self, ids: &[DocumentId]) -> SyncResult<Vec<Document>>;

    /// Returns every document identifier (projection-only, no bodies).
    async fn all_ids(&self) -> SyncResult<Vec<DocumentId>>;

    /// Opens a change feed over insert/update/replace/delete events,
    /// resolving the full current document where possible.
    async fn watch(&self) -> SyncResult<Box<dyn ChangeFeed>>;
}
