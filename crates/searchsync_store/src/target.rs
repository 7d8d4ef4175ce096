//! Search-index seam: the replica being kept consistent.

use async_trait::async_trait;
use searchsync_core::{Document, DocumentId, SyncResult};
use serde::Serialize;

/// Outcome of one bulk upsert call.
///
/// Version conflicts are counted separately from hard errors: a conflict
/// means a concurrent writer won and the write is stale but self-healing,
/// while an error means the document was rejected outright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    /// Documents applied successfully.
    pub processed: u64,
    /// Documents rejected permanently.
    pub errors: u64,
    /// Documents dropped after exhausting conflict retries.
    pub version_conflicts: u64,
}

impl BulkReport {
    /// Accumulates another report into this one.
    pub fn merge(&mut self, other: BulkReport) {
        self.processed += other.processed;
        self.errors += other.errors;
        self.version_conflicts += other.version_conflicts;
    }

    /// Total documents the call attempted.
    pub fn total(&self) -> u64 {
        self.processed + self.errors + self.version_conflicts
    }

    /// Fraction of attempted documents applied successfully, in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            1.0
        } else {
            self.processed as f64 / total as f64
        }
    }
}

/// The search-index replica.
///
/// Upserts are partial merges (`doc_as_upsert` semantics): existing
/// documents have the given fields merged in, absent documents are
/// created. This makes redelivery idempotent. Implementations retry
/// version conflicts a bounded number of times internally and report the
/// residue in [`BulkReport::version_conflicts`]. Writes return before the
/// index refreshes; read-after-write visibility is not guaranteed.
#[async_trait]
pub trait SearchIndex: Send + Sync + 'static {
    /// Applies one bulk create-or-merge request.
    ///
    /// A per-document rejection is absorbed into the report; only a
    /// whole-call failure (backend unreachable) returns `Err`.
    async fn bulk_upsert(&self, documents: &[Document]) -> SyncResult<BulkReport>;

    /// Deletes a single document. Absence is success; the returned flag
    /// reports whether the document existed.
    async fn delete_one(&self, id: &DocumentId) -> SyncResult<bool>;

    /// Counts all indexed documents.
    async fn count(&self) -> SyncResult<u64>;

    /// Checks whether a document is indexed.
    async fn exists(&self, id: &DocumentId) -> SyncResult<bool>;

    /// Returns up to `limit` identifiers strictly after `after` in the
    /// stable id order.
    ///
    /// Search-after pagination stays correct while the index mutates
    /// concurrently, unlike offset paging.
    async fn page_ids_after(
        &self,
        after: Option<&DocumentId>,
        limit: usize,
    ) -> SyncResult<Vec<DocumentId>>;
}
