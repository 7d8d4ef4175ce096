//! In-memory store implementations.
//!
//! Used by the test suites and the loopback control surface. The index
//! supports failure injection so engine tests can exercise retry,
//! conflict accounting and per-document rejection without a backend.

use crate::source::{ChangeFeed, SourceStore};
use crate::target::{BulkReport, SearchIndex};
use async_trait::async_trait;
use parking_lot::RwLock;
use searchsync_core::{ChangeEvent, Document, DocumentId, SyncError, SyncResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

type FeedItem = SyncResult<ChangeEvent>;

const FEED_BUFFER: usize = 1024;

/// An in-memory source store with a change feed.
#[derive(Default)]
pub struct MemorySource {
    docs: RwLock<BTreeMap<DocumentId, Document>>,
    subscribers: RwLock<Vec<mpsc::Sender<FeedItem>>>,
    unreachable: AtomicBool,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source seeded with documents (no feed events emitted).
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let source = Self::new();
        {
            let mut docs = source.docs.write();
            for doc in documents {
                docs.insert(doc.id.clone(), doc);
            }
        }
        source
    }

    /// Marks the store unreachable; every call fails retryably until
    /// cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns true if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Inserts or replaces a document, emitting the matching feed event.
    pub fn put(&self, document: Document) {
        let existed = self
            .docs
            .write()
            .insert(document.id.clone(), document.clone())
            .is_some();
        let event = if existed {
            ChangeEvent::update(document)
        } else {
            ChangeEvent::insert(document)
        };
        self.emit_event(event);
    }

    /// Inserts or replaces a document without emitting a feed event,
    /// simulating a change the feed never delivered.
    pub fn put_silent(&self, document: Document) {
        self.docs.write().insert(document.id.clone(), document);
    }

    /// Removes a document, emitting a delete event.
    pub fn remove(&self, id: &DocumentId) {
        self.docs.write().remove(id);
        self.emit_event(ChangeEvent::delete(id.clone()));
    }

    /// Emits an arbitrary event to all open feeds.
    pub fn emit_event(&self, event: ChangeEvent) {
        self.subscribers
            .write()
            .retain(|tx| tx.try_send(Ok(event.clone())).is_ok());
    }

    /// Emits a feed-level error to all open feeds, simulating an
    /// interruption such as a dropped connection.
    pub fn emit_feed_error(&self, message: &str) {
        self.subscribers
            .write()
            .retain(|tx| tx.try_send(Err(SyncError::Feed(message.to_string()))).is_ok());
    }

    /// Closes all open feeds from the server side.
    pub fn close_feeds(&self) {
        self.subscribers.write().clear();
    }

    fn check_reachable(&self) -> SyncResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(SyncError::backend_retryable("source unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn count(&self) -> SyncResult<u64> {
        self.check_reachable()?;
        Ok(self.docs.read().len() as u64)
    }

    async fn find_page(&self, skip: u64, limit: usize) -> SyncResult<Vec<Document>> {
        self.check_reachable()?;
        Ok(self
            .docs
            .read()
            .values()
            .skip(skip as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &DocumentId) -> SyncResult<Option<Document>> {
        self.check_reachable()?;
        Ok(self.docs.read().get(id).cloned())
    }

    async fn fetch_many(&self, ids: &[DocumentId]) -> SyncResult<Vec<Document>> {
        self.check_reachable()?;
        let docs = self.docs.read();
        Ok(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    async fn all_ids(&self) -> SyncResult<Vec<DocumentId>> {
        self.check_reachable()?;
        Ok(self.docs.read().keys().cloned().collect())
    }

    async fn watch(&self) -> SyncResult<Box<dyn ChangeFeed>> {
        self.check_reachable()?;
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        self.subscribers.write().push(tx);
        Ok(Box::new(MemoryChangeFeed { rx: Some(rx) }))
    }
}

/// A change feed over an in-memory source.
pub struct MemoryChangeFeed {
    rx: Option<mpsc::Receiver<FeedItem>>,
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn next(&mut self) -> SyncResult<Option<ChangeEvent>> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };
        match rx.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.rx = None;
    }
}

/// An in-memory search index with failure injection.
pub struct MemoryIndex {
    docs: RwLock<BTreeMap<DocumentId, Document>>,
    routing_field: String,
    routing: RwLock<HashMap<DocumentId, String>>,
    rejected: RwLock<HashSet<DocumentId>>,
    fail_next: AtomicU64,
    conflict_next: AtomicU64,
    bulk_calls: AtomicU64,
    bulk_sizes: RwLock<Vec<usize>>,
    delete_calls: AtomicU64,
}

impl MemoryIndex {
    /// Creates an empty index with the default routing field.
    pub fn new() -> Self {
        Self::with_routing_field("account_id")
    }

    /// Creates an empty index routing on the given grouping field.
    pub fn with_routing_field(routing_field: impl Into<String>) -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            routing_field: routing_field.into(),
            routing: RwLock::new(HashMap::new()),
            rejected: RwLock::new(HashSet::new()),
            fail_next: AtomicU64::new(0),
            conflict_next: AtomicU64::new(0),
            bulk_calls: AtomicU64::new(0),
            bulk_sizes: RwLock::new(Vec::new()),
            delete_calls: AtomicU64::new(0),
        }
    }

    /// Seeds a document without going through the bulk path.
    pub fn seed(&self, document: Document) {
        self.docs.write().insert(document.id.clone(), document);
    }

    /// Returns the stored document, if any.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.docs.read().get(id).cloned()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns true if the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Makes the next `n` calls fail with a retryable backend error.
    pub fn fail_next(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` upserted documents lose their conflict retries.
    pub fn conflict_next(&self, n: u64) {
        self.conflict_next.store(n, Ordering::SeqCst);
    }

    /// Marks a document id as permanently rejected (malformed mapping).
    pub fn reject(&self, id: DocumentId) {
        self.rejected.write().insert(id);
    }

    /// Number of bulk upsert calls observed.
    pub fn bulk_calls(&self) -> u64 {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Sizes of all observed bulk upsert calls, in order.
    pub fn bulk_sizes(&self) -> Vec<usize> {
        self.bulk_sizes.read().clone()
    }

    /// Number of delete calls observed.
    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Routing key last used for a document.
    pub fn routing_key_of(&self, id: &DocumentId) -> Option<String> {
        self.routing.read().get(id).cloned()
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn take_conflict(&self) -> bool {
        self.conflict_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn bulk_upsert(&self, documents: &[Document]) -> SyncResult<BulkReport> {
        if self.take_failure() {
            return Err(SyncError::backend_retryable("index unavailable"));
        }

        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.bulk_sizes.write().push(documents.len());

        let mut report = BulkReport::default();
        for document in documents {
            if self.rejected.read().contains(&document.id) {
                report.errors += 1;
                continue;
            }
            if self.take_conflict() {
                report.version_conflicts += 1;
                continue;
            }

            self.routing.write().insert(
                document.id.clone(),
                document.routing_key(&self.routing_field),
            );

            // doc_as_upsert: merge fields into an existing document,
            // create when absent
            let mut docs = self.docs.write();
            match docs.get_mut(&document.id) {
                Some(existing) => {
                    for (key, value) in &document.fields {
                        existing.fields.insert(key.clone(), value.clone());
                    }
                }
                None => {
                    docs.insert(document.id.clone(), document.clone());
                }
            }
            report.processed += 1;
        }

        Ok(report)
    }

    async fn delete_one(&self, id: &DocumentId) -> SyncResult<bool> {
        if self.take_failure() {
            return Err(SyncError::backend_retryable("index unavailable"));
        }
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.docs.write().remove(id).is_some())
    }

    async fn count(&self) -> SyncResult<u64> {
        if self.take_failure() {
            return Err(SyncError::backend_retryable("index unavailable"));
        }
        Ok(self.docs.read().len() as u64)
    }

    async fn exists(&self, id: &DocumentId) -> SyncResult<bool> {
        if self.take_failure() {
            return Err(SyncError::backend_retryable("index unavailable"));
        }
        Ok(self.docs.read().contains_key(id))
    }

    async fn page_ids_after(
        &self,
        after: Option<&DocumentId>,
        limit: usize,
    ) -> SyncResult<Vec<DocumentId>> {
        if self.take_failure() {
            return Err(SyncError::backend_retryable("index unavailable"));
        }
        let docs = self.docs.read();
        let range = match after {
            Some(id) => docs.range((Bound::Excluded(id.clone()), Bound::Unbounded)),
            None => docs.range((Bound::<DocumentId>::Unbounded, Bound::Unbounded)),
        };
        Ok(range.map(|(id, _)| id.clone()).take(limit).collect())
    }
}
