//! # searchsync Store Adapters
//!
//! Adapter seams for the two stores the replication engine bridges:
//!
//! - [`SourceStore`]: the authoritative document store, with lookup,
//!   paged scans, projection-only id scans, and a durable change feed
//! - [`SearchIndex`]: the search-index replica, with idempotent bulk
//!   upsert, single-document delete, counts, existence checks and
//!   cursor-paginated id scans
//!
//! Both traits are implemented in-memory ([`MemorySource`],
//! [`MemoryIndex`]) for tests and embedded use; production adapters over
//! real backends implement the same traits out of tree.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod memory;
mod source;
mod target;

pub use memory::{MemoryChangeFeed, MemoryIndex, MemorySource};
pub use source::{ChangeFeed, SourceStore};
pub use target::{BulkReport, SearchIndex};
