//! Documents, change events and pending write operations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque document identifier.
///
/// The identifier is the immutable join key between the source store and
/// the search index. Ordering is lexicographic, which both stores use as
/// their stable scan order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a new identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A canonical document as stored in the source.
///
/// The target's record is a denormalized mirror of these fields; target-only
/// derived fields are not modeled here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier.
    pub id: DocumentId,
    /// Document fields as a JSON object.
    pub fields: Map<String, Value>,
}

impl Document {
    /// Creates a document from an identifier and fields.
    pub fn new(id: impl Into<DocumentId>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Creates a document from an identifier and a JSON value.
    ///
    /// Non-object values are wrapped under a `"value"` key so that the
    /// partial-merge upsert semantics stay well-defined.
    pub fn from_value(id: impl Into<DocumentId>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self::new(id, fields)
    }

    /// Derives the routing key for this document.
    ///
    /// Uses the configured logical grouping field when present (string or
    /// number), falling back to the document identifier. Same-entity
    /// documents thus land in the same target shard, keeping concurrent
    /// upserts to one id ordered.
    pub fn routing_key(&self, routing_field: &str) -> String {
        match self.fields.get(routing_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => self.id.to_string(),
        }
    }

    /// Estimates the serialized size of this document in bytes.
    ///
    /// Used for the batch byte cap; an estimate is sufficient, exactness
    /// is not required.
    pub fn estimated_bytes(&self) -> usize {
        serde_json::to_vec(&self.fields)
            .map(|v| v.len() + self.id.as_str().len())
            .unwrap_or(self.id.as_str().len())
    }
}

/// Kind of mutation reported by the source change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOperation {
    /// A new document was created.
    Insert,
    /// An existing document was partially updated.
    Update,
    /// An existing document was replaced wholesale.
    Replace,
    /// A document was removed.
    Delete,
}

impl ChangeOperation {
    /// Returns true for delete events.
    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeOperation::Delete)
    }
}

/// A single notification from the source change feed.
///
/// The document payload is the resolved current state of the document,
/// absent for deletes or when the source could no longer supply it (the
/// document was deleted again before the feed resolved it).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Kind of mutation.
    pub operation: ChangeOperation,
    /// Identifier of the affected document.
    pub id: DocumentId,
    /// Resolved full document, when available.
    pub document: Option<Document>,
}

impl ChangeEvent {
    /// Creates an insert event.
    pub fn insert(document: Document) -> Self {
        Self {
            operation: ChangeOperation::Insert,
            id: document.id.clone(),
            document: Some(document),
        }
    }

    /// Creates an update event with a resolved document.
    pub fn update(document: Document) -> Self {
        Self {
            operation: ChangeOperation::Update,
            id: document.id.clone(),
            document: Some(document),
        }
    }

    /// Creates a replace event with a resolved document.
    pub fn replace(document: Document) -> Self {
        Self {
            operation: ChangeOperation::Replace,
            id: document.id.clone(),
            document: Some(document),
        }
    }

    /// Creates an update or replace event whose document could not be
    /// resolved.
    pub fn unresolved(operation: ChangeOperation, id: impl Into<DocumentId>) -> Self {
        Self {
            operation,
            id: id.into(),
            document: None,
        }
    }

    /// Creates a delete event.
    pub fn delete(id: impl Into<DocumentId>) -> Self {
        Self {
            operation: ChangeOperation::Delete,
            id: id.into(),
            document: None,
        }
    }
}

/// A write queued by the batch processor.
///
/// Ownership is exclusive to the processor until the operation is flushed
/// or re-queued after a failed flush.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperation {
    /// Create-or-merge the document in the target.
    Upsert(Document),
    /// Remove the document from the target.
    Delete(DocumentId),
}

impl PendingOperation {
    /// Returns the identifier this operation applies to.
    pub fn id(&self) -> &DocumentId {
        match self {
            PendingOperation::Upsert(doc) => &doc.id,
            PendingOperation::Delete(id) => id,
        }
    }

    /// Returns true for delete operations.
    pub fn is_delete(&self) -> bool {
        matches!(self, PendingOperation::Delete(_))
    }

    /// Estimates the serialized size of this operation in bytes.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            PendingOperation::Upsert(doc) => doc.estimated_bytes(),
            PendingOperation::Delete(id) => id.as_str().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        Document::from_value(id, value)
    }

    #[test]
    fn routing_key_prefers_grouping_field() {
        let d = doc("order-1", json!({"account_id": "acct-9", "total": 12}));
        assert_eq!(d.routing_key("account_id"), "acct-9");
    }

    #[test]
    fn routing_key_accepts_numeric_field() {
        let d = doc("order-1", json!({"account_id": 42}));
        assert_eq!(d.routing_key("account_id"), "42");
    }

    #[test]
    fn routing_key_falls_back_to_id() {
        let d = doc("order-1", json!({"total": 12}));
        assert_eq!(d.routing_key("account_id"), "order-1");

        // Non-scalar grouping values also fall back
        let d = doc("order-2", json!({"account_id": {"nested": true}}));
        assert_eq!(d.routing_key("account_id"), "order-2");
    }

    #[test]
    fn non_object_payload_is_wrapped() {
        let d = doc("k", json!("just a string"));
        assert_eq!(d.fields.get("value"), Some(&json!("just a string")));
    }

    #[test]
    fn change_event_constructors() {
        let d = doc("a", json!({"x": 1}));
        let ev = ChangeEvent::update(d.clone());
        assert_eq!(ev.operation, ChangeOperation::Update);
        assert_eq!(ev.id, d.id);
        assert!(ev.document.is_some());

        let ev = ChangeEvent::delete("a");
        assert!(ev.operation.is_delete());
        assert!(ev.document.is_none());

        let ev = ChangeEvent::unresolved(ChangeOperation::Replace, "a");
        assert!(ev.document.is_none());
        assert!(!ev.operation.is_delete());
    }

    #[test]
    fn pending_operation_id_and_size() {
        let d = doc("a", json!({"x": 1}));
        let up = PendingOperation::Upsert(d);
        assert_eq!(up.id().as_str(), "a");
        assert!(up.estimated_bytes() > 1);

        let del = PendingOperation::Delete("abc".into());
        assert!(del.is_delete());
        assert_eq!(del.estimated_bytes(), 3);
    }

    #[test]
    fn document_id_ordering_is_lexicographic() {
        let mut ids = vec![
            DocumentId::new("b"),
            DocumentId::new("a"),
            DocumentId::new("c"),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
        assert_eq!(ids[2].as_str(), "c");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn routing_key_never_empty_for_nonempty_id(
                id in "[a-z0-9-]{1,24}",
                field in proptest::option::of("[a-z_]{1,12}"),
            ) {
                let d = doc(&id, json!({"n": 1}));
                let key = d.routing_key(field.as_deref().unwrap_or("account_id"));
                prop_assert!(!key.is_empty());
            }

            #[test]
            fn from_value_always_yields_object_fields(
                id in "[a-z0-9-]{1,24}",
                n in any::<i64>(),
                flag in any::<bool>(),
            ) {
                for value in [json!(n), json!(flag), json!([n]), json!({"n": n})] {
                    let d = doc(&id, value);
                    prop_assert_eq!(d.id.as_str(), id.as_str());
                    prop_assert!(d.estimated_bytes() >= id.len());
                }
            }
        }
    }
}
