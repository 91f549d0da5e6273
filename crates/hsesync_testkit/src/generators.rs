//! Property-based test generators using proptest.
//!
//! Provides strategies for documents that satisfy the collection schemas
//! and for sequences of queue and cache actions.

use hsesync_model::{Collection, Document, OperationKind};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for any known collection.
pub fn collection_strategy() -> impl Strategy<Value = Collection> {
    prop::sample::select(Collection::ALL.to_vec())
}

/// Strategy for record ids.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,8}(-[a-z0-9]{1,4})?").expect("Invalid regex")
}

/// Strategy for scalar JSON field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::from(n)),
        "[A-Za-z0-9 .,-]{0,24}".prop_map(Value::String),
    ]
}

/// Strategy for a document that is a valid insert into `collection`.
pub fn insert_document_strategy(collection: Collection) -> impl Strategy<Value = Document> {
    (
        record_id_strategy(),
        prop::collection::btree_map("x_[a-z]{1,6}", field_value_strategy(), 0..4),
    )
        .prop_map(move |(id, extra)| {
            let mut doc = Document::with_id(id);
            for (field, value) in extra {
                doc.insert(field, value);
            }
            for field in collection.required_fields() {
                doc.insert(*field, Value::String(format!("{field} value")));
            }
            doc
        })
}

/// Strategy for a document that is a valid update patch.
pub fn patch_document_strategy() -> impl Strategy<Value = Document> {
    (
        record_id_strategy(),
        prop::collection::btree_map("[a-z]{1,8}", field_value_strategy(), 1..4),
    )
        .prop_map(|(id, fields)| {
            let mut doc = Document::with_id(id);
            for (field, value) in fields.into_iter().filter(|(f, _)| f != "id") {
                doc.insert(field, value);
            }
            if doc.len() < 2 {
                doc.insert("note", Value::String("patched".into()));
            }
            doc
        })
}

/// Strategy for a `(collection, kind, payload)` triple that passes
/// validation.
pub fn operation_strategy() -> impl Strategy<Value = (Collection, OperationKind, Document)> {
    collection_strategy().prop_flat_map(|collection| {
        prop_oneof![
            insert_document_strategy(collection)
                .prop_map(move |doc| (collection, OperationKind::Insert, doc)),
            patch_document_strategy().prop_map(move |doc| (collection, OperationKind::Update, doc)),
            record_id_strategy()
                .prop_map(move |id| (collection, OperationKind::Delete, Document::with_id(id))),
        ]
    })
}

/// One step of a queue/engine scenario.
#[derive(Debug, Clone)]
pub enum QueueAction {
    /// Enqueue an operation.
    Enqueue {
        /// Target collection.
        collection: Collection,
        /// Operation kind.
        kind: OperationKind,
        /// Payload.
        payload: Document,
    },
    /// Flush, with the given record ids failing at the remote.
    Flush {
        /// Record ids the remote rejects in this flush.
        failing: Vec<String>,
    },
    /// Go offline or online.
    SetOnline(bool),
}

/// Strategy for a single action.
pub fn queue_action_strategy() -> impl Strategy<Value = QueueAction> {
    prop_oneof![
        4 => operation_strategy().prop_map(|(collection, kind, payload)| QueueAction::Enqueue {
            collection,
            kind,
            payload,
        }),
        2 => prop::collection::vec(record_id_strategy(), 0..3)
            .prop_map(|failing| QueueAction::Flush { failing }),
        1 => any::<bool>().prop_map(QueueAction::SetOnline),
    ]
}

/// Strategy for a sequence of actions.
pub fn queue_actions_strategy(max_len: usize) -> impl Strategy<Value = Vec<QueueAction>> {
    prop::collection::vec(queue_action_strategy(), 1..max_len)
}
