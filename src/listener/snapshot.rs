use crate::timestamp_utils::from_opt_timestamp;
use crate::{firestore_document_id, firestore_fields_get_by_path, FirestoreDocument, FirestoreResult};
use chrono::prelude::*;
use gcloud_sdk::google::firestore::v1::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A document as it was observed by a listener at `read_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct FirestoreDocumentSnapshot {
    pub path: String,
    pub fields: HashMap<String, Value>,
    pub create_time: Option<DateTime<Utc>>,
    /// Last modification time, used as the snapshot identity when diffing.
    pub update_time: Option<DateTime<Utc>>,
    pub read_time: Option<DateTime<Utc>>,
}

impl FirestoreDocumentSnapshot {
    pub fn from_document(
        doc: FirestoreDocument,
        read_time: Option<DateTime<Utc>>,
    ) -> FirestoreResult<Self> {
        Ok(Self {
            path: doc.name,
            fields: doc.fields,
            create_time: from_opt_timestamp(doc.create_time)?,
            update_time: from_opt_timestamp(doc.update_time)?,
            read_time,
        })
    }

    pub fn id(&self) -> &str {
        firestore_document_id(&self.path)
    }

    pub fn get(&self, field_path: &str) -> Option<&Value> {
        firestore_fields_get_by_path(&self.fields, field_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirestoreDocumentChangeType {
    Added,
    Modified,
    Removed,
}

/// A single entry of a snapshot diff.
///
/// `old_index` is the position in the previously published snapshot and
/// `new_index` the position in the current one; `Added` changes have no old
/// index and `Removed` changes no new index.
#[derive(Debug, Clone, PartialEq)]
pub struct FirestoreDocumentChange {
    pub change_type: FirestoreDocumentChangeType,
    pub document: Arc<FirestoreDocumentSnapshot>,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
}

impl FirestoreDocumentChange {
    pub fn path(&self) -> &str {
        &self.document.path
    }
}

/// An ordered, consistent view of the documents matching a listen target.
#[derive(Debug, Clone, PartialEq)]
pub struct FirestoreQuerySnapshot {
    pub documents: Vec<Arc<FirestoreDocumentSnapshot>>,
    pub changes: Vec<FirestoreDocumentChange>,
    pub read_time: Option<DateTime<Utc>>,
}

impl FirestoreQuerySnapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn find(&self, path: &str) -> Option<&Arc<FirestoreDocumentSnapshot>> {
        self.documents.iter().find(|doc| doc.path == path)
    }

    pub fn changes_of_type(
        &self,
        change_type: FirestoreDocumentChangeType,
    ) -> impl Iterator<Item = &FirestoreDocumentChange> {
        self.changes
            .iter()
            .filter(move |change| change.change_type == change_type)
    }
}

/// The state of a single watched document; `document` is `None` when it doesn't exist.
#[derive(Debug, Clone, PartialEq)]
pub struct FirestoreDocumentListenSnapshot {
    pub path: String,
    pub document: Option<Arc<FirestoreDocumentSnapshot>>,
    pub read_time: Option<DateTime<Utc>>,
}

impl FirestoreDocumentListenSnapshot {
    pub fn from_query_snapshot(path: &str, snapshot: &FirestoreQuerySnapshot) -> Self {
        Self {
            path: path.to_string(),
            document: snapshot.find(path).cloned(),
            read_time: snapshot.read_time,
        }
    }

    pub fn exists(&self) -> bool {
        self.document.is_some()
    }
}
