use crate::listener::order::FirestoreQueryOrdering;
use crate::{
    FirestoreDocument, FirestoreDocumentChange, FirestoreDocumentChangeType,
    FirestoreDocumentSnapshot, FirestoreListenerToken, FirestoreQuerySnapshot, FirestoreResult,
};
use chrono::prelude::*;
use gcloud_sdk::google::firestore::v1::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::*;

// Position of a document in the index: its sort values under the query ordering plus the path.
#[derive(Debug, Clone)]
struct FirestoreInventoryKey {
    path: String,
    sort_values: Vec<Value>,
    ordering: Arc<FirestoreQueryOrdering>,
}

impl Ord for FirestoreInventoryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering.compare_sort_values(
            (&self.path, &self.sort_values),
            (&other.path, &other.sort_values),
        )
    }
}

impl PartialOrd for FirestoreInventoryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FirestoreInventoryKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FirestoreInventoryKey {}

#[derive(Debug, Clone)]
struct FirestoreOrderEntry {
    index: usize,
    document: Arc<FirestoreDocumentSnapshot>,
}

/// The documents currently matching a listen target, kept in query order.
///
/// Stream events are buffered with [`add`](Self::add) and [`delete`](Self::delete)
/// and only reach the ordered index on [`commit`](Self::commit), which the listener
/// calls on server checkpoints.
#[derive(Debug)]
pub struct FirestoreInventory {
    ordering: Arc<FirestoreQueryOrdering>,
    tree: BTreeMap<FirestoreInventoryKey, Arc<FirestoreDocumentSnapshot>>,
    keys: HashMap<String, FirestoreInventoryKey>,
    pending_deletes: Vec<String>,
    pending_adds: Vec<FirestoreDocument>,
    current: bool,
    resume_token: Option<FirestoreListenerToken>,
    read_time: Option<DateTime<Utc>>,
    published: Option<HashMap<String, FirestoreOrderEntry>>,
}

impl FirestoreInventory {
    pub fn new(ordering: FirestoreQueryOrdering) -> Self {
        Self {
            ordering: Arc::new(ordering),
            tree: BTreeMap::new(),
            keys: HashMap::new(),
            pending_deletes: Vec::new(),
            pending_adds: Vec::new(),
            current: false,
            resume_token: None,
            read_time: None,
            published: None,
        }
    }

    pub fn add(&mut self, doc: FirestoreDocument) {
        self.pending_adds.push(doc);
    }

    pub fn delete<S: AsRef<str>>(&mut self, path: S) {
        let path = path.as_ref();
        self.pending_adds.retain(|doc| doc.name != path);
        self.pending_deletes.push(path.to_string());
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_adds.is_empty() || !self.pending_deletes.is_empty()
    }

    /// Applies buffered deletes and then buffered adds to the index and records the checkpoint.
    ///
    /// Nothing is applied if any buffered document is malformed.
    pub fn commit(
        &mut self,
        resume_token: Option<FirestoreListenerToken>,
        read_time: Option<DateTime<Utc>>,
    ) -> FirestoreResult<()> {
        let effective_read_time = read_time.or(self.read_time);
        let prepared = self
            .pending_adds
            .iter()
            .cloned()
            .map(|doc| {
                let snapshot = FirestoreDocumentSnapshot::from_document(doc, effective_read_time)?;
                let key = self.key_for(&snapshot)?;
                Ok((key, Arc::new(snapshot)))
            })
            .collect::<FirestoreResult<Vec<_>>>()?;

        let mut deleted: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
        for path in std::mem::take(&mut self.pending_deletes) {
            if let Some(removed) = self.remove_path(&path) {
                deleted.insert(path, removed.update_time);
            }
        }

        let mut inserted: HashSet<String> = HashSet::new();
        for (key, snapshot) in prepared {
            if let Some(deleted_update_time) = deleted.get(&snapshot.path) {
                if is_same_or_newer(*deleted_update_time, snapshot.update_time) {
                    trace!(
                        path = %snapshot.path,
                        "Ignoring a stale document update after its deletion."
                    );
                    continue;
                }
            }

            if let Some(existing) = self.get(&snapshot.path) {
                let stale = if inserted.contains(&snapshot.path) {
                    is_newer(existing.update_time, snapshot.update_time)
                } else {
                    is_same_or_newer(existing.update_time, snapshot.update_time)
                };
                if stale {
                    trace!(
                        path = %snapshot.path,
                        "Keeping the newer version of a document."
                    );
                    continue;
                }
                self.remove_path(&snapshot.path);
            }

            inserted.insert(snapshot.path.clone());
            self.keys.insert(snapshot.path.clone(), key.clone());
            self.tree.insert(key, snapshot);
        }
        self.pending_adds.clear();

        if resume_token.is_some() {
            self.resume_token = resume_token;
        }
        if read_time.is_some() {
            self.read_time = read_time;
        }
        Ok(())
    }

    /// Whether the committed documents differ from the last built snapshot.
    /// Always true before the first snapshot is built.
    pub fn changed(&self) -> bool {
        match self.published {
            None => true,
            Some(ref published) => {
                published.len() != self.tree.len()
                    || self.tree.values().any(|doc| {
                        published
                            .get(&doc.path)
                            .map(|entry| !is_same_version(&entry.document, doc))
                            .unwrap_or(true)
                    })
            }
        }
    }

    /// Builds the snapshot of the committed documents with the changes since the
    /// previously built one, which becomes the new diff baseline.
    pub fn build_snapshot(&mut self) -> FirestoreQuerySnapshot {
        let documents: Vec<Arc<FirestoreDocumentSnapshot>> = self.tree.values().cloned().collect();
        let current: HashMap<String, FirestoreOrderEntry> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                (
                    doc.path.clone(),
                    FirestoreOrderEntry {
                        index,
                        document: doc.clone(),
                    },
                )
            })
            .collect();
        let previous = self.published.take().unwrap_or_default();

        let mut removed: Vec<&FirestoreOrderEntry> = previous
            .iter()
            .filter(|(path, _)| !current.contains_key(*path))
            .map(|(_, entry)| entry)
            .collect();
        removed.sort_by_key(|entry| entry.index);

        let mut changes: Vec<FirestoreDocumentChange> = removed
            .into_iter()
            .map(|entry| FirestoreDocumentChange {
                change_type: FirestoreDocumentChangeType::Removed,
                document: entry.document.clone(),
                old_index: Some(entry.index),
                new_index: None,
            })
            .collect();

        for (new_index, doc) in documents.iter().enumerate() {
            match previous.get(&doc.path) {
                None => changes.push(FirestoreDocumentChange {
                    change_type: FirestoreDocumentChangeType::Added,
                    document: doc.clone(),
                    old_index: None,
                    new_index: Some(new_index),
                }),
                Some(entry) if !is_same_version(&entry.document, doc) => {
                    changes.push(FirestoreDocumentChange {
                        change_type: FirestoreDocumentChangeType::Modified,
                        document: doc.clone(),
                        old_index: Some(entry.index),
                        new_index: Some(new_index),
                    })
                }
                Some(_) => {}
            }
        }

        self.published = Some(current);

        FirestoreQuerySnapshot {
            documents,
            changes,
            read_time: self.read_time,
        }
    }

    /// Drops the index and the buffers before reconnecting.
    /// The resume position and the diff baseline survive.
    pub fn restart(&mut self) {
        self.pending_adds.clear();
        self.pending_deletes.clear();
        self.current = false;
        self.tree.clear();
        self.keys.clear();
    }

    /// Restarts and forgets the resume position, forcing a full resync.
    pub fn reset(&mut self) {
        self.restart();
        self.resume_token = None;
        self.read_time = None;
    }

    pub fn size(&self) -> usize {
        self.tree.len()
    }

    pub fn is_current(&self) -> bool {
        self.current
    }

    pub fn mark_current(&mut self) {
        self.current = true;
    }

    pub fn resume_token(&self) -> Option<&FirestoreListenerToken> {
        self.resume_token.as_ref()
    }

    pub fn read_time(&self) -> Option<DateTime<Utc>> {
        self.read_time
    }

    pub fn get(&self, path: &str) -> Option<&Arc<FirestoreDocumentSnapshot>> {
        self.keys.get(path).and_then(|key| self.tree.get(key))
    }

    fn key_for(&self, snapshot: &FirestoreDocumentSnapshot) -> FirestoreResult<FirestoreInventoryKey> {
        Ok(FirestoreInventoryKey {
            path: snapshot.path.clone(),
            sort_values: self.ordering.sort_values(&snapshot.path, &snapshot.fields)?,
            ordering: self.ordering.clone(),
        })
    }

    fn remove_path(&mut self, path: &str) -> Option<Arc<FirestoreDocumentSnapshot>> {
        self.keys
            .remove(path)
            .and_then(|key| self.tree.remove(&key))
    }
}

// Unknown modification times never win over an incoming document.
fn is_same_or_newer(existing: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> bool {
    matches!((existing, incoming), (Some(existing), Some(incoming)) if existing >= incoming)
}

fn is_newer(existing: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> bool {
    matches!((existing, incoming), (Some(existing), Some(incoming)) if existing > incoming)
}

fn is_same_version(a: &Arc<FirestoreDocumentSnapshot>, b: &Arc<FirestoreDocumentSnapshot>) -> bool {
    match (a.update_time, b.update_time) {
        (Some(a_time), Some(b_time)) => a_time == b_time,
        _ => Arc::ptr_eq(a, b),
    }
}
