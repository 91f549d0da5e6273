//! Local mirror of remote collections.

use crate::error::{SyncError, SyncResult};
use hsesync_model::{Collection, Document};
use hsesync_store::{LocalStore, StoreResult, Transaction};
use std::sync::Arc;
use tracing::debug;

/// Per-collection copy of remote records, keyed by record id.
///
/// Reads while offline come from here. Local writes land here before the
/// remote confirms them; the next successful fetch replaces the whole
/// collection. There is no conflict resolution.
#[derive(Debug, Clone)]
pub struct CacheMirror {
    store: Arc<LocalStore>,
}

impl CacheMirror {
    /// Creates a mirror over a store that has one partition per collection.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Replaces a collection with a fresh fetch, atomically.
    ///
    /// Readers see either the old content or the new, never a mix.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if a record has no id or the store
    /// is unavailable.
    pub fn replace_all(&self, collection: Collection, records: Vec<Document>) -> SyncResult<()> {
        let count = records.len();
        self.store
            .replace_all(collection.name(), records.into_iter().map(Document::into_value))?;
        debug!(%collection, count, "cache replaced");
        Ok(())
    }

    /// Inserts or overwrites one record.
    ///
    /// # Errors
    ///
    /// Fails if the record has no id or the store is unavailable.
    pub fn upsert(&self, collection: Collection, record: &Document) -> SyncResult<()> {
        self.store
            .transaction(|txn| Self::stage_upsert(txn, collection, record))?;
        Ok(())
    }

    /// Removes one record; absent ids are fine.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn remove(&self, collection: Collection, id: &str) -> SyncResult<()> {
        self.store
            .transaction(|txn| Self::stage_remove(txn, collection, id))?;
        Ok(())
    }

    /// Every cached record of a collection, in id order.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn read_all(&self, collection: Collection) -> SyncResult<Vec<Document>> {
        self.store
            .get_all(collection.name())?
            .into_iter()
            .map(|value| Document::from_value(value).map_err(SyncError::from))
            .collect()
    }

    /// One cached record.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn get(&self, collection: Collection, id: &str) -> SyncResult<Option<Document>> {
        match self.store.get(collection.name(), id)? {
            Some(value) => Ok(Some(Document::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Number of cached records in a collection.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn count(&self, collection: Collection) -> SyncResult<usize> {
        Ok(self.store.count(collection.name())?)
    }

    pub(crate) fn stage_upsert(
        txn: &mut Transaction<'_>,
        collection: Collection,
        record: &Document,
    ) -> StoreResult<()> {
        txn.put(collection.name(), record.clone().into_value())
    }

    pub(crate) fn stage_remove(
        txn: &mut Transaction<'_>,
        collection: Collection,
        id: &str,
    ) -> StoreResult<()> {
        txn.delete(collection.name(), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_store_in_memory;
    use serde_json::json;

    fn mirror() -> CacheMirror {
        CacheMirror::new(Arc::new(open_store_in_memory().unwrap()))
    }

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn upsert_get_remove() {
        let cache = mirror();
        let record = doc(json!({
            "id": "w-1",
            "area": "Loading dock",
            "inspection_date": "2024-03-02",
        }));
        cache.upsert(Collection::WorkplaceInspections, &record).unwrap();
        assert_eq!(
            cache.get(Collection::WorkplaceInspections, "w-1").unwrap(),
            Some(record)
        );

        cache.remove(Collection::WorkplaceInspections, "w-1").unwrap();
        cache.remove(Collection::WorkplaceInspections, "w-1").unwrap();
        assert_eq!(cache.get(Collection::WorkplaceInspections, "w-1").unwrap(), None);
    }

    #[test]
    fn replace_drops_stale_records() {
        let cache = mirror();
        cache
            .upsert(Collection::Incidents, &doc(json!({"id": "old", "type": "injury"})))
            .unwrap();
        cache
            .replace_all(
                Collection::Incidents,
                vec![
                    doc(json!({"id": "b", "type": "near_miss"})),
                    doc(json!({"id": "a", "type": "injury"})),
                ],
            )
            .unwrap();

        let ids: Vec<String> = cache
            .read_all(Collection::Incidents)
            .unwrap()
            .iter()
            .filter_map(|d| d.id().map(str::to_string))
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn replace_with_keyless_record_changes_nothing() {
        let cache = mirror();
        cache
            .upsert(Collection::Incidents, &doc(json!({"id": "keep", "type": "injury"})))
            .unwrap();
        let result = cache.replace_all(
            Collection::Incidents,
            vec![doc(json!({"id": "new", "type": "injury"})), doc(json!({"type": "injury"}))],
        );
        assert!(result.is_err());
        assert_eq!(cache.count(Collection::Incidents).unwrap(), 1);
        assert!(cache.get(Collection::Incidents, "keep").unwrap().is_some());
    }

    #[test]
    fn collections_are_separate() {
        let cache = mirror();
        cache
            .upsert(Collection::Incidents, &doc(json!({"id": "x", "type": "injury"})))
            .unwrap();
        assert_eq!(cache.count(Collection::RiskAssessments).unwrap(), 0);
    }
}
