//! The offline write path.

use crate::cache::CacheMirror;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use hsesync_model::{Collection, Document, ModelError, OperationKind, PendingOperation, Record};
use std::sync::Arc;
use tracing::debug;

/// Writes records locally first and queues them for the remote.
///
/// Each write validates the document, updates the cache mirror and enqueues
/// the operation in one store transaction, then asks the engine for a flush
/// when online. Reads come from the cache mirror, so they reflect local
/// writes before the remote confirms them.
#[derive(Debug, Clone)]
pub struct OfflineWriter {
    engine: Arc<SyncEngine>,
    cache: CacheMirror,
}

impl OfflineWriter {
    /// Creates a writer that shares the engine's store.
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let cache = CacheMirror::new(Arc::clone(engine.store()));
        Self { engine, cache }
    }

    /// The cache mirror.
    pub fn cache(&self) -> &CacheMirror {
        &self.cache
    }

    /// The engine writes are handed to.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Creates a record. A missing `id` is generated.
    ///
    /// # Errors
    ///
    /// [`SyncError::Model`] if a required field is missing;
    /// [`SyncError::StorageUnavailable`] if nothing could be persisted.
    pub fn insert(
        &self,
        collection: Collection,
        mut record: Document,
    ) -> SyncResult<PendingOperation> {
        record.ensure_id();
        record.validate_for(collection, OperationKind::Insert)?;
        let op = self
            .engine
            .queue()
            .enqueue_with(collection, OperationKind::Insert, record.clone(), |txn| {
                CacheMirror::stage_upsert(txn, collection, &record)
            })?;
        self.after_write();
        Ok(op)
    }

    /// Patches a record. `patch` carries `id` and the changed fields.
    ///
    /// The cached copy gets the patch merged in; a record not cached yet is
    /// cached as the patch alone.
    ///
    /// # Errors
    ///
    /// As for [`OfflineWriter::insert`].
    pub fn update(&self, collection: Collection, patch: Document) -> SyncResult<PendingOperation> {
        patch.validate_for(collection, OperationKind::Update)?;
        let id = patch
            .id()
            .ok_or_else(|| ModelError::invalid(collection.name(), "missing id"))?
            .to_string();
        let mut cached = self
            .cache
            .get(collection, &id)?
            .unwrap_or_else(|| Document::with_id(id.as_str()));
        cached.merge(&patch);

        let op = self
            .engine
            .queue()
            .enqueue_with(collection, OperationKind::Update, patch, |txn| {
                CacheMirror::stage_upsert(txn, collection, &cached)
            })?;
        self.after_write();
        Ok(op)
    }

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// As for [`OfflineWriter::insert`].
    pub fn delete(&self, collection: Collection, id: &str) -> SyncResult<PendingOperation> {
        let op = self.engine.queue().enqueue_with(
            collection,
            OperationKind::Delete,
            Document::with_id(id),
            |txn| CacheMirror::stage_remove(txn, collection, id),
        )?;
        self.after_write();
        Ok(op)
    }

    /// Creates a typed record.
    ///
    /// # Errors
    ///
    /// As for [`OfflineWriter::insert`].
    pub fn insert_record<R: Record>(&self, record: &R) -> SyncResult<PendingOperation> {
        self.insert(R::COLLECTION, record.to_document()?)
    }

    /// Patches with every set field of a typed record.
    ///
    /// # Errors
    ///
    /// As for [`OfflineWriter::update`].
    pub fn update_record<R: Record>(&self, record: &R) -> SyncResult<PendingOperation> {
        self.update(R::COLLECTION, record.to_document()?)
    }

    /// Deletes a typed record.
    ///
    /// # Errors
    ///
    /// As for [`OfflineWriter::delete`].
    pub fn delete_record<R: Record>(&self, record: &R) -> SyncResult<PendingOperation> {
        self.delete(R::COLLECTION, record.id())
    }

    /// Replaces the cached collection with a fresh remote fetch.
    ///
    /// # Errors
    ///
    /// Fails without changing the cache if a record has no id.
    pub fn refresh(&self, collection: Collection, records: Vec<Document>) -> SyncResult<()> {
        self.cache.replace_all(collection, records)
    }

    /// Cached records of a collection.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn read_all(&self, collection: Collection) -> SyncResult<Vec<Document>> {
        self.cache.read_all(collection)
    }

    /// Cached records of a collection as typed records.
    ///
    /// # Errors
    ///
    /// Fails if a cached record does not fit `R`.
    pub fn read_records<R: Record>(&self) -> SyncResult<Vec<R>> {
        self.cache
            .read_all(R::COLLECTION)?
            .iter()
            .map(|doc| R::from_document(doc).map_err(SyncError::from))
            .collect()
    }

    /// One cached record.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn get(&self, collection: Collection, id: &str) -> SyncResult<Option<Document>> {
        self.cache.get(collection, id)
    }

    fn after_write(&self) {
        if !self.engine.config().flush_after_write {
            return;
        }
        if self.engine.is_online() {
            self.engine.request_flush();
        } else {
            debug!("offline, write stays queued");
        }
    }
}
