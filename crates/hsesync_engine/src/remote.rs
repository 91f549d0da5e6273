//! The remote record store contract and an in-process mock.

use crate::error::RemoteError;
use async_trait::async_trait;
use hsesync_model::{Collection, Document};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// The signed-in user as the remote knows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// User id.
    pub user_id: String,
    /// Email, when the remote reports one.
    pub email: Option<String>,
}

impl Identity {
    /// Creates an identity without email.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }
}

/// The organization writes are attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgContext {
    /// Organization id.
    pub organization_id: String,
}

impl OrgContext {
    /// Creates a context.
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
        }
    }
}

/// A hosted CRUD store with authentication.
///
/// Every call may fail; the engine isolates failures per operation.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates a record and returns it as stored.
    async fn create(
        &self,
        collection: Collection,
        record: Document,
    ) -> Result<Document, RemoteError>;

    /// Patches the record with `id`.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<(), RemoteError>;

    /// Deletes the record with `id`.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError>;

    /// The signed-in user, `None` when there is no session.
    async fn current_identity(&self) -> Result<Option<Identity>, RemoteError>;

    /// The organization of `identity`, `None` when it has none.
    async fn lookup_context(&self, identity: &Identity) -> Result<Option<OrgContext>, RemoteError>;
}

/// One call received by a [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `create`.
    Create {
        /// Target collection.
        collection: Collection,
        /// Record as sent.
        record: Document,
    },
    /// `update`.
    Update {
        /// Target collection.
        collection: Collection,
        /// Record id.
        id: String,
        /// Patch as sent.
        patch: Document,
    },
    /// `delete`.
    Delete {
        /// Target collection.
        collection: Collection,
        /// Record id.
        id: String,
    },
}

impl RemoteCall {
    /// Id of the record the call targets.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            RemoteCall::Create { record, .. } => record.id(),
            RemoteCall::Update { id, .. } | RemoteCall::Delete { id, .. } => Some(id),
        }
    }
}

/// A scriptable in-memory remote for tests.
///
/// Signed in as `user-1` of `org-1` by default. Writes are applied to an
/// in-memory table so tests can inspect the remote's view.
pub struct MockRemote {
    identity: Mutex<Option<Identity>>,
    context: Mutex<Option<OrgContext>>,
    records: Mutex<BTreeMap<(Collection, String), Document>>,
    calls: Mutex<Vec<RemoteCall>>,
    failing: Mutex<HashSet<String>>,
    fail_all: Mutex<Option<RemoteError>>,
    gate: watch::Sender<bool>,
    waiting: AtomicUsize,
}

impl MockRemote {
    /// Creates a signed-in mock with an open gate.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            identity: Mutex::new(Some(Identity::new("user-1"))),
            context: Mutex::new(Some(OrgContext::new("org-1"))),
            records: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            fail_all: Mutex::new(None),
            gate,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Sets the signed-in user (`None` signs out).
    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.lock() = identity;
    }

    /// Sets the organization returned for any user.
    pub fn set_context(&self, context: Option<OrgContext>) {
        *self.context.lock() = context;
    }

    /// Makes every write to record `id` fail with HTTP 500.
    pub fn fail_record(&self, id: impl Into<String>) {
        self.failing.lock().insert(id.into());
    }

    /// Makes every write fail with `error` (`None` to stop).
    pub fn fail_all(&self, error: Option<RemoteError>) {
        *self.fail_all.lock() = error;
    }

    /// Stops all scripted write failures.
    pub fn heal(&self) {
        self.failing.lock().clear();
        *self.fail_all.lock() = None;
    }

    /// Holds every write call until [`MockRemote::resume`].
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    /// Releases held calls.
    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    /// Number of calls currently held by the gate.
    pub fn blocked(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` calls are held, or `timeout` elapses.
    pub async fn wait_blocked(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.blocked() < n {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        true
    }

    /// Write calls received so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Records currently held by the remote for a collection.
    pub fn records(&self, collection: Collection) -> Vec<Document> {
        self.records
            .lock()
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    async fn admit(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let mut gate = self.gate.subscribe();
        if !*gate.borrow_and_update() {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let _ = gate.wait_for(|open| *open).await;
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }

        let target = call.record_id().map(str::to_string);
        self.calls.lock().push(call);
        if let Some(error) = self.fail_all.lock().clone() {
            return Err(error);
        }
        match target {
            Some(id) if self.failing.lock().contains(&id) => {
                Err(RemoteError::status(500, format!("scripted failure for {id}")))
            }
            _ => Ok(()),
        }
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn create(
        &self,
        collection: Collection,
        record: Document,
    ) -> Result<Document, RemoteError> {
        self.admit(RemoteCall::Create {
            collection,
            record: record.clone(),
        })
        .await?;
        let id = record
            .id()
            .ok_or_else(|| RemoteError::status(400, "record has no id"))?
            .to_string();
        let mut records = self.records.lock();
        if records.contains_key(&(collection, id.clone())) {
            return Err(RemoteError::status(409, format!("duplicate key {id}")));
        }
        records.insert((collection, id), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<(), RemoteError> {
        self.admit(RemoteCall::Update {
            collection,
            id: id.to_string(),
            patch: patch.clone(),
        })
        .await?;
        if let Some(existing) = self.records.lock().get_mut(&(collection, id.to_string())) {
            existing.merge(&patch);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        self.admit(RemoteCall::Delete {
            collection,
            id: id.to_string(),
        })
        .await?;
        self.records.lock().remove(&(collection, id.to_string()));
        Ok(())
    }

    async fn current_identity(&self) -> Result<Option<Identity>, RemoteError> {
        Ok(self.identity.lock().clone())
    }

    async fn lookup_context(
        &self,
        _identity: &Identity,
    ) -> Result<Option<OrgContext>, RemoteError> {
        Ok(self.context.lock().clone())
    }
}
