//! Shared fakes for unit tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::crypto::{hash_master_key, HashParams};
use crate::error::{Result, VaultError};
use crate::identity::{Identity, IdentityPatch, IdentityStore, JsonIdentityStore};

/// JSON identity store in a temp dir with switchable failures
pub struct TestIdentityStore {
    inner: JsonIdentityStore,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
    fail_reads: AtomicBool,
    lookups: AtomicUsize,
    hold_lookups: Mutex<Option<Arc<Notify>>>,
    _temp: TempDir,
}

impl TestIdentityStore {
    pub async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let inner = JsonIdentityStore::open(temp.path()).await.unwrap();
        Self {
            inner,
            fail_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
            hold_lookups: Mutex::new(None),
            _temp: temp,
        }
    }

    /// The wrapped store, bypassing injected failures
    pub fn inner(&self) -> &JsonIdentityStore {
        &self.inner
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Make username lookups wait until the returned handle is notified
    pub async fn hold_lookups(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold_lookups.lock().await = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl IdentityStore for TestIdentityStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<Identity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let hold = self.hold_lookups.lock().await.take();
        if let Some(notify) = hold {
            notify.notified().await;
        }

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(VaultError::StorageError("injected read failure".to_string()));
        }
        self.inner.get_by_username(username).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Identity>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(VaultError::StorageError("injected read failure".to_string()));
        }
        self.inner.get(id).await
    }

    async fn insert(&self, identity: Identity) -> Result<()> {
        self.inner.insert(identity).await
    }

    async fn update(&self, id: Uuid, patch: IdentityPatch) -> Result<Identity> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(VaultError::StorageError("injected write failure".to_string()));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(VaultError::StorageError("injected delete failure".to_string()));
        }
        self.inner.delete(id).await
    }

    fn backend_name(&self) -> &'static str {
        "test"
    }
}

/// Insert an identity hashed with fast parameters
pub async fn register(store: &TestIdentityStore, username: &str, master_key: &str) -> Identity {
    let hash = hash_master_key(master_key, &HashParams::fast()).unwrap();
    let identity = Identity::new(username, hash);
    store.insert(identity.clone()).await.unwrap();
    identity
}
