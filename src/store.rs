//! Persistent user store.
//!
//! Records are keyed by user id. Admin sessions live in the same store so an
//! admin's broadcast/send mode survives restarts.
//!
//! [`JsonFileStore`] keeps the whole snapshot in memory and rewrites the file on
//! every mutation: the snapshot is written to `<path>.tmp` and renamed over
//! the old file, so a crash leaves either the old or the new snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::admin::AdminSession;
use crate::error::StoreError;
use crate::record::{UserId, UserRecord};

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage seam used by the session controller and the admin pipeline
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user record, `None` if the user never started the bot
    async fn get(&self, id: UserId) -> StoreResult<Option<UserRecord>>;

    /// Insert or replace a whole record
    async fn upsert(&self, record: UserRecord) -> StoreResult<()>;

    /// All known user ids, ascending
    async fn list_ids(&self) -> StoreResult<Vec<UserId>>;

    async fn admin_session(&self, admin_id: UserId) -> StoreResult<Option<AdminSession>>;

    async fn put_admin_session(&self, session: AdminSession) -> StoreResult<()>;
}

/// On-disk snapshot layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    users: BTreeMap<UserId, UserRecord>,
    #[serde(default)]
    admin_sessions: BTreeMap<UserId, AdminSession>,
}

/// Volatile store, used in tests and when no path is configured
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn upsert(&self, record: UserRecord) -> StoreResult<()> {
        self.inner.lock().await.users.insert(record.id, record);
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<UserId>> {
        Ok(self.inner.lock().await.users.keys().copied().collect())
    }

    async fn admin_session(&self, admin_id: UserId) -> StoreResult<Option<AdminSession>> {
        Ok(self.inner.lock().await.admin_sessions.get(&admin_id).cloned())
    }

    async fn put_admin_session(&self, session: AdminSession) -> StoreResult<()> {
        self.inner
            .lock()
            .await
            .admin_sessions
            .insert(session.admin_id, session);
        Ok(())
    }
}

/// JSON snapshot file store
pub struct JsonFileStore {
    path: PathBuf,
    inner: Mutex<Snapshot>,
}

impl JsonFileStore {
    /// Open the snapshot at `path`, creating parent directories. A missing
    /// file starts an empty store.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let snapshot = if path.exists() {
            let data = fs::read_to_string(path)?;
            if data.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            Snapshot::default()
        };
        info!(
            path = %path.display(),
            users = snapshot.users.len(),
            "user store opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(snapshot),
        })
    }

    fn persist(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let data = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "snapshot persisted");
        Ok(())
    }
}

#[async_trait]
impl UserStore for JsonFileStore {
    async fn get(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn upsert(&self, record: UserRecord) -> StoreResult<()> {
        let mut snapshot = self.inner.lock().await;
        let previous = snapshot.users.insert(record.id, record.clone());
        if let Err(e) = self.persist(&snapshot) {
            // keep memory in step with what is on disk
            match previous {
                Some(old) => snapshot.users.insert(record.id, old),
                None => snapshot.users.remove(&record.id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<UserId>> {
        Ok(self.inner.lock().await.users.keys().copied().collect())
    }

    async fn admin_session(&self, admin_id: UserId) -> StoreResult<Option<AdminSession>> {
        Ok(self.inner.lock().await.admin_sessions.get(&admin_id).cloned())
    }

    async fn put_admin_session(&self, session: AdminSession) -> StoreResult<()> {
        let mut snapshot = self.inner.lock().await;
        let admin_id = session.admin_id;
        let previous = snapshot.admin_sessions.insert(admin_id, session);
        if let Err(e) = self.persist(&snapshot) {
            match previous {
                Some(old) => snapshot.admin_sessions.insert(admin_id, old),
                None => snapshot.admin_sessions.remove(&admin_id),
            };
            return Err(e);
        }
        Ok(())
    }
}
