use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{io::AsyncWriteExt, sync::OwnedMutexGuard};

use crate::dota2::AccountId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to persist bindings to {0}: {1}")]
    Persist(PathBuf, std::io::Error),
    #[error("Failed to read bindings from {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("Bindings file {0} is corrupt: {1}")]
    Corrupt(PathBuf, serde_json::Error),
}

// user id -> bound account id
#[async_trait]
pub trait IdentifierStore: Send + Sync {
    async fn bind(&self, user_id: &str, account: AccountId) -> Result<(), StoreError>;

    async fn resolve(&self, user_id: &str) -> Option<AccountId>;
}

// one async lock per user, so writes for the same user never interleave
// while different users don't wait on each other
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    bindings: RwLock<HashMap<String, AccountId>>,
    locks: KeyLocks,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bindings(bindings: HashMap<String, AccountId>) -> Self {
        Self {
            bindings: RwLock::new(bindings),
            locks: KeyLocks::default(),
        }
    }

    fn get(&self, user_id: &str) -> Option<AccountId> {
        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        bindings.get(user_id).copied()
    }

    fn set(&self, user_id: &str, account: AccountId) {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        bindings.insert(user_id.to_string(), account);
    }

    fn snapshot(&self) -> BTreeMap<String, AccountId> {
        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        bindings
            .iter()
            .map(|(user, account)| (user.clone(), *account))
            .collect()
    }
}

#[async_trait]
impl IdentifierStore for MemoryStore {
    async fn bind(&self, user_id: &str, account: AccountId) -> Result<(), StoreError> {
        let _guard = self.locks.lock(user_id).await;
        self.set(user_id, account);
        Ok(())
    }

    async fn resolve(&self, user_id: &str) -> Option<AccountId> {
        self.get(user_id)
    }
}

pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
    // serializes commits, so a snapshot is never written over a newer one
    writer: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let bindings = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<HashMap<String, AccountId>>(&content)
                .map_err(|err| StoreError::Corrupt(path.clone(), err))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StoreError::Read(path, err)),
        };
        log::info!("Loaded {} bindings from {}", bindings.len(), path.display());
        Ok(Self {
            path,
            memory: MemoryStore::with_bindings(bindings),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    // the binding only becomes visible in memory once the file carrying it is in place
    async fn commit(&self, user_id: &str, account: AccountId) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let mut snapshot = self.memory.snapshot();
        snapshot.insert(user_id.to_string(), account);
        let content = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| StoreError::Persist(self.path.clone(), err.into()))?;

        let temp = self.temp_path();
        let write = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&content).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &self.path).await
        };
        write
            .await
            .map_err(|err| StoreError::Persist(self.path.clone(), err))?;

        self.memory.set(user_id, account);
        Ok(())
    }
}

#[async_trait]
impl IdentifierStore for FileStore {
    async fn bind(&self, user_id: &str, account: AccountId) -> Result<(), StoreError> {
        let _guard = self.memory.locks.lock(user_id).await;
        self.commit(user_id, account).await?;
        log::info!("bound user {} to account {}", user_id, account);
        Ok(())
    }

    async fn resolve(&self, user_id: &str) -> Option<AccountId> {
        self.memory.get(user_id)
    }
}
