//! Shared account store.
//!
//! A single JSON object keyed by account name, shared by every agent in the
//! process and by external session tools. Reads are lock-free; writes are a
//! read-modify-write of one key under an exclusive advisory lock on a
//! sibling lock file, so concurrent writers never lose each other's records.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

const LOCK_DIR: &str = "lock_files";
const LOCK_FILE: &str = "accounts_config.lock";

/// One account's entry in the store.
///
/// Keys this crate does not know about are carried through writes untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Auth descriptor written by the session tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<serde_json::Value>,
    /// Identity marker: the browser user agent bound to this account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AccountRecord {
    /// Names the missing required field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.api.as_ref().is_none_or(|v| v.is_null()) {
            return Some("api");
        }
        if self.user_agent.as_deref().is_none_or(|ua| ua.trim().is_empty()) {
            return Some("user_agent");
        }
        None
    }
}

pub type AccountMap = BTreeMap<String, AccountRecord>;

/// Handle on the store file.
#[derive(Debug, Clone)]
pub struct AccountStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(LOCK_DIR)
            .join(LOCK_FILE);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. A missing or empty file is an empty store.
    pub async fn load(&self) -> Result<AccountMap, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_map(&path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    pub async fn get(&self, account: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self.load().await?.remove(account))
    }

    /// Apply `update` to one account's record under the store lock.
    ///
    /// The record is created if absent. Other accounts' records are written
    /// back exactly as read.
    pub async fn update<F>(&self, account: &str, update: F) -> Result<AccountRecord, StoreError>
    where
        F: FnOnce(&mut AccountRecord) + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        let account = account.to_string();

        tokio::task::spawn_blocking(move || {
            let lock = open_lock(&lock_path)?;
            lock.lock_exclusive().map_err(|source| StoreError::Io {
                path: lock_path.clone(),
                source,
            })?;

            let result = (|| -> Result<AccountRecord, StoreError> {
                let mut map = read_map(&path)?;
                let record = map.entry(account).or_default();
                update(record);
                let updated = record.clone();
                write_map(&path, &map)?;
                Ok(updated)
            })();

            if let Err(err) = FileExt::unlock(&lock) {
                tracing::warn!(path = %lock_path.display(), error = %err, "Failed to release store lock");
            }
            result
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn open_lock(lock_path: &Path) -> Result<File, StoreError> {
    if let Some(dir) = lock_path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .map_err(|source| StoreError::Io {
            path: lock_path.to_path_buf(),
            source,
        })
}

fn read_map(path: &Path) -> Result<AccountMap, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AccountMap::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if contents.trim().is_empty() {
        return Ok(AccountMap::new());
    }
    serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_map(path: &Path, map: &AccountMap) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(map).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn seeded_store(dir: &Path) -> AccountStore {
        let path = dir.join("accounts_config.json");
        std::fs::write(
            &path,
            json!({
                "alice": {
                    "api": { "api_id": 1 },
                    "user_agent": "Mozilla/5.0",
                    "proxy": "http://10.0.0.1:8080",
                    "farming": { "gold": true }
                },
                "bob": { "user_agent": "Mozilla/5.0" }
            })
            .to_string(),
        )
        .unwrap();
        AccountStore::new(path)
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::new(dir.path().join("accounts_config.json"));
        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(store.get("alice").await.unwrap(), None);

        std::fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().await.unwrap().is_empty());

        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load().await, Err(StoreError::Corrupt { .. })));
        assert!(matches!(store.get("alice").await, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_record_validation() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let map = store.load().await.unwrap();
        assert_eq!(map["alice"].missing_field(), None);
        assert_eq!(map["bob"].missing_field(), Some("api"));
        assert_eq!(
            AccountRecord {
                api: Some(json!({})),
                ..Default::default()
            }
            .missing_field(),
            Some("user_agent")
        );
    }

    #[tokio::test]
    async fn test_update_touches_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());

        let updated = store
            .update("bob", |record| record.proxy = Some("socks5://10.0.0.2:1080".into()))
            .await
            .unwrap();
        assert_eq!(updated.proxy.as_deref(), Some("socks5://10.0.0.2:1080"));

        let map = store.load().await.unwrap();
        assert_eq!(map["bob"].proxy.as_deref(), Some("socks5://10.0.0.2:1080"));
        assert_eq!(map["alice"].proxy.as_deref(), Some("http://10.0.0.1:8080"));
        assert_eq!(map["alice"].extra["farming"], json!({ "gold": true }));
        assert!(dir.path().join(LOCK_DIR).join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::new(dir.path().join("accounts_config.json"));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(&format!("acct{i}"), move |r| r.proxy = Some(format!("http://p{i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let map = store.load().await.unwrap();
        assert_eq!(map.len(), 8);
        assert_eq!(map["acct3"].proxy.as_deref(), Some("http://p3"));
    }
}
