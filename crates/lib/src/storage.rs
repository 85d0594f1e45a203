//! User store: persisted per-user records (currently just a nickname).
//!
//! Access is get-then-save with no transaction; concurrent writers to the same
//! id can lose updates. Good enough for a single-process bot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;

/// One stored user: platform id and optional nickname.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Get/save-by-id storage collaborator.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<UserRecord>;
    /// Insert or replace the record; returns its id.
    async fn save(&self, record: UserRecord) -> Result<String, String>;
}

/// In-memory store of user records backed by a JSON file.
pub struct FileUserStore {
    path: std::path::PathBuf,
    records: RwLock<Vec<UserRecord>>,
}

impl FileUserStore {
    /// Load store from path; if the file is missing or invalid, starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Vec::new()),
            Err(_) => Vec::new(),
        };
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    async fn persist(&self) -> std::io::Result<()> {
        let records = self.records.read().await;
        let json = serde_json::to_string_pretty(&*records)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await
    }
}

#[async_trait]
impl UserStore for FileUserStore {
    async fn get(&self, id: &str) -> Option<UserRecord> {
        let records = self.records.read().await;
        records.iter().find(|r| r.id == id).cloned()
    }

    async fn save(&self, record: UserRecord) -> Result<String, String> {
        let id = record.id.clone();
        {
            let mut records = self.records.write().await;
            if let Some(existing) = records.iter_mut().find(|r| r.id == id) {
                *existing = record;
            } else {
                records.push(record);
            }
        }
        self.persist().await.map_err(|e| e.to_string())?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store_path() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("reelbot-store-test-{}", uuid::Uuid::new_v4()))
            .join("users.json")
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = FileUserStore::load(temp_store_path()).await;
        assert!(store.get("U1").await.is_none());
    }

    #[tokio::test]
    async fn save_then_get_round_trips_and_persists() {
        let path = temp_store_path();
        let store = FileUserStore::load(&path).await;
        let id = store
            .save(UserRecord {
                id: "U1".to_string(),
                name: Some("Deckard".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(id, "U1");
        assert_eq!(
            store.get("U1").await.and_then(|r| r.name),
            Some("Deckard".to_string())
        );

        // A fresh store reads the same file back.
        let reloaded = FileUserStore::load(&path).await;
        assert_eq!(
            reloaded.get("U1").await.and_then(|r| r.name),
            Some("Deckard".to_string())
        );
    }

    #[tokio::test]
    async fn save_replaces_existing_record() {
        let store = FileUserStore::load(temp_store_path()).await;
        store
            .save(UserRecord {
                id: "U1".to_string(),
                name: Some("Deckard".to_string()),
            })
            .await
            .unwrap();
        store
            .save(UserRecord {
                id: "U1".to_string(),
                name: Some("Roy".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(
            store.get("U1").await.and_then(|r| r.name),
            Some("Roy".to_string())
        );
    }
}
