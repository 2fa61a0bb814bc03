use super::listeners::Listeners;
use crate::domain::ports::{ChangeCallback, KeyValueStore};
use crate::utils::error::{Result, TailorError};
use crate::utils::subscription::Subscription;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key-value store persisted as a single JSON object in a local file.
///
/// A missing file reads as an empty record. Change notifications only reach
/// subscribers of this handle (and its clones).
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    listeners: Arc<Listeners>,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            listeners: Arc::new(Listeners::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_record(&self) -> Result<Map<String, Value>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(record) => Ok(record),
            _ => Err(TailorError::store_read(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl KeyValueStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let record = self.read_record().await?;
        Ok(record.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut record = self.read_record().await?;
        record.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(&Value::Object(record))?;
        tokio::fs::write(&self.path, content).await?;
        tracing::debug!("Wrote store record to {}", self.path.display());

        self.listeners.notify();
        Ok(())
    }

    fn subscribe(&self, callback: ChangeCallback) -> Subscription {
        self.listeners.add(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("store.json"));
        assert_eq!(store.get("tailoringEntries").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_creates_file_and_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store = LocalStore::new(&path);

        store.set("a", serde_json::json!(1)).await.unwrap();
        store.set("b", serde_json::json!([2])).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.get("a").await.unwrap(), Some(serde_json::json!(1)));
        assert_eq!(store.get("b").await.unwrap(), Some(serde_json::json!([2])));
    }

    #[tokio::test]
    async fn test_non_object_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = LocalStore::new(&path);
        assert!(store.get("a").await.is_err());
    }
}
