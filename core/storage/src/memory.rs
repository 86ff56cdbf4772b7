//! In-memory storage provider.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::provider::{Metadata, StorageProvider};
use multifs_common::{ApiPath, Error, Result};

/// In-memory storage entry.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, metadata: Metadata },
    Directory { metadata: Metadata },
}

impl Entry {
    fn metadata(&self) -> &Metadata {
        match self {
            Entry::File { metadata, .. } => metadata,
            Entry::Directory { metadata } => metadata,
        }
    }
}

/// In-memory storage provider.
///
/// Every opened connection gets its own empty namespace, lost on drop.
pub struct MemoryProvider {
    storage: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        let mut storage = BTreeMap::new();
        storage.insert(
            String::new(),
            Entry::Directory {
                metadata: dir_metadata(""),
            },
        );

        Self {
            storage: RwLock::new(storage),
        }
    }

    fn key(path: &ApiPath) -> String {
        path.as_relative()
    }

    fn check_parent(storage: &BTreeMap<String, Entry>, path: &ApiPath) -> Result<()> {
        let parent = path.parent().unwrap_or_else(ApiPath::root);
        match storage.get(&Self::key(&parent)) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(Error::InvalidInput("Parent is a file".to_string())),
            None => Err(Error::NotFound(format!(
                "Parent directory not found: {}",
                parent
            ))),
        }
    }

    /// Keys strictly below `key`, i.e. all descendants.
    fn descendants(storage: &BTreeMap<String, Entry>, key: &str) -> Vec<String> {
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        };
        storage
            .keys()
            .filter(|k| !k.is_empty() && k.as_str() != key && k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn dir_metadata(name: &str) -> Metadata {
    let now = Utc::now();
    Metadata {
        name: name.to_string(),
        size: None,
        is_directory: true,
        modified: Some(now),
        created: Some(now),
        writable: None,
    }
}

fn file_metadata(name: &str, len: usize, created: Option<chrono::DateTime<Utc>>) -> Metadata {
    let now = Utc::now();
    Metadata {
        name: name.to_string(),
        size: Some(len as u64),
        is_directory: false,
        modified: Some(now),
        created: created.or(Some(now)),
        writable: None,
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn root(&self) -> &str {
        ""
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, path: &ApiPath) -> Result<bool> {
        Ok(self.storage.read().await.contains_key(&Self::key(path)))
    }

    async fn is_dir(&self, path: &ApiPath) -> Result<bool> {
        Ok(matches!(
            self.storage.read().await.get(&Self::key(path)),
            Some(Entry::Directory { .. })
        ))
    }

    async fn is_file(&self, path: &ApiPath) -> Result<bool> {
        Ok(matches!(
            self.storage.read().await.get(&Self::key(path)),
            Some(Entry::File { .. })
        ))
    }

    async fn metadata(&self, path: &ApiPath) -> Result<Metadata> {
        self.storage
            .read()
            .await
            .get(&Self::key(path))
            .map(|e| e.metadata().clone())
            .ok_or_else(|| Error::NotFound(format!("Path not found: {}", path)))
    }

    async fn list(&self, path: &ApiPath) -> Result<Vec<Metadata>> {
        let key = Self::key(path);
        let storage = self.storage.read().await;

        match storage.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
            }
            None => {
                return Err(Error::NotFound(format!("Directory not found: {}", path)));
            }
        }

        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        };

        // BTreeMap iteration keeps the listing sorted by name.
        Ok(storage
            .iter()
            .filter(|(entry_key, _)| !entry_key.is_empty() && **entry_key != key)
            .filter_map(|(entry_key, entry)| {
                let relative = entry_key.strip_prefix(&prefix)?;
                (!relative.contains('/')).then(|| entry.metadata().clone())
            })
            .collect())
    }

    async fn read(&self, path: &ApiPath) -> Result<Vec<u8>> {
        match self.storage.read().await.get(&Self::key(path)) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(Error::InvalidInput(format!(
                "Cannot read directory: {}",
                path
            ))),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn write(&self, path: &ApiPath, data: Vec<u8>) -> Result<Metadata> {
        let name = path
            .name()
            .ok_or_else(|| Error::InvalidInput("Cannot write to backend root".to_string()))?;
        let key = Self::key(path);
        let mut storage = self.storage.write().await;

        Self::check_parent(&storage, path)?;
        let created = match storage.get(&key) {
            Some(Entry::Directory { .. }) => {
                return Err(Error::InvalidInput(format!("Is a directory: {}", path)));
            }
            Some(Entry::File { metadata, .. }) => metadata.created,
            None => None,
        };

        let metadata = file_metadata(name, data.len(), created);
        storage.insert(
            key,
            Entry::File {
                data,
                metadata: metadata.clone(),
            },
        );
        Ok(metadata)
    }

    async fn append(&self, path: &ApiPath, data: Vec<u8>) -> Result<Metadata> {
        let name = path
            .name()
            .ok_or_else(|| Error::InvalidInput("Cannot write to backend root".to_string()))?;
        let key = Self::key(path);
        let mut storage = self.storage.write().await;

        Self::check_parent(&storage, path)?;
        let (mut content, created) = match storage.remove(&key) {
            Some(Entry::File { data, metadata }) => (data, metadata.created),
            Some(dir @ Entry::Directory { .. }) => {
                storage.insert(key, dir);
                return Err(Error::InvalidInput(format!("Is a directory: {}", path)));
            }
            None => (Vec::new(), None),
        };
        content.extend_from_slice(&data);

        let metadata = file_metadata(name, content.len(), created);
        storage.insert(
            key,
            Entry::File {
                data: content,
                metadata: metadata.clone(),
            },
        );
        Ok(metadata)
    }

    async fn mkdir(&self, path: &ApiPath) -> Result<Metadata> {
        let key = Self::key(path);
        let mut storage = self.storage.write().await;

        if storage.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "Path already exists: {}",
                path
            )));
        }
        Self::check_parent(&storage, path)?;

        let metadata = dir_metadata(path.name().unwrap_or(""));
        storage.insert(
            key,
            Entry::Directory {
                metadata: metadata.clone(),
            },
        );
        Ok(metadata)
    }

    async fn remove(&self, path: &ApiPath) -> Result<()> {
        let key = Self::key(path);
        let mut storage = self.storage.write().await;

        match storage.get(&key) {
            Some(Entry::File { .. }) => {
                storage.remove(&key);
                Ok(())
            }
            Some(Entry::Directory { .. }) => Err(Error::InvalidInput(
                "Use remove_dir for directories".to_string(),
            )),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn remove_dir(&self, path: &ApiPath, recursive: bool) -> Result<()> {
        if path.is_root() {
            return Err(Error::NotPermitted("Cannot remove backend root".to_string()));
        }
        let key = Self::key(path);
        let mut storage = self.storage.write().await;

        match storage.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
            }
            None => return Err(Error::NotFound(format!("Directory not found: {}", path))),
        }

        let children = Self::descendants(&storage, &key);
        if !children.is_empty() && !recursive {
            return Err(Error::InvalidInput(format!("Directory not empty: {}", path)));
        }
        for child in children {
            storage.remove(&child);
        }
        storage.remove(&key);
        Ok(())
    }

    async fn move_path(&self, from: &ApiPath, to: &ApiPath) -> Result<Metadata> {
        let from_key = Self::key(from);
        let to_key = Self::key(to);
        let mut storage = self.storage.write().await;

        if !storage.contains_key(&from_key) || from.is_root() {
            return Err(Error::NotFound(format!("Source not found: {}", from)));
        }
        if storage.contains_key(&to_key) {
            return Err(Error::AlreadyExists(format!(
                "Destination already exists: {}",
                to
            )));
        }
        if to_key.starts_with(&format!("{}/", from_key)) {
            return Err(Error::InvalidInput(format!(
                "Cannot move {} into itself",
                from
            )));
        }
        Self::check_parent(&storage, to)?;

        let name = to.name().unwrap_or("").to_string();
        let moved: Vec<String> = std::iter::once(from_key.clone())
            .chain(Self::descendants(&storage, &from_key))
            .collect();

        let mut result = None;
        for old_key in moved {
            let Some(mut entry) = storage.remove(&old_key) else {
                continue;
            };
            let new_key = format!("{}{}", to_key, &old_key[from_key.len()..]);
            if old_key == from_key {
                match &mut entry {
                    Entry::File { metadata, .. } | Entry::Directory { metadata } => {
                        metadata.name = name.clone();
                        metadata.modified = Some(Utc::now());
                    }
                }
                result = Some(entry.metadata().clone());
            }
            storage.insert(new_key, entry);
        }

        result.ok_or_else(|| Error::NotFound(format!("Source not found: {}", from)))
    }
}
