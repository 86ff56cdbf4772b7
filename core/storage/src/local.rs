//! Local filesystem storage provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::provider::{Metadata, StorageProvider};
use multifs_common::{ApiPath, Error, Result};

/// Local filesystem storage provider.
///
/// Serves a directory tree rooted at a fixed local path.
pub struct LocalProvider {
    root: PathBuf,
    root_str: String,
    create: bool,
}

impl LocalProvider {
    /// Create a provider over `root` without touching the filesystem.
    ///
    /// The root is checked (and created when `create` is set) by
    /// [`StorageProvider::probe`].
    ///
    /// # Postconditions
    /// - Root is normalized (trailing separators stripped)
    pub fn new(root: impl AsRef<Path>, create: bool) -> Self {
        let root_str = normalize_root(&root.as_ref().to_string_lossy());
        Self {
            root: PathBuf::from(&root_str),
            root_str,
            create,
        }
    }

    /// Convert an ApiPath to a filesystem path.
    fn to_fs_path(&self, path: &ApiPath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in path.components() {
            fs_path.push(component);
        }
        fs_path
    }

    async fn stat(&self, fs_path: &Path) -> Result<Option<std::fs::Metadata>> {
        match fs::metadata(fs_path).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn require_parent(&self, path: &ApiPath) -> Result<()> {
        let parent = path.parent().unwrap_or_else(ApiPath::root);
        match self.stat(&self.to_fs_path(&parent)).await? {
            Some(meta) if meta.is_dir() => Ok(()),
            Some(_) => Err(Error::InvalidInput(format!(
                "Parent is not a directory: {}",
                parent
            ))),
            None => Err(Error::NotFound(format!(
                "Parent directory not found: {}",
                parent
            ))),
        }
    }

    /// Create metadata from filesystem metadata.
    fn create_metadata(&self, name: &str, fs_meta: &std::fs::Metadata) -> Metadata {
        let modified: Option<DateTime<Utc>> = fs_meta.modified().ok().map(|t| t.into());
        let created: Option<DateTime<Utc>> = fs_meta.created().ok().map(|t| t.into());

        Metadata {
            name: name.to_string(),
            size: if fs_meta.is_file() {
                Some(fs_meta.len())
            } else {
                None
            },
            is_directory: fs_meta.is_dir(),
            modified,
            created,
            writable: Some(!fs_meta.permissions().readonly()),
        }
    }
}

fn normalize_root(raw: &str) -> String {
    if raw.is_empty() {
        return ".".to_string();
    }
    let trimmed = raw.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn root(&self) -> &str {
        &self.root_str
    }

    async fn probe(&self) -> Result<()> {
        if self.create {
            fs::create_dir_all(&self.root).await?;
        }
        match self.stat(&self.root).await? {
            Some(meta) if meta.is_dir() => Ok(()),
            Some(_) => Err(Error::Connection(format!(
                "Root is not a directory: {}",
                self.root_str
            ))),
            None => Err(Error::Connection(format!(
                "Root directory does not exist: {}",
                self.root_str
            ))),
        }
    }

    async fn exists(&self, path: &ApiPath) -> Result<bool> {
        Ok(self.stat(&self.to_fs_path(path)).await?.is_some())
    }

    async fn is_dir(&self, path: &ApiPath) -> Result<bool> {
        Ok(self
            .stat(&self.to_fs_path(path))
            .await?
            .is_some_and(|m| m.is_dir()))
    }

    async fn is_file(&self, path: &ApiPath) -> Result<bool> {
        Ok(self
            .stat(&self.to_fs_path(path))
            .await?
            .is_some_and(|m| m.is_file()))
    }

    async fn metadata(&self, path: &ApiPath) -> Result<Metadata> {
        let fs_meta = self
            .stat(&self.to_fs_path(path))
            .await?
            .ok_or_else(|| Error::NotFound(format!("Path not found: {}", path)))?;
        Ok(self.create_metadata(path.name().unwrap_or(""), &fs_meta))
    }

    async fn list(&self, path: &ApiPath) -> Result<Vec<Metadata>> {
        let fs_path = self.to_fs_path(path);

        match self.stat(&fs_path).await? {
            None => return Err(Error::NotFound(format!("Directory not found: {}", path))),
            Some(meta) if !meta.is_dir() => {
                return Err(Error::InvalidInput(format!("Not a directory: {}", path)))
            }
            Some(_) => {}
        }

        let mut results = Vec::new();
        let mut entries = fs::read_dir(&fs_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Dangling symlinks and racing deletes are skipped, not fatal.
            let fs_meta = match fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!(entry = %name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            results.push(self.create_metadata(&name, &fs_meta));
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn read(&self, path: &ApiPath) -> Result<Vec<u8>> {
        let fs_path = self.to_fs_path(path);

        match self.stat(&fs_path).await? {
            None => Err(Error::NotFound(format!("File not found: {}", path))),
            Some(meta) if meta.is_dir() => Err(Error::InvalidInput(format!(
                "Cannot read directory: {}",
                path
            ))),
            Some(_) => Ok(fs::read(&fs_path).await?),
        }
    }

    async fn write(&self, path: &ApiPath, data: Vec<u8>) -> Result<Metadata> {
        if path.is_root() {
            return Err(Error::InvalidInput("Cannot write to backend root".to_string()));
        }
        self.require_parent(path).await?;

        let fs_path = self.to_fs_path(path);
        fs::write(&fs_path, &data).await?;

        self.metadata(path).await
    }

    async fn append(&self, path: &ApiPath, data: Vec<u8>) -> Result<Metadata> {
        if path.is_root() {
            return Err(Error::InvalidInput("Cannot write to backend root".to_string()));
        }
        self.require_parent(path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.to_fs_path(path))
            .await?;
        file.write_all(&data).await?;
        file.flush().await?;

        self.metadata(path).await
    }

    async fn mkdir(&self, path: &ApiPath) -> Result<Metadata> {
        let fs_path = self.to_fs_path(path);

        if self.stat(&fs_path).await?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "Path already exists: {}",
                path
            )));
        }
        self.require_parent(path).await?;

        fs::create_dir(&fs_path).await?;
        self.metadata(path).await
    }

    async fn remove(&self, path: &ApiPath) -> Result<()> {
        let fs_path = self.to_fs_path(path);

        match self.stat(&fs_path).await? {
            None => Err(Error::NotFound(format!("File not found: {}", path))),
            Some(meta) if meta.is_dir() => Err(Error::InvalidInput(
                "Use remove_dir for directories".to_string(),
            )),
            Some(_) => Ok(fs::remove_file(&fs_path).await?),
        }
    }

    async fn remove_dir(&self, path: &ApiPath, recursive: bool) -> Result<()> {
        if path.is_root() {
            return Err(Error::NotPermitted("Cannot remove backend root".to_string()));
        }
        let fs_path = self.to_fs_path(path);

        match self.stat(&fs_path).await? {
            None => return Err(Error::NotFound(format!("Directory not found: {}", path))),
            Some(meta) if !meta.is_dir() => {
                return Err(Error::InvalidInput(format!("Not a directory: {}", path)))
            }
            Some(_) => {}
        }

        if recursive {
            fs::remove_dir_all(&fs_path).await?;
        } else {
            let mut entries = fs::read_dir(&fs_path).await?;
            if entries.next_entry().await?.is_some() {
                return Err(Error::InvalidInput(format!("Directory not empty: {}", path)));
            }
            fs::remove_dir(&fs_path).await?;
        }
        Ok(())
    }

    async fn move_path(&self, from: &ApiPath, to: &ApiPath) -> Result<Metadata> {
        let from_path = self.to_fs_path(from);
        let to_path = self.to_fs_path(to);

        if self.stat(&from_path).await?.is_none() {
            return Err(Error::NotFound(format!("Source not found: {}", from)));
        }

        if self.stat(&to_path).await?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "Destination already exists: {}",
                to
            )));
        }
        self.require_parent(to).await?;

        fs::rename(&from_path, &to_path).await?;
        self.metadata(to).await
    }
}
