//! Contents manager over a single storage provider.
//!
//! Translates provider metadata into the generic contents model: notebooks
//! are `.ipynb` files served as JSON, other files as UTF-8 text or base64,
//! and dot-prefixed entries are hidden.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::checkpoints::NullCheckpoints;
use crate::contents::{
    epoch, Checkpoint, ContentFormat, ContentModel, ContentType, ContentsManager, GetOptions,
};
use multifs_common::{ApiPath, Error, Result};
use multifs_storage::{Metadata, StorageProvider};

const NOTEBOOK_EXTENSION: &str = ".ipynb";

/// Contents manager bound to one backend.
pub struct FsContentsManager {
    provider: Arc<dyn StorageProvider>,
    default_writable: bool,
    allow_hidden: bool,
    checkpoints: NullCheckpoints,
}

impl FsContentsManager {
    /// Wrap a provider. `default_writable` applies where the provider
    /// cannot report writability itself.
    pub fn new(provider: Arc<dyn StorageProvider>, default_writable: bool) -> Self {
        Self {
            provider,
            default_writable,
            allow_hidden: false,
            checkpoints: NullCheckpoints,
        }
    }

    /// Serve and create dot-prefixed entries.
    pub fn with_allow_hidden(mut self, allow_hidden: bool) -> Self {
        self.allow_hidden = allow_hidden;
        self
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// Normalized backend root.
    pub fn root(&self) -> &str {
        self.provider.root()
    }

    fn base_model(&self, path: &ApiPath, meta: &Metadata) -> ContentModel {
        let name = path.name().unwrap_or_default().to_string();
        let kind = if meta.is_directory {
            ContentType::Directory
        } else if name.ends_with(NOTEBOOK_EXTENSION) {
            ContentType::Notebook
        } else {
            ContentType::File
        };

        ContentModel {
            mimetype: guess_mimetype(&name).map(str::to_string),
            name,
            path: path.as_relative(),
            kind,
            format: None,
            content: None,
            size: if meta.is_directory { None } else { meta.size },
            writable: meta.writable.unwrap_or(self.default_writable),
            last_modified: meta.modified.unwrap_or_else(epoch),
            created: meta.created.or(meta.modified).unwrap_or_else(epoch),
            chunk: None,
            message: None,
        }
    }

    async fn dir_model(
        &self,
        path: &ApiPath,
        meta: &Metadata,
        content: bool,
    ) -> Result<ContentModel> {
        if !self.allow_hidden && path.has_hidden_component() {
            debug!(path = %path, "Refusing to serve hidden directory");
            return Err(Error::NotFound(format!("directory does not exist: {}", path)));
        }

        let mut model = self.base_model(path, meta);
        if content {
            let mut children = Vec::new();
            for entry in self.provider.list(path).await? {
                if !self.allow_hidden && entry.name.starts_with('.') {
                    continue;
                }
                let child = path.join(&entry.name)?;
                children.push(serde_json::to_value(self.base_model(&child, &entry))?);
            }
            model.content = Some(Value::Array(children));
            model.format = Some(ContentFormat::Json);
        }
        Ok(model)
    }

    async fn read_file(
        &self,
        path: &ApiPath,
        format: Option<ContentFormat>,
    ) -> Result<(String, ContentFormat)> {
        let bytes = self.provider.read(path).await?;

        match format {
            Some(ContentFormat::Base64) => Ok((STANDARD.encode(&bytes), ContentFormat::Base64)),
            Some(ContentFormat::Text) => String::from_utf8(bytes)
                .map(|text| (text, ContentFormat::Text))
                .map_err(|_| Error::InvalidInput(format!("{} is not UTF-8 encoded", path))),
            _ => match String::from_utf8(bytes) {
                Ok(text) => Ok((text, ContentFormat::Text)),
                Err(e) => Ok((STANDARD.encode(e.into_bytes()), ContentFormat::Base64)),
            },
        }
    }

    async fn file_model(
        &self,
        path: &ApiPath,
        meta: &Metadata,
        content: bool,
        format: Option<ContentFormat>,
    ) -> Result<ContentModel> {
        let mut model = self.base_model(path, meta);
        model.kind = ContentType::File;

        if content {
            let (text, format) = self.read_file(path, format).await?;
            if model.mimetype.is_none() {
                model.mimetype = Some(
                    match format {
                        ContentFormat::Base64 => "application/octet-stream",
                        _ => "text/plain",
                    }
                    .to_string(),
                );
            }
            model.content = Some(Value::String(text));
            model.format = Some(format);
        }
        Ok(model)
    }

    async fn notebook_model(
        &self,
        path: &ApiPath,
        meta: &Metadata,
        content: bool,
    ) -> Result<ContentModel> {
        let mut model = self.base_model(path, meta);
        model.kind = ContentType::Notebook;
        model.mimetype = None;

        if content {
            let bytes = self.provider.read(path).await?;
            let document: Value = serde_json::from_slice(&bytes)
                .map_err(|e| Error::InvalidInput(format!("Unreadable notebook {}: {}", path, e)))?;
            model.content = Some(document);
            model.format = Some(ContentFormat::Json);
        }
        Ok(model)
    }

    async fn save_directory(&self, path: &ApiPath) -> Result<()> {
        if !self.allow_hidden && path.has_hidden_component() {
            return Err(Error::InvalidInput(format!(
                "Cannot create hidden directory {}",
                path
            )));
        }

        if !self.provider.exists(path).await? {
            self.provider.mkdir(path).await?;
        } else if !self.provider.is_dir(path).await? {
            return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
        } else {
            debug!(path = %path, "Directory already exists");
        }
        Ok(())
    }

    async fn write_bytes(&self, path: &ApiPath, bytes: Vec<u8>, chunk: Option<i64>) -> Result<()> {
        match chunk {
            Some(n) if n != 1 => {
                self.provider.append(path, bytes).await?;
            }
            _ => {
                self.provider.write(path, bytes).await?;
            }
        }
        Ok(())
    }
}

fn model_bytes(model: &ContentModel, path: &ApiPath) -> Result<Vec<u8>> {
    let content = model
        .content
        .as_ref()
        .ok_or_else(|| Error::InvalidInput(format!("No content provided for {}", path)))?;

    match model.kind {
        ContentType::Notebook => Ok(serde_json::to_vec_pretty(content)?),
        ContentType::File => {
            let text = content.as_str().ok_or_else(|| {
                Error::InvalidInput(format!("File content for {} must be a string", path))
            })?;
            match model.format {
                Some(ContentFormat::Text) => Ok(text.as_bytes().to_vec()),
                Some(ContentFormat::Base64) => {
                    let compact: String =
                        text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                    STANDARD.decode(compact).map_err(|e| {
                        Error::InvalidInput(format!("Encoding error saving {}: {}", path, e))
                    })
                }
                _ => Err(Error::InvalidInput(
                    "Must specify format of file contents as 'text' or 'base64'".to_string(),
                )),
            }
        }
        ContentType::Directory => Err(Error::InvalidInput(format!(
            "Directory model for {} has no byte content",
            path
        ))),
    }
}

fn guess_mimetype(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "py" => "text/x-python",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(mime)
}

#[async_trait]
impl ContentsManager for FsContentsManager {
    async fn is_hidden(&self, path: &str) -> Result<bool> {
        Ok(ApiPath::parse(path)?.has_hidden_component())
    }

    async fn dir_exists(&self, path: &str) -> Result<bool> {
        self.provider.is_dir(&ApiPath::parse(path)?).await
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.provider.is_file(&ApiPath::parse(path)?).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.provider.exists(&ApiPath::parse(path)?).await
    }

    async fn get(&self, path: &str, options: &GetOptions) -> Result<ContentModel> {
        let api = ApiPath::parse(path)?;
        let meta = self.provider.metadata(&api).await?;

        if meta.is_directory {
            if matches!(options.kind, Some(ContentType::File | ContentType::Notebook)) {
                return Err(Error::InvalidInput(format!("{} is a directory", api)));
            }
            return self.dir_model(&api, &meta, options.content).await;
        }

        let is_notebook = match options.kind {
            Some(ContentType::Directory) => {
                return Err(Error::InvalidInput(format!("{} is not a directory", api)))
            }
            Some(ContentType::Notebook) => true,
            Some(ContentType::File) => false,
            None => api
                .name()
                .is_some_and(|name| name.ends_with(NOTEBOOK_EXTENSION)),
        };

        if is_notebook {
            self.notebook_model(&api, &meta, options.content).await
        } else {
            self.file_model(&api, &meta, options.content, options.format)
                .await
        }
    }

    async fn save(&self, model: ContentModel, path: &str) -> Result<ContentModel> {
        let api = ApiPath::parse(path)?;

        match model.kind {
            ContentType::Directory => self.save_directory(&api).await?,
            ContentType::File | ContentType::Notebook => {
                if api.is_root() {
                    return Err(Error::InvalidInput(
                        "Cannot save a file at the backend root".to_string(),
                    ));
                }
                let bytes = model_bytes(&model, &api)?;
                self.write_bytes(&api, bytes, model.chunk).await?;
            }
        }
        debug!(path = %api, kind = ?model.kind, "Saved");

        let options = GetOptions {
            content: false,
            kind: Some(model.kind),
            format: None,
        };
        let mut saved = self.get(path, &options).await?;
        saved.message = model.message;
        Ok(saved)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let api = ApiPath::parse(path)?;
        if self.provider.is_dir(&api).await? {
            self.provider.remove_dir(&api, false).await?;
        } else {
            self.provider.remove(&api).await?;
        }
        info!(path = %api, "Deleted");
        Ok(())
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old = ApiPath::parse(old_path)?;
        let new = ApiPath::parse(new_path)?;
        if old == new {
            return Ok(());
        }

        if self.provider.exists(&new).await? {
            return Err(Error::AlreadyExists(format!("File already exists: {}", new)));
        }

        self.provider.move_path(&old, &new).await?;
        self.checkpoints
            .rename(NullCheckpoints::ID, &old.as_relative(), &new.as_relative());
        info!(from = %old, to = %new, "Renamed");
        Ok(())
    }

    async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint> {
        Ok(self.checkpoints.create(path))
    }

    async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>> {
        Ok(self.checkpoints.list(path))
    }

    async fn restore_checkpoint(&self, checkpoint_id: &str, path: &str) -> Result<()> {
        self.checkpoints.restore(checkpoint_id, path);
        Ok(())
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str, path: &str) -> Result<()> {
        self.checkpoints.delete(checkpoint_id, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multifs_storage::{LocalProvider, MemoryProvider};
    use serde_json::json;
    use tempfile::TempDir;

    fn memory_manager() -> FsContentsManager {
        FsContentsManager::new(Arc::new(MemoryProvider::new()), true)
    }

    #[tokio::test]
    async fn test_text_round_trip() {
        let manager = memory_manager();

        let saved = manager
            .save(ContentModel::text("hello world"), "greeting.txt")
            .await
            .unwrap();
        assert_eq!(saved.kind, ContentType::File);
        assert_eq!(saved.name, "greeting.txt");
        assert!(saved.content.is_none());

        let model = manager
            .get("greeting.txt", &GetOptions::default())
            .await
            .unwrap();
        assert_eq!(model.content_str(), Some("hello world"));
        assert_eq!(model.format, Some(ContentFormat::Text));
        assert_eq!(model.mimetype.as_deref(), Some("text/plain"));
        assert_eq!(model.size, Some(11));
    }

    #[tokio::test]
    async fn test_binary_falls_back_to_base64() {
        let manager = memory_manager();
        let encoded = STANDARD.encode([0xff, 0xfe, 0x00]);

        manager
            .save(ContentModel::base64(encoded.clone()), "blob.bin")
            .await
            .unwrap();

        let model = manager.get("blob.bin", &GetOptions::default()).await.unwrap();
        assert_eq!(model.format, Some(ContentFormat::Base64));
        assert_eq!(model.content_str(), Some(encoded.as_str()));
        assert_eq!(model.mimetype.as_deref(), Some("application/octet-stream"));

        let forced = GetOptions {
            format: Some(ContentFormat::Text),
            ..GetOptions::default()
        };
        assert!(matches!(
            manager.get("blob.bin", &forced).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_notebook_served_as_json() {
        let manager = memory_manager();
        let document = json!({"cells": [], "metadata": {}, "nbformat": 4, "nbformat_minor": 5});

        let saved = manager
            .save(ContentModel::notebook(document.clone()), "analysis.ipynb")
            .await
            .unwrap();
        assert_eq!(saved.kind, ContentType::Notebook);

        let model = manager
            .get("analysis.ipynb", &GetOptions::default())
            .await
            .unwrap();
        assert_eq!(model.format, Some(ContentFormat::Json));
        assert_eq!(model.content, Some(document));
    }

    #[tokio::test]
    async fn test_directory_listing_skips_hidden() {
        let manager = memory_manager();
        manager.save(ContentModel::directory(), "dir").await.unwrap();
        manager
            .save(ContentModel::text("a"), "dir/visible.txt")
            .await
            .unwrap();
        manager
            .save(ContentModel::text("b"), "dir/.secret")
            .await
            .unwrap();

        let model = manager.get("dir", &GetOptions::default()).await.unwrap();
        assert_eq!(model.kind, ContentType::Directory);
        let listing = model.content.unwrap();
        let names: Vec<&str> = listing
            .as_array()
            .unwrap()
            .iter()
            .map(|child| child["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["visible.txt"]);
        assert_eq!(listing[0]["path"], "dir/visible.txt");

        assert!(manager.is_hidden("dir/.secret").await.unwrap());
        assert!(!manager.is_hidden("dir/visible.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_directory_idempotent_and_hidden_refused() {
        let manager = memory_manager();
        manager.save(ContentModel::directory(), "d").await.unwrap();
        manager.save(ContentModel::directory(), "d").await.unwrap();
        assert!(manager.dir_exists("d").await.unwrap());

        assert!(matches!(
            manager.save(ContentModel::directory(), ".hidden").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_chunked_save_appends() {
        let manager = memory_manager();

        let mut first = ContentModel::text("abc");
        first.chunk = Some(1);
        manager.save(first, "big.txt").await.unwrap();

        let mut last = ContentModel::text("def");
        last.chunk = Some(-1);
        manager.save(last, "big.txt").await.unwrap();

        let model = manager.get("big.txt", &GetOptions::default()).await.unwrap();
        assert_eq!(model.content_str(), Some("abcdef"));
    }

    #[tokio::test]
    async fn test_save_requires_format() {
        let manager = memory_manager();
        let mut model = ContentModel::text("x");
        model.format = None;
        assert!(matches!(
            manager.save(model, "x.txt").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_refuses_non_empty_directory() {
        let manager = memory_manager();
        manager.save(ContentModel::directory(), "d").await.unwrap();
        manager.save(ContentModel::text("x"), "d/f.txt").await.unwrap();

        assert!(manager.delete("d").await.is_err());
        manager.delete("d/f.txt").await.unwrap();
        manager.delete("d").await.unwrap();
        assert!(!manager.exists("d").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename() {
        let manager = memory_manager();
        manager.save(ContentModel::text("1"), "a.txt").await.unwrap();
        manager.save(ContentModel::text("2"), "b.txt").await.unwrap();

        assert!(matches!(
            manager.rename("a.txt", "b.txt").await,
            Err(Error::AlreadyExists(_))
        ));
        manager.rename("a.txt", "a.txt").await.unwrap();
        manager.rename("a.txt", "c.txt").await.unwrap();

        assert!(!manager.file_exists("a.txt").await.unwrap());
        assert!(manager.file_exists("c.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let manager = memory_manager();
        assert!(matches!(
            manager.get("nope.txt", &GetOptions::default()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_null_checkpoints() {
        let manager = memory_manager();
        let checkpoint = manager.create_checkpoint("a.txt").await.unwrap();
        assert_eq!(checkpoint.id, "checkpoint");
        assert_eq!(manager.list_checkpoints("a.txt").await.unwrap().len(), 1);
        manager.restore_checkpoint("checkpoint", "a.txt").await.unwrap();
        manager.delete_checkpoint("checkpoint", "a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_backend_writability() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::new(temp.path(), false);
        let manager = FsContentsManager::new(Arc::new(provider), false);

        let saved = manager
            .save(ContentModel::text("on disk"), "note.md")
            .await
            .unwrap();
        assert!(saved.writable);
        assert_eq!(saved.mimetype.as_deref(), Some("text/markdown"));
        assert_eq!(
            std::fs::read_to_string(temp.path().join("note.md")).unwrap(),
            "on disk"
        );
    }

    #[tokio::test]
    async fn test_default_writable_used_when_unknown() {
        let manager = FsContentsManager::new(Arc::new(MemoryProvider::new()), false);
        let saved = manager.save(ContentModel::text("x"), "x.txt").await.unwrap();
        assert!(!saved.writable);
    }
}
