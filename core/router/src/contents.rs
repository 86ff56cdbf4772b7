//! Generic contents model and the operation set every drive exposes.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use multifs_common::Result;

/// Kind of entry a content model describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Directory,
    File,
    Notebook,
}

/// Encoding of the `content` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Text,
    Base64,
    Json,
}

/// Timestamp reported when a backend does not track one.
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

/// A file, notebook or directory as seen through the contents API.
///
/// For directories with content, `content` is an array of child models
/// without content. For notebooks it is the notebook JSON document. For
/// files it is a string in `format`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ContentType,
    #[serde(default)]
    pub format: Option<ContentFormat>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default = "default_writable")]
    pub writable: bool,
    #[serde(default = "epoch")]
    pub last_modified: DateTime<Utc>,
    #[serde(default = "epoch")]
    pub created: DateTime<Utc>,
    /// Chunk index for multi-part uploads; -1 marks the last chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_writable() -> bool {
    true
}

impl ContentModel {
    fn empty(kind: ContentType) -> Self {
        Self {
            name: String::new(),
            path: String::new(),
            kind,
            format: None,
            mimetype: None,
            content: None,
            size: None,
            writable: true,
            last_modified: epoch(),
            created: epoch(),
            chunk: None,
            message: None,
        }
    }

    /// A text file model ready to save.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            format: Some(ContentFormat::Text),
            content: Some(Value::String(content.into())),
            ..Self::empty(ContentType::File)
        }
    }

    /// A binary file model ready to save; `encoded` is base64.
    pub fn base64(encoded: impl Into<String>) -> Self {
        Self {
            format: Some(ContentFormat::Base64),
            content: Some(Value::String(encoded.into())),
            ..Self::empty(ContentType::File)
        }
    }

    /// A notebook model ready to save.
    pub fn notebook(document: Value) -> Self {
        Self {
            format: Some(ContentFormat::Json),
            content: Some(document),
            ..Self::empty(ContentType::Notebook)
        }
    }

    /// A directory model ready to save.
    pub fn directory() -> Self {
        Self::empty(ContentType::Directory)
    }

    pub fn is_directory(&self) -> bool {
        self.kind == ContentType::Directory
    }

    /// Content as a string, when it is one.
    pub fn content_str(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

/// Options for [`ContentsManager::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOptions {
    /// Include file content or the directory listing.
    pub content: bool,
    /// Force interpretation as this type.
    pub kind: Option<ContentType>,
    /// Requested file encoding; ignored for notebooks and directories.
    pub format: Option<ContentFormat>,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            content: true,
            kind: None,
            format: None,
        }
    }
}

impl GetOptions {
    /// Metadata only.
    pub fn metadata() -> Self {
        Self {
            content: false,
            ..Self::default()
        }
    }
}

/// A saved checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub last_modified: String,
}

/// The content operations a drive supports.
///
/// All paths are API paths relative to the manager's root, `/` separated.
#[async_trait]
pub trait ContentsManager: Send + Sync {
    async fn is_hidden(&self, path: &str) -> Result<bool>;

    async fn dir_exists(&self, path: &str) -> Result<bool>;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Get the model for a path.
    ///
    /// # Errors
    /// - Path not found
    /// - Content cannot be decoded in the requested format
    async fn get(&self, path: &str, options: &GetOptions) -> Result<ContentModel>;

    /// Save a model and return the stored model without content.
    async fn save(&self, model: ContentModel, path: &str) -> Result<ContentModel>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Rename within this manager.
    ///
    /// # Errors
    /// - Destination already exists
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<()>;

    async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint>;

    async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>>;

    async fn restore_checkpoint(&self, checkpoint_id: &str, path: &str) -> Result<()>;

    async fn delete_checkpoint(&self, checkpoint_id: &str, path: &str) -> Result<()>;
}
