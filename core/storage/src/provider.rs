//! Storage provider trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use multifs_common::{ApiPath, Result};

/// Metadata for a stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Name of the object (empty for the backend root).
    pub name: String,
    /// Size in bytes (None for directories).
    pub size: Option<u64>,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Last modification time, if the backend tracks it.
    pub modified: Option<DateTime<Utc>>,
    /// Creation time, if the backend tracks it.
    pub created: Option<DateTime<Utc>>,
    /// Whether the object can be written, if the backend can tell.
    pub writable: Option<bool>,
}

/// Capability set every storage backend exposes.
///
/// All paths are relative to the backend root the provider was opened with.
/// Implementations must handle their own authentication and timeouts.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Normalized root this provider was opened on (no trailing separator).
    fn root(&self) -> &str;

    /// Check that the backend is reachable.
    ///
    /// Called once when a connection is opened so a broken backend is
    /// reported at reconciliation time instead of on first use.
    async fn probe(&self) -> Result<()>;

    /// Check if a path exists.
    async fn exists(&self, path: &ApiPath) -> Result<bool>;

    /// Check if a path exists and is a directory.
    async fn is_dir(&self, path: &ApiPath) -> Result<bool>;

    /// Check if a path exists and is a regular file.
    async fn is_file(&self, path: &ApiPath) -> Result<bool>;

    /// Get metadata for a path.
    ///
    /// # Errors
    /// - Path not found
    async fn metadata(&self, path: &ApiPath) -> Result<Metadata>;

    /// List contents of a directory.
    ///
    /// # Preconditions
    /// - Path must be a directory
    async fn list(&self, path: &ApiPath) -> Result<Vec<Metadata>>;

    /// Read the complete content of a file.
    ///
    /// # Errors
    /// - File not found
    /// - Path is a directory
    async fn read(&self, path: &ApiPath) -> Result<Vec<u8>>;

    /// Write a file, replacing any previous content.
    ///
    /// # Preconditions
    /// - Parent directory must exist
    async fn write(&self, path: &ApiPath, data: Vec<u8>) -> Result<Metadata>;

    /// Append to a file, creating it if absent.
    async fn append(&self, path: &ApiPath, data: Vec<u8>) -> Result<Metadata>;

    /// Create a directory.
    ///
    /// # Errors
    /// - Already exists
    /// - Parent not found
    async fn mkdir(&self, path: &ApiPath) -> Result<Metadata>;

    /// Remove a file.
    ///
    /// # Errors
    /// - File not found
    /// - Path is a directory
    async fn remove(&self, path: &ApiPath) -> Result<()>;

    /// Remove a directory, and its contents when `recursive` is set.
    async fn remove_dir(&self, path: &ApiPath, recursive: bool) -> Result<()>;

    /// Move/rename a file or directory within this backend.
    ///
    /// # Errors
    /// - Source not found
    /// - Destination already exists
    async fn move_path(&self, from: &ApiPath, to: &ApiPath) -> Result<Metadata>;
}
