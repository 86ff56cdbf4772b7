//! Content operations routed across drives.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::contents::{Checkpoint, ContentModel, ContentsManager, GetOptions};
use crate::registry::{BackendRegistry, Generation};
use crate::resolver::{resolve, resolve_pair, Resolved};
use crate::resource::{ReconcileOptions, ResourceRecord, ResourceSpec};
use multifs_common::{DriveKey, Error, Result};

const NOTEBOOK_EXTENSION: &str = "ipynb";

fn copy_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-Copy\d*\.").expect("copy pattern is valid"))
}

/// Join a logical directory and a child name.
fn join_logical(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with(':') || dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Split a file name around the point a copy marker is inserted.
///
/// Notebooks split at the last dot; everything else at the first, so
/// `archive.tar.gz` becomes `archive` + `.tar.gz`.
fn split_for_copy(filename: &str) -> (&str, &str) {
    if let Some((base, ext)) = filename.rsplit_once('.') {
        if ext == NOTEBOOK_EXTENSION {
            return (base, &filename[base.len()..]);
        }
    }
    match filename.find('.') {
        Some(dot) => filename.split_at(dot),
        None => (filename, ""),
    }
}

/// Routes every content operation to the backend its path names.
///
/// Each operation takes a snapshot of the current generation, so a
/// concurrent reconciliation never changes the backend an operation
/// already resolved to.
pub struct MetaManager {
    registry: BackendRegistry,
}

impl MetaManager {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Reconcile a resource list into the live drive set.
    pub async fn reconcile(
        &self,
        specs: Vec<ResourceSpec>,
        options: &ReconcileOptions,
    ) -> Result<Vec<ResourceRecord>> {
        self.registry.reconcile(specs, options).await
    }

    /// Records from the last reconciliation.
    pub async fn resources(&self) -> Vec<ResourceRecord> {
        self.registry.records().await
    }

    /// Keys of all live drives, including the default.
    pub async fn drives(&self) -> Vec<DriveKey> {
        self.registry.snapshot().await.drives()
    }

    async fn generation(&self) -> Arc<Generation> {
        self.registry.snapshot().await
    }

    async fn route(&self, path: &str) -> Result<Resolved> {
        let generation = self.generation().await;
        resolve(path, &generation)
    }

    /// Copy a file, optionally to another directory or drive.
    ///
    /// With no destination the copy goes next to the source. If the
    /// destination is an existing directory the copy gets a fresh name:
    /// `name-Copy.ext`, then `name-Copy2.ext`, and so on.
    ///
    /// # Errors
    /// - `InvalidInput` if the source is a directory
    pub async fn copy(&self, from: &str, to: Option<&str>) -> Result<ContentModel> {
        let source = self.route(from.trim_matches('/')).await?;
        let relative = source.path.trim_matches('/').to_string();
        let (dir, name) = match relative.rsplit_once('/') {
            Some((dir, name)) => (dir.to_string(), name.to_string()),
            None => (String::new(), relative.clone()),
        };

        let mut model = source
            .contents()
            .get(&relative, &GetOptions::default())
            .await?;
        if model.is_directory() {
            return Err(Error::InvalidInput(format!("Can't copy directories: {}", from)));
        }
        model.name.clear();
        model.path.clear();

        let mut dest = match to {
            Some(to) => to.trim_matches('/').to_string(),
            None => source.logical(&dir),
        };
        if self.dir_exists(&dest).await? {
            let base = copy_marker().replace(&name, ".");
            let fresh = self.increment_filename(&base, &dest, "-Copy").await?;
            dest = join_logical(&dest, &fresh);
        }

        info!(from = %from, to = %dest, "Copying");
        self.save(model, &dest).await
    }

    /// First name derived from `filename` that does not exist in `dir`.
    ///
    /// Tries the plain name, then `insert`, then `insert` followed by
    /// 2, 3, ... placed before the extension.
    pub async fn increment_filename(
        &self,
        filename: &str,
        dir: &str,
        insert: &str,
    ) -> Result<String> {
        let (base, suffix) = split_for_copy(filename);
        let mut i: u32 = 0;
        loop {
            let marker = match i {
                0 => String::new(),
                1 => insert.to_string(),
                n => format!("{}{}", insert, n),
            };
            let candidate = format!("{}{}{}", base, marker, suffix);
            if !self.exists(&join_logical(dir, &candidate)).await? {
                return Ok(candidate);
            }
            i += 1;
        }
    }
}

#[async_trait]
impl ContentsManager for MetaManager {
    async fn is_hidden(&self, path: &str) -> Result<bool> {
        let target = self.route(path).await?;
        target.contents().is_hidden(&target.path).await
    }

    async fn dir_exists(&self, path: &str) -> Result<bool> {
        let target = self.route(path).await?;
        target.contents().dir_exists(&target.path).await
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        let target = self.route(path).await?;
        target.contents().file_exists(&target.path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.route(path).await?;
        target.contents().exists(&target.path).await
    }

    async fn get(&self, path: &str, options: &GetOptions) -> Result<ContentModel> {
        let target = self.route(path).await?;
        debug!(drive = %target.drive, path = %target.path, "get");
        target.contents().get(&target.path, options).await
    }

    async fn save(&self, model: ContentModel, path: &str) -> Result<ContentModel> {
        let target = self.route(path).await?;
        debug!(drive = %target.drive, path = %target.path, "save");
        target.contents().save(model, &target.path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.route(path).await?;
        debug!(drive = %target.drive, path = %target.path, "delete");
        target.contents().delete(&target.path).await
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let generation = self.generation().await;
        let (old, new) = resolve_pair(old_path, new_path, &generation)?;
        debug!(drive = %old.drive, from = %old.path, to = %new.path, "rename");
        old.contents().rename(&old.path, &new.path).await
    }

    async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint> {
        let target = self.route(path).await?;
        target.contents().create_checkpoint(&target.path).await
    }

    async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>> {
        let target = self.route(path).await?;
        target.contents().list_checkpoints(&target.path).await
    }

    async fn restore_checkpoint(&self, checkpoint_id: &str, path: &str) -> Result<()> {
        let target = self.route(path).await?;
        target
            .contents()
            .restore_checkpoint(checkpoint_id, &target.path)
            .await
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str, path: &str) -> Result<()> {
        let target = self.route(path).await?;
        target
            .contents()
            .delete_checkpoint(checkpoint_id, &target.path)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_manager::FsContentsManager;
    use multifs_storage::MemoryProvider;

    async fn manager_with_drives(urls: &[&str]) -> (MetaManager, Vec<String>) {
        let registry =
            BackendRegistry::new(FsContentsManager::new(Arc::new(MemoryProvider::new()), true));
        let manager = MetaManager::new(registry);
        let specs = urls
            .iter()
            .map(|url| ResourceSpec::new(*url, *url))
            .collect();
        let records = manager
            .reconcile(specs, &ReconcileOptions::default())
            .await
            .unwrap();
        let drives = records.iter().map(|r| r.drive.to_string()).collect();
        (manager, drives)
    }

    #[test]
    fn test_split_for_copy() {
        assert_eq!(split_for_copy("nb.ipynb"), ("nb", ".ipynb"));
        assert_eq!(split_for_copy("my.data.ipynb"), ("my.data", ".ipynb"));
        assert_eq!(split_for_copy("archive.tar.gz"), ("archive", ".tar.gz"));
        assert_eq!(split_for_copy("Makefile"), ("Makefile", ""));
    }

    #[test]
    fn test_join_logical() {
        assert_eq!(join_logical("", "a"), "a");
        assert_eq!(join_logical("abcd1234:", "a"), "abcd1234:a");
        assert_eq!(join_logical("abcd1234:dir", "a"), "abcd1234:dir/a");
    }

    #[tokio::test]
    async fn test_dispatch_to_named_drive() {
        let (manager, drives) = manager_with_drives(&["mem://one"]).await;
        let path = format!("{}:hello.txt", drives[0]);

        manager.save(ContentModel::text("hi"), &path).await.unwrap();

        let model = manager.get(&path, &GetOptions::default()).await.unwrap();
        assert_eq!(model.content_str(), Some("hi"));
        assert_eq!(model.path, "hello.txt");
        assert!(!manager.exists("hello.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_across_drives_rejected() {
        let (manager, drives) = manager_with_drives(&["mem://a", "mem://b"]).await;
        let src = format!("{}:x.txt", drives[0]);
        let dst = format!("{}:y.txt", drives[1]);
        manager.save(ContentModel::text("x"), &src).await.unwrap();

        let err = manager.rename(&src, &dst).await.unwrap_err();
        assert!(matches!(err, Error::CrossBackend { .. }));
        assert!(manager.file_exists(&src).await.unwrap());
        assert!(!manager.file_exists(&dst).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_next_to_source() {
        let (manager, drives) = manager_with_drives(&["mem://a"]).await;
        let dir = format!("{}:work", drives[0]);
        let src = format!("{}:work/report.tar.gz", drives[0]);
        manager.save(ContentModel::directory(), &dir).await.unwrap();
        manager.save(ContentModel::base64("//4="), &src).await.unwrap();

        let first = manager.copy(&src, None).await.unwrap();
        assert_eq!(first.name, "report-Copy.tar.gz");
        let second = manager.copy(&src, None).await.unwrap();
        assert_eq!(second.name, "report-Copy2.tar.gz");

        let copied = manager
            .get(&format!("{}:work/report-Copy.tar.gz", drives[0]), &GetOptions::default())
            .await
            .unwrap();
        assert_eq!(copied.content_str(), Some("//4="));
    }

    #[tokio::test]
    async fn test_copy_of_copy_strips_marker() {
        let (manager, _) = manager_with_drives(&[]).await;
        let document = serde_json::json!({"cells": [], "metadata": {}, "nbformat": 4, "nbformat_minor": 5});
        manager
            .save(ContentModel::notebook(document.clone()), "nb.v1.ipynb")
            .await
            .unwrap();
        let first = manager.copy("nb.v1.ipynb", None).await.unwrap();
        assert_eq!(first.name, "nb.v1-Copy.ipynb");

        let second = manager.copy("nb.v1-Copy.ipynb", None).await.unwrap();
        assert_eq!(second.name, "nb.v1-Copy2.ipynb");
    }

    #[tokio::test]
    async fn test_copy_across_drives() {
        let (manager, drives) = manager_with_drives(&["mem://a", "mem://b"]).await;
        let src = format!("{}:data.csv", drives[0]);
        manager.save(ContentModel::text("1,2"), &src).await.unwrap();

        let dest_dir = format!("{}:", drives[1]);
        let model = manager.copy(&src, Some(&dest_dir)).await.unwrap();
        assert_eq!(model.name, "data.csv");
        assert!(manager
            .file_exists(&format!("{}:data.csv", drives[1]))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_copy_directory_rejected() {
        let (manager, _) = manager_with_drives(&[]).await;
        manager.save(ContentModel::directory(), "d").await.unwrap();
        assert!(matches!(
            manager.copy("d", None).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_resources_and_drives() {
        let (manager, drives) = manager_with_drives(&["mem://a"]).await;
        assert_eq!(manager.resources().await.len(), 1);
        assert_eq!(
            manager.drives().await,
            vec![DriveKey::root(), DriveKey::from_raw(drives[0].clone())]
        );
    }
}
