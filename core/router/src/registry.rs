//! Live backend connections and their reconciliation.
//!
//! The registry publishes an immutable [`Generation`] behind a lock. Readers
//! take a snapshot (an `Arc` clone) and release the lock before any backend
//! I/O; reconciliation builds the next generation off to the side and swaps
//! it in with a single pointer write.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::auth::substitute;
use crate::fs_manager::FsContentsManager;
use crate::resource::{ReconcileOptions, ResourceRecord, ResourceSpec};
use multifs_common::{DriveKey, Result};
use multifs_storage::{create_default_registry, redact, BackendKind, ProviderRegistry};

/// A live handle to one mounted backend.
pub struct BackendConnection {
    key: DriveKey,
    kind: BackendKind,
    url: String,
    default_writable: bool,
    contents: FsContentsManager,
}

impl BackendConnection {
    /// `url` is the resource's template URL; it must not carry credentials.
    pub fn new(
        key: DriveKey,
        kind: BackendKind,
        url: impl Into<String>,
        default_writable: bool,
        contents: FsContentsManager,
    ) -> Self {
        Self {
            key,
            kind,
            url: url.into(),
            default_writable,
            contents,
        }
    }

    pub fn key(&self) -> &DriveKey {
        &self.key
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> &str {
        self.contents.root()
    }

    pub fn default_writable(&self) -> bool {
        self.default_writable
    }

    pub fn contents(&self) -> &FsContentsManager {
        &self.contents
    }
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("url", &redact(&self.url))
            .field("root", &self.root())
            .finish()
    }
}

/// One immutable drive-to-backend mapping plus the records that produced it.
#[derive(Debug, Default)]
pub struct Generation {
    connections: HashMap<DriveKey, Arc<BackendConnection>>,
    records: Vec<ResourceRecord>,
}

impl Generation {
    /// Build a generation from connections, keyed by their own drive keys.
    pub fn new(connections: impl IntoIterator<Item = Arc<BackendConnection>>) -> Self {
        Self {
            connections: connections
                .into_iter()
                .map(|c| (c.key().clone(), c))
                .collect(),
            records: Vec::new(),
        }
    }

    /// Look up a drive by its textual key.
    pub fn get(&self, key: &str) -> Option<&Arc<BackendConnection>> {
        self.connections.get(&DriveKey::from_raw(key))
    }

    /// The default backend, if registered.
    pub fn default_connection(&self) -> Option<&Arc<BackendConnection>> {
        self.connections.get(&DriveKey::root())
    }

    pub fn contains(&self, key: &DriveKey) -> bool {
        self.connections.contains_key(key)
    }

    /// Drive keys in this generation, sorted, including the default.
    pub fn drives(&self) -> Vec<DriveKey> {
        let mut keys: Vec<DriveKey> = self.connections.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Owner of every live backend connection.
pub struct BackendRegistry {
    openers: ProviderRegistry,
    default: Arc<BackendConnection>,
    current: RwLock<Arc<Generation>>,
    reconcile_lock: Mutex<()>,
}

impl BackendRegistry {
    /// Create a registry whose default drive is `default`, using the
    /// built-in URL openers.
    pub fn new(default: FsContentsManager) -> Self {
        Self::with_openers(create_default_registry(), default)
    }

    /// Create a registry with a custom opener set.
    pub fn with_openers(openers: ProviderRegistry, default: FsContentsManager) -> Self {
        let url = format!("{}://{}", default.provider().name(), default.root());
        let default = Arc::new(BackendConnection::new(
            DriveKey::root(),
            BackendKind::default(),
            url,
            true,
            default,
        ));
        let initial = Generation::new([default.clone()]);

        Self {
            openers,
            default,
            current: RwLock::new(Arc::new(initial)),
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Current generation. Hold it for the duration of one operation.
    pub async fn snapshot(&self) -> Arc<Generation> {
        self.current.read().await.clone()
    }

    /// Records from the last reconciliation.
    pub async fn records(&self) -> Vec<ResourceRecord> {
        self.snapshot().await.records().to_vec()
    }

    pub fn default_connection(&self) -> &Arc<BackendConnection> {
        &self.default
    }

    pub fn openers(&self) -> &ProviderRegistry {
        &self.openers
    }

    /// Turn a resource list into the live backend set.
    ///
    /// Produces one record per input, in order. Missing tokens and
    /// connection failures only affect their own record; the batch always
    /// completes unless an internal invariant is broken, in which case
    /// nothing is swapped in.
    ///
    /// Drive keys hash the resource's template URL, so an `ask` resource
    /// whose token values change keeps its key, and with `cache` set keeps
    /// its existing connection.
    ///
    /// # Errors
    /// - `InvariantViolation` if token values survive substitution
    pub async fn reconcile(
        &self,
        specs: Vec<ResourceSpec>,
        options: &ReconcileOptions,
    ) -> Result<Vec<ResourceRecord>> {
        let _guard = self.reconcile_lock.lock().await;
        let previous = self.snapshot().await;

        let mut connections: HashMap<DriveKey, Arc<BackendConnection>> = HashMap::new();
        connections.insert(DriveKey::root(), self.default.clone());
        let mut records = Vec::with_capacity(specs.len());

        for mut spec in specs {
            let key = DriveKey::from_url(&spec.url);
            let mut missing_tokens = None;
            let mut errors = Vec::new();

            let cached = if options.cache {
                connections
                    .get(&key)
                    .or_else(|| previous.connections.get(&key))
                    .cloned()
            } else {
                None
            };

            let (drive, init) = match cached {
                Some(connection) => {
                    debug!(drive = %key, resource = %spec.name, "Reusing backend connection");
                    spec.discard_tokens();
                    connections.insert(key.clone(), connection);
                    (key, true)
                }
                None => {
                    let substitution = substitute(&mut spec);
                    if !substitution.is_complete() {
                        missing_tokens = Some(substitution.missing);
                        (DriveKey::not_init(), false)
                    } else {
                        match self.connect(&spec, &key, &substitution.url).await {
                            Ok(connection) => {
                                debug!(drive = %key, resource = %spec.name, "Opened backend connection");
                                connections.insert(key.clone(), Arc::new(connection));
                                (key, true)
                            }
                            Err(e) => {
                                warn!(
                                    resource = %spec.name,
                                    url = %redact(&spec.url),
                                    error = %e,
                                    "Failed to open backend"
                                );
                                errors.push(e.to_string());
                                (key, false)
                            }
                        }
                    }
                }
            };

            let mut record = ResourceRecord::from_spec(spec, drive, init)?;
            record.missing_tokens = missing_tokens;
            if options.verbose && !errors.is_empty() {
                record.errors = Some(errors);
            }
            records.push(record);
        }

        let next = Arc::new(Generation {
            connections,
            records: records.clone(),
        });
        let released: Vec<DriveKey> = previous
            .connections
            .keys()
            .filter(|key| !next.contains(key))
            .cloned()
            .collect();
        let drives = next.len() - 1;

        *self.current.write().await = next;

        for key in &released {
            debug!(drive = %key, "Released backend connection");
        }
        info!(
            resources = records.len(),
            drives,
            released = released.len(),
            "Reconciled resources"
        );

        Ok(records)
    }

    async fn connect(
        &self,
        spec: &ResourceSpec,
        key: &DriveKey,
        url: &str,
    ) -> Result<BackendConnection> {
        let kind = match spec.kind.as_deref() {
            Some(kind) => kind.parse()?,
            None => BackendKind::default(),
        };
        let provider = self.openers.open(kind, url).await?;
        let default_writable = spec.default_writable.unwrap_or(true);

        Ok(BackendConnection::new(
            key.clone(),
            kind,
            spec.url.clone(),
            default_writable,
            FsContentsManager::new(provider, default_writable),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::AuthMode;
    use multifs_storage::MemoryProvider;
    use tempfile::TempDir;

    fn registry() -> BackendRegistry {
        BackendRegistry::new(FsContentsManager::new(Arc::new(MemoryProvider::new()), true))
    }

    #[tokio::test]
    async fn test_initial_generation_has_default() {
        let registry = registry();
        let generation = registry.snapshot().await;
        assert_eq!(generation.drives(), vec![DriveKey::root()]);
        assert!(generation.records().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_opens_and_keys_by_url() {
        let temp = TempDir::new().unwrap();
        let url = format!("osfs://{}", temp.path().display());
        let registry = registry();

        let records = registry
            .reconcile(
                vec![ResourceSpec::new("tmp", url.clone()).with_auth(AuthMode::None)],
                &ReconcileOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].drive, DriveKey::from_url(&url));
        assert!(records[0].init);
        assert!(records[0].missing_tokens.is_none());

        let generation = registry.snapshot().await;
        let connection = generation.get(records[0].drive.as_str()).unwrap();
        assert_eq!(connection.kind(), BackendKind::PyFs);
        assert_eq!(connection.url(), url);
    }

    #[tokio::test]
    async fn test_cache_reuses_connection() {
        let registry = registry();
        let spec = ResourceSpec::new("m", "mem://");

        let first = registry
            .reconcile(vec![spec.clone()], &ReconcileOptions::default())
            .await
            .unwrap();
        let before = registry.snapshot().await.get(first[0].drive.as_str()).cloned().unwrap();

        let second = registry
            .reconcile(vec![spec.clone()], &ReconcileOptions::default())
            .await
            .unwrap();
        let after = registry.snapshot().await.get(second[0].drive.as_str()).cloned().unwrap();

        assert_eq!(first[0].drive, second[0].drive);
        assert!(Arc::ptr_eq(&before, &after));

        let options = ReconcileOptions {
            cache: false,
            ..ReconcileOptions::default()
        };
        registry.reconcile(vec![spec], &options).await.unwrap();
        let fresh = registry.snapshot().await.get(second[0].drive.as_str()).cloned().unwrap();
        assert!(!Arc::ptr_eq(&after, &fresh));
    }

    #[tokio::test]
    async fn test_duplicate_specs_share_connection() {
        let registry = registry();
        let records = registry
            .reconcile(
                vec![ResourceSpec::new("a", "mem://"), ResourceSpec::new("b", "mem://")],
                &ReconcileOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(records[0].drive, records[1].drive);
        assert_eq!(registry.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_tokens_not_initialized() {
        let registry = registry();
        let records = registry
            .reconcile(
                vec![ResourceSpec::new("s", "mem://{{user}}@bucket")],
                &ReconcileOptions::default(),
            )
            .await
            .unwrap();

        assert!(!records[0].init);
        assert_eq!(records[0].drive, DriveKey::not_init());
        assert_eq!(records[0].missing_tokens, Some(vec!["user".to_string()]));
        assert_eq!(registry.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_is_isolated() {
        let temp = TempDir::new().unwrap();
        let good = format!("osfs://{}", temp.path().display());
        let bad = format!("osfs://{}/does-not-exist", temp.path().display());
        let registry = registry();

        let specs = vec![
            ResourceSpec::new("good", good.clone()),
            ResourceSpec::new("bad", bad.clone()),
            ResourceSpec::new("mem", "mem://"),
        ];
        let records = registry
            .reconcile(specs.clone(), &ReconcileOptions::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert!(records[0].init);
        assert!(!records[1].init);
        assert_eq!(records[1].drive, DriveKey::from_url(&bad));
        assert!(records[1].errors.is_none());
        assert!(records[2].init);

        let verbose = ReconcileOptions {
            verbose: true,
            ..ReconcileOptions::default()
        };
        let records = registry.reconcile(specs, &verbose).await.unwrap();
        assert_eq!(records[1].errors.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_connection_failure() {
        let registry = registry();
        let records = registry
            .reconcile(
                vec![ResourceSpec::new("x", "mem://").with_kind("s4")],
                &ReconcileOptions::default(),
            )
            .await
            .unwrap();
        assert!(!records[0].init);
    }

    #[tokio::test]
    async fn test_dropped_resources_are_released() {
        let registry = registry();
        registry
            .reconcile(vec![ResourceSpec::new("m", "mem://")], &ReconcileOptions::default())
            .await
            .unwrap();
        let held = registry.snapshot().await;
        assert_eq!(held.len(), 2);

        registry
            .reconcile(Vec::new(), &ReconcileOptions::default())
            .await
            .unwrap();
        assert_eq!(registry.snapshot().await.drives(), vec![DriveKey::root()]);
        // An in-flight snapshot keeps its view.
        assert_eq!(held.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_reconciles_serialize() {
        let registry = Arc::new(registry());
        let a = vec![ResourceSpec::new("a", "mem://a")];
        let b = vec![
            ResourceSpec::new("b", "mem://b"),
            ResourceSpec::new("c", "mem://c"),
        ];

        let options = ReconcileOptions::default();

        let (ra, rb) = tokio::join!(
            registry.reconcile(a, &options),
            registry.reconcile(b, &options)
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        let generation = registry.snapshot().await;
        let winner = if generation.records().len() == 1 { &ra } else { &rb };
        assert_eq!(generation.records(), winner.as_slice());
        assert_eq!(generation.len(), winner.len() + 1);
        for record in winner {
            assert!(generation.contains(&record.drive));
        }
    }
}
