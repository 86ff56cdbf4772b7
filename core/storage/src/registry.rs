//! Provider registry for opening backends from connection URLs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::fsurl::{redact, FsUrl};
use crate::provider::StorageProvider;
use multifs_common::{Error, Result};

/// Factory function type for creating providers from a parsed URL.
pub type ProviderFactory = Box<dyn Fn(&FsUrl) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// Family of URL openers a resource is opened with.
///
/// The two families accept different scheme sets; a URL valid for one is
/// not necessarily valid for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    PyFs,
    FsSpec,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::PyFs => "pyfs",
            BackendKind::FsSpec => "fsspec",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pyfs" => Ok(BackendKind::PyFs),
            "fsspec" => Ok(BackendKind::FsSpec),
            other => Err(Error::Connection(format!("Unknown backend type: {}", other))),
        }
    }
}

/// Registry of provider factories, keyed by backend kind and URL scheme.
pub struct ProviderRegistry {
    factories: HashMap<(BackendKind, String), ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a provider factory.
    ///
    /// # Errors
    /// - Returns error if the scheme is already registered for this kind
    pub fn register(
        &mut self,
        kind: BackendKind,
        scheme: impl Into<String>,
        factory: ProviderFactory,
    ) -> Result<()> {
        let key = (kind, scheme.into().to_ascii_lowercase());
        if self.factories.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "Scheme '{}' is already registered for {}",
                key.1, kind
            )));
        }
        self.factories.insert(key, factory);
        Ok(())
    }

    /// Construct a provider for a URL without checking reachability.
    ///
    /// # Errors
    /// - Malformed URL
    /// - Scheme not registered for this kind
    /// - Provider-specific construction failure
    pub fn resolve(&self, kind: BackendKind, url: &str) -> Result<Arc<dyn StorageProvider>> {
        let parsed = FsUrl::parse(url)?;
        let factory = self
            .factories
            .get(&(kind, parsed.scheme.clone()))
            .ok_or_else(|| {
                Error::Connection(format!(
                    "No {} opener for scheme '{}' ({})",
                    kind,
                    parsed.scheme,
                    redact(url)
                ))
            })?;
        factory(&parsed)
    }

    /// Construct a provider and verify it is reachable.
    pub async fn open(&self, kind: BackendKind, url: &str) -> Result<Arc<dyn StorageProvider>> {
        let provider = self.resolve(kind, url)?;
        provider.probe().await.map_err(|e| match e {
            Error::Connection(msg) => Error::Connection(msg),
            other => Error::Connection(format!("Could not connect to {}: {}", redact(url), other)),
        })?;
        Ok(provider)
    }

    /// Get the schemes registered for a kind.
    pub fn schemes(&self, kind: BackendKind) -> Vec<String> {
        let mut schemes: Vec<String> = self
            .factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, s)| s.clone())
            .collect();
        schemes.sort();
        schemes
    }

    /// Check if a scheme is registered for a kind.
    pub fn has_scheme(&self, kind: BackendKind, scheme: &str) -> bool {
        self.factories
            .contains_key(&(kind, scheme.to_ascii_lowercase()))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn local_factory() -> ProviderFactory {
    Box::new(|url| {
        Ok(Arc::new(crate::local::LocalProvider::new(
            &url.resource,
            url.flag("create"),
        )))
    })
}

fn memory_factory() -> ProviderFactory {
    Box::new(|_url| Ok(Arc::new(crate::memory::MemoryProvider::new())))
}

/// Create a registry with the built-in openers.
///
/// - pyfs: `osfs` (local directory), `mem` (in-memory)
/// - fsspec: `file` and `local` (local directory), `memory` (in-memory)
pub fn create_default_registry() -> ProviderRegistry {
    let builtin: [(BackendKind, &str, ProviderFactory); 5] = [
        (BackendKind::PyFs, "osfs", local_factory()),
        (BackendKind::PyFs, "mem", memory_factory()),
        (BackendKind::FsSpec, "file", local_factory()),
        (BackendKind::FsSpec, "local", local_factory()),
        (BackendKind::FsSpec, "memory", memory_factory()),
    ];

    let mut registry = ProviderRegistry::new();
    for (kind, scheme, factory) in builtin {
        registry
            .factories
            .insert((kind, scheme.to_string()), factory);
    }
    registry
}
