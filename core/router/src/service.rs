//! Resource listing and reconciliation requests.
//!
//! Applies server policy to client-submitted resource lists before they
//! reach the registry.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RouterConfig;
use crate::dispatch::MetaManager;
use crate::resource::{ReconcileOptions, ResourceRecord, ResourceSpec};
use multifs_common::{Error, Result};

/// Body of a reconcile request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub options: ReconcileOptions,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

/// Server-side front of the router: config, validators and the manager.
pub struct ResourceService {
    config: RouterConfig,
    manager: Arc<MetaManager>,
    validators: Vec<Regex>,
}

impl ResourceService {
    /// Compile the configured validators.
    ///
    /// # Errors
    /// - `InvalidInput` if a validator is not a valid regular expression
    pub fn new(config: RouterConfig, manager: Arc<MetaManager>) -> Result<Self> {
        let validators = config
            .resource_validators
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    Error::InvalidInput(format!("Bad resource validator {:?}: {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            manager,
            validators,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<MetaManager> {
        &self.manager
    }

    /// Whether a client resource URL passes the allow-list.
    pub fn is_allowed(&self, url: &str) -> bool {
        self.validators.is_empty() || self.validators.iter().any(|v| v.is_match(url))
    }

    /// Records from the last reconciliation.
    pub async fn resources(&self) -> Vec<ResourceRecord> {
        self.manager.resources().await
    }

    /// Mount the server-configured resources.
    ///
    /// With `cache` false every resource is reconnected even when its drive
    /// is already live.
    pub async fn init_server_resources(&self, cache: bool) -> Result<Vec<ResourceRecord>> {
        let options = ReconcileOptions {
            cache,
            verbose: self.config.verbose,
            ..ReconcileOptions::default()
        };
        self.manager
            .reconcile(self.config.resources.clone(), &options)
            .await
    }

    /// Reconcile a client request.
    ///
    /// Client resources are dropped when user resources are disabled and
    /// otherwise filtered by the validators; rejected entries are silently
    /// left out of the result. With `_addServerside` the server resources
    /// are mounted first and are never filtered.
    pub async fn reconcile(&self, request: ReconcileRequest) -> Result<Vec<ResourceRecord>> {
        let ReconcileRequest {
            mut options,
            resources,
        } = request;
        let submitted = resources.len();

        let client: Vec<ResourceSpec> = if self.config.allow_user_resources {
            resources
                .into_iter()
                .filter(|spec| self.is_allowed(&spec.url))
                .collect()
        } else {
            Vec::new()
        };
        if client.len() < submitted {
            debug!(
                dropped = submitted - client.len(),
                "Client resources rejected by policy"
            );
        }

        let mut specs = Vec::new();
        if options.add_serverside {
            specs.extend(self.config.resources.iter().cloned());
        }
        specs.extend(client);
        options.verbose |= self.config.verbose;

        let records = self.manager.reconcile(specs, &options).await?;
        info!(resources = records.len(), "Reconcile request handled");
        Ok(records)
    }
}
