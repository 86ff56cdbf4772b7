//! Direct backend opening for offline use.

use std::sync::Arc;
use tracing::debug;

use crate::auth::{prompt_substitute, TokenPrompt};
use multifs_common::Result;
use multifs_storage::{create_default_registry, redact, BackendKind, StorageProvider};

/// Open a backend from a templated URL, prompting for every token.
///
/// Bypasses the registry entirely. The prompt may block on a human, so
/// this must only be called from interactive tools, never while serving
/// requests.
///
/// # Errors
/// - The prompt fails
/// - The URL cannot be opened or the backend is unreachable
pub async fn open_backend(
    url: &str,
    kind: BackendKind,
    prompt: &dyn TokenPrompt,
) -> Result<Arc<dyn StorageProvider>> {
    let resolved = prompt_substitute(url, prompt)?;
    debug!(url = %redact(url), kind = %kind, "Opening backend directly");
    create_default_registry().open(kind, &resolved).await
}
