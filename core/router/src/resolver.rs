//! Logical path resolution.
//!
//! A logical path is `drive:relative/path`, or a plain path for the default
//! backend. A prefix that names no registered drive is not an error as long
//! as a default backend exists: the whole path is handed to it unchanged.

use std::sync::Arc;

use crate::fs_manager::FsContentsManager;
use crate::registry::{BackendConnection, Generation};
use multifs_common::{split_logical, DriveKey, Error, Result};

/// The backend and backend-relative path a logical path refers to.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Key of the backend the path resolved to.
    pub drive: DriveKey,
    pub connection: Arc<BackendConnection>,
    /// Path relative to the backend root.
    pub path: String,
    /// Whether the path named its drive explicitly.
    pub explicit: bool,
}

impl Resolved {
    pub fn contents(&self) -> &FsContentsManager {
        self.connection.contents()
    }

    /// Prefix that addresses the same backend in a logical path.
    pub fn prefix(&self) -> String {
        if self.explicit {
            format!("{}:", self.drive)
        } else {
            String::new()
        }
    }

    /// Logical path for another location on the same backend.
    pub fn logical(&self, relative: &str) -> String {
        format!("{}{}", self.prefix(), relative)
    }

    /// Whether both resolutions target the same live backend.
    pub fn same_backend(&self, other: &Resolved) -> bool {
        Arc::ptr_eq(&self.connection, &other.connection)
    }
}

/// Resolve one logical path against a generation.
///
/// # Errors
/// - `Unresolved` if the prefix names no drive and no default backend exists
pub fn resolve(path: &str, generation: &Generation) -> Result<Resolved> {
    if let Some((drive, rest)) = split_logical(path) {
        if let Some(connection) = generation.get(drive) {
            return Ok(Resolved {
                drive: connection.key().clone(),
                connection: connection.clone(),
                path: rest.to_string(),
                explicit: true,
            });
        }
    }

    match generation.default_connection() {
        Some(connection) => Ok(Resolved {
            drive: DriveKey::root(),
            connection: connection.clone(),
            path: path.to_string(),
            explicit: false,
        }),
        None => Err(Error::Unresolved(path.to_string())),
    }
}

/// Resolve an old/new pair that must land on the same backend.
///
/// # Errors
/// - `Unresolved` if either path cannot be resolved
/// - `CrossBackend` if the two paths resolve to different backends
pub fn resolve_pair(
    old_path: &str,
    new_path: &str,
    generation: &Generation,
) -> Result<(Resolved, Resolved)> {
    let old = resolve(old_path, generation)?;
    let new = resolve(new_path, generation)?;

    if !old.same_backend(&new) {
        return Err(Error::CrossBackend {
            old: old_path.to_string(),
            new: new_path.to_string(),
        });
    }
    Ok((old, new))
}
