//! Common types used throughout multifs.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Number of hex characters kept from the URL digest.
const DRIVE_KEY_LEN: usize = 8;

/// Key identifying one backend in the registry.
///
/// Derived from a connection URL: the first 8 lowercase hex characters of
/// its BLAKE2b-256 digest. The empty key is reserved for the default backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriveKey(String);

impl DriveKey {
    /// Sentinel reported for resources that could not be initialized.
    pub const NOT_INIT: &'static str = "_NOT_INIT";

    /// Derive the key for a connection URL.
    pub fn from_url(url: &str) -> Self {
        let digest = Blake2b::<U32>::digest(url.as_bytes());
        let hex: String = digest
            .iter()
            .take(DRIVE_KEY_LEN / 2)
            .map(|b| format!("{:02x}", b))
            .collect();
        Self(hex)
    }

    /// The default (root) backend key.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// The "not initialized" sentinel.
    pub fn not_init() -> Self {
        Self(Self::NOT_INIT.to_string())
    }

    /// Wrap a key received over the wire or split from a logical path.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Split a logical path into its drive prefix and remainder.
///
/// The split happens at the first `:`. Leading slashes before the drive are
/// ignored, so `/abc:x` and `abc:x` both name drive `abc`. Returns `None`
/// for a plain path with no drive prefix.
pub fn split_logical(path: &str) -> Option<(&str, &str)> {
    path.trim_start_matches('/').split_once(':')
}

/// A backend-relative path, `/`-separated and independent of storage.
///
/// Empty and `.` components are dropped; `..` is rejected so a path can
/// never climb above the backend root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiPath {
    components: Vec<String>,
}

impl ApiPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a path string into ApiPath.
    ///
    /// # Errors
    /// - Returns error if any component is `..` or contains a backslash
    pub fn parse(path: &str) -> crate::Result<Self> {
        let mut components = Vec::new();
        for comp in path.split('/') {
            match comp {
                "" | "." => continue,
                ".." => {
                    return Err(crate::Error::InvalidInput(format!(
                        "Path escapes root: {}",
                        path
                    )));
                }
                c if c.contains('\\') => {
                    return Err(crate::Error::InvalidInput(format!(
                        "Path component cannot contain separators: {}",
                        path
                    )));
                }
                c => components.push(c.to_string()),
            }
        }
        Ok(Self { components })
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/directory name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        if child.is_empty() || child == "." || child == ".." {
            return Err(crate::Error::InvalidInput(format!(
                "Invalid child component: {:?}",
                child
            )));
        }
        if child.contains('/') || child.contains('\\') {
            return Err(crate::Error::InvalidInput(
                "Child component cannot contain separators".to_string(),
            ));
        }
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Whether any component is a dot-file name.
    pub fn has_hidden_component(&self) -> bool {
        self.components.iter().any(|c| c.starts_with('.'))
    }

    /// Relative API form, without leading slash (`""` for root).
    pub fn as_relative(&self) -> String {
        self.components.join("/")
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        format!("/{}", self.components.join("/"))
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// Credential value that zeroizes on drop.
///
/// Deserializable so it can arrive in a request payload, but deliberately
/// not serializable.
#[derive(Clone, Zeroize, Deserialize)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {} bytes])", self.0.len())
    }
}
