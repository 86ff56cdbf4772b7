//! Resource specifications and the status records returned for them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use multifs_common::{DriveKey, Error, Result, Secret};

/// Where credential tokens in a resource URL are taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Client-supplied `tokenDict`.
    #[default]
    Ask,
    /// Process environment.
    Env,
    /// No substitution; any token stays missing.
    None,
}

/// Declarative description of one backend to mount.
///
/// Unknown fields are carried through to the resulting [`ResourceRecord`].
/// `tokenDict` is accepted on input but can never be serialized back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub auth: AuthMode,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_writable: Option<bool>,
    #[serde(default, skip_serializing)]
    pub token_dict: Option<HashMap<String, Secret>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            auth: AuthMode::default(),
            kind: None,
            default_writable: None,
            token_dict: None,
            extra: Map::new(),
        }
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_tokens<I, K, V>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.token_dict = Some(
            tokens
                .into_iter()
                .map(|(k, v)| (k.into(), Secret::new(v)))
                .collect(),
        );
        self
    }

    /// Remove and return the client-supplied token values.
    pub fn take_tokens(&mut self) -> Option<HashMap<String, Secret>> {
        self.token_dict.take()
    }

    /// Drop any client-supplied token values without using them.
    ///
    /// Values are zeroized as they are dropped.
    pub fn discard_tokens(&mut self) {
        self.token_dict = None;
    }
}

/// Reconciliation options sent alongside a resource list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Reuse live connections whose drive key is unchanged.
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Surface per-resource error messages in the records.
    #[serde(default)]
    pub verbose: bool,
    /// Prepend the server-configured resources to the submitted ones.
    #[serde(rename = "_addServerside", default)]
    pub add_serverside: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            cache: true,
            verbose: false,
            add_serverside: false,
        }
    }
}

/// Record fields computed during reconciliation. Copies sent back by a
/// client are dropped rather than carried through `extra`.
const RECORD_STATUS_KEYS: [&str; 4] = ["drive", "init", "missingTokens", "errors"];

/// Status of one resource after reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub name: String,
    pub url: String,
    pub auth: AuthMode,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_writable: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Drive key, or the not-initialized sentinel.
    pub drive: DriveKey,
    /// Whether a live backend is attached to `drive`.
    pub init: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_tokens: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ResourceRecord {
    /// Build the public record for a processed specification.
    ///
    /// # Errors
    /// - `InvariantViolation` if the specification still carries token values
    pub fn from_spec(spec: ResourceSpec, drive: DriveKey, init: bool) -> Result<Self> {
        if spec.token_dict.is_some() {
            return Err(Error::InvariantViolation(format!(
                "tokenDict not removed from resource '{}' during reconciliation",
                spec.name
            )));
        }

        let mut extra = spec.extra;
        for key in RECORD_STATUS_KEYS {
            extra.remove(key);
        }

        Ok(Self {
            name: spec.name,
            url: spec.url,
            auth: spec.auth,
            kind: spec.kind,
            default_writable: spec.default_writable,
            extra,
            drive,
            init,
            missing_tokens: None,
            errors: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_defaults() {
        let spec: ResourceSpec = serde_json::from_value(json!({
            "name": "data",
            "url": "osfs:///tmp"
        }))
        .unwrap();

        assert_eq!(spec.auth, AuthMode::Ask);
        assert!(spec.kind.is_none());
        assert!(spec.token_dict.is_none());
    }

    #[test]
    fn test_tokens_never_serialized() {
        let spec: ResourceSpec = serde_json::from_value(json!({
            "name": "s3",
            "url": "s3://{{key}}@bucket",
            "tokenDict": {"key": "AKIA"}
        }))
        .unwrap();
        assert!(spec.token_dict.is_some());

        let out = serde_json::to_value(&spec).unwrap();
        assert!(out.get("tokenDict").is_none());
        assert!(!out.to_string().contains("AKIA"));
    }

    #[test]
    fn test_record_rejects_leftover_tokens() {
        let spec = ResourceSpec::new("x", "mem://").with_tokens([("a", "b")]);
        let err = ResourceRecord::from_spec(spec, DriveKey::not_init(), false).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_record_echoes_public_fields() {
        let spec: ResourceSpec = serde_json::from_value(json!({
            "name": "data",
            "url": "mem://",
            "auth": "env",
            "type": "pyfs",
            "defaultWritable": false,
            "color": "blue"
        }))
        .unwrap();

        let record = ResourceRecord::from_spec(spec, DriveKey::from_url("mem://"), true).unwrap();
        let out = serde_json::to_value(&record).unwrap();

        assert_eq!(out["auth"], "env");
        assert_eq!(out["type"], "pyfs");
        assert_eq!(out["defaultWritable"], false);
        assert_eq!(out["color"], "blue");
        assert_eq!(out["init"], true);
        assert!(out.get("missingTokens").is_none());
        assert!(out.get("errors").is_none());
    }

    #[test]
    fn test_record_drops_returned_status_fields() {
        let spec: ResourceSpec = serde_json::from_value(json!({
            "name": "s",
            "url": "mem://",
            "drive": "_NOT_INIT",
            "init": false,
            "missingTokens": ["user"],
            "errors": ["unreachable"],
            "color": "blue"
        }))
        .unwrap();

        let record = ResourceRecord::from_spec(spec, DriveKey::from_url("mem://"), true).unwrap();
        let out = serde_json::to_string(&record).unwrap();

        assert_eq!(out.matches("\"drive\"").count(), 1);
        assert_eq!(out.matches("\"init\"").count(), 1);
        assert!(!out.contains("missingTokens"));
        assert!(!out.contains("errors"));
        assert!(out.contains("\"color\":\"blue\""));
    }

    #[test]
    fn test_options_defaults() {
        let options: ReconcileOptions = serde_json::from_value(json!({})).unwrap();
        assert!(options.cache);
        assert!(!options.verbose);
        assert!(!options.add_serverside);

        let options: ReconcileOptions =
            serde_json::from_value(json!({"cache": false, "_addServerside": true})).unwrap();
        assert!(!options.cache);
        assert!(options.add_serverside);
    }
}
