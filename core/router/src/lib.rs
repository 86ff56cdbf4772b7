//! Drive router for multifs.
//!
//! This module provides:
//! - Credential substitution for templated connection URLs
//! - A registry of live backend connections keyed by drive
//! - Reconciliation of declarative resource lists into that registry
//! - Path resolution and content-operation dispatch across drives
//!
//! # Architecture
//! The router sits between a content API and the storage providers. Every
//! logical path of the form `drive:relative/path` is resolved to one backend
//! connection and the operation is forwarded there unchanged.

pub mod auth;
pub mod checkpoints;
pub mod config;
pub mod contents;
pub mod dispatch;
pub mod fs_manager;
pub mod open;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod service;

pub use auth::{substitute, Substitution, TerminalPrompt, TokenPrompt};
pub use checkpoints::NullCheckpoints;
pub use config::RouterConfig;
pub use contents::{Checkpoint, ContentFormat, ContentModel, ContentType, ContentsManager, GetOptions};
pub use dispatch::MetaManager;
pub use fs_manager::FsContentsManager;
pub use open::open_backend;
pub use registry::{BackendConnection, BackendRegistry, Generation};
pub use resolver::{resolve, resolve_pair, Resolved};
pub use resource::{AuthMode, ReconcileOptions, ResourceRecord, ResourceSpec};
pub use service::{ReconcileRequest, ResourceService};
