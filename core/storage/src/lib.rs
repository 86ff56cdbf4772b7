//! Storage backend abstraction for multifs.
//!
//! This module provides a trait-based capability set for different storage
//! backends (local disk, in-memory, ...) and an opener registry that turns a
//! connection URL plus a backend kind into a live provider.
//!
//! # Design Principles
//! - Provider isolation: no provider-specific logic in the router
//! - Async operations: all I/O operations are async
//! - Unified error semantics: consistent error types across providers

pub mod fsurl;
pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;

pub use fsurl::{redact, FsUrl};
pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use provider::{Metadata, StorageProvider};
pub use registry::{create_default_registry, BackendKind, ProviderFactory, ProviderRegistry};
