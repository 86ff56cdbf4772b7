//! Common utilities and types shared across multifs modules.
//!
//! This module provides the error taxonomy, drive keys, logical path
//! splitting and backend-relative paths used by every other crate.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{split_logical, ApiPath, DriveKey, Secret};
