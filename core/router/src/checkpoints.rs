//! Checkpoint policy that stores nothing.

use crate::contents::Checkpoint;

/// Reports a single fixed checkpoint and ignores every mutation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCheckpoints;

impl NullCheckpoints {
    pub const ID: &'static str = "checkpoint";

    pub fn null_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            id: Self::ID.to_string(),
            last_modified: String::new(),
        }
    }

    pub fn create(&self, _path: &str) -> Checkpoint {
        self.null_checkpoint()
    }

    pub fn list(&self, _path: &str) -> Vec<Checkpoint> {
        vec![self.null_checkpoint()]
    }

    pub fn restore(&self, _checkpoint_id: &str, _path: &str) {}

    pub fn rename(&self, _checkpoint_id: &str, _old_path: &str, _new_path: &str) {}

    pub fn delete(&self, _checkpoint_id: &str, _path: &str) {}
}
