// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable per-project identity derived from the editor project path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Short hex tag derived from the absolute, canonicalized project path.
/// Immutable for the lifetime of the daemon process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectIdentity(String);

impl ProjectIdentity {
    /// Width of the truncated hex tag. Collisions are acceptable: the bridge
    /// only ever pairs with a single editor peer at a time (see Non-goals).
    const TAG_LEN: usize = 12;

    pub fn from_path(path: &Path) -> Self {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let digest = hasher.finish();
        let hex = format!("{digest:016x}");
        Self(hex[..Self::TAG_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
