//! Scoped file access and durable access tokens.
//!
//! A file handed over by the picker is only readable inside an access scope.
//! [`AccessGuard`] brackets every use of such a path, and
//! [`AccessTokenResolver`] turns a file into an [`AccessToken`] that can be
//! persisted and resolved back on a later launch.

mod bookmark;
mod guard;
mod resolver;

pub use bookmark::{BookmarkOptions, Bookmarks, PathBookmarks, ResolvedBookmark};
pub use doc_model::AccessToken;
pub use guard::{AccessGuard, LocalAccess, ScopedAccess};
pub use resolver::AccessTokenResolver;

use std::fs;
use std::path::{Path, PathBuf};

/// Transient reference to a file, valid while an access scope is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    path: PathBuf,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last path component, or the whole path when it has none.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Canonical path of the file, used as a stable identity.
    pub fn identity(&self) -> Option<String> {
        fs::canonicalize(&self.path).ok().map(|path| path.display().to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("access denied: {}", .0.display())]
    Denied(PathBuf),
    #[error("bookmark creation failed: {0}")]
    Bookmark(String),
    #[error("bookmark could not be resolved: {0}")]
    Unresolvable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("access token is stale")]
    Stale,
    #[error("access token is unresolvable: {0}")]
    Unresolvable(String),
}
