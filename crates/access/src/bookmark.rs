use crate::{AccessError, AccessToken, FileRef};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const RECORD_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkOptions {
    /// Canonical path plus the file's on-disk identity.
    Full,
    /// Path only. Cannot detect a file replaced in place.
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBookmark {
    pub file: FileRef,
    pub is_stale: bool,
}

/// Creates and resolves durable references to files.
pub trait Bookmarks: Send + Sync {
    fn create(&self, file: &FileRef, options: BookmarkOptions) -> Result<AccessToken, AccessError>;
    fn resolve(&self, token: &AccessToken) -> Result<ResolvedBookmark, AccessError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FileStamp {
    device: u64,
    inode: u64,
}

impl FileStamp {
    #[cfg(unix)]
    fn of(meta: &fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self { device: meta.dev(), inode: meta.ino() })
    }

    #[cfg(not(unix))]
    fn of(_meta: &fs::Metadata) -> Option<Self> {
        None
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BookmarkRecord {
    version: u8,
    path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stamp: Option<FileStamp>,
}

/// Bookmarks for a desktop file system: the token is a small JSON record
/// naming the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathBookmarks;

impl PathBookmarks {
    pub fn new() -> Self {
        Self
    }

    fn full_record(file: &FileRef) -> std::io::Result<BookmarkRecord> {
        let path = fs::canonicalize(file.path())?;
        let meta = fs::metadata(&path)?;
        Ok(BookmarkRecord { version: RECORD_VERSION, path, stamp: FileStamp::of(&meta) })
    }

    fn minimal_record(file: &FileRef) -> std::io::Result<BookmarkRecord> {
        let path = if file.path().is_absolute() {
            file.path().to_path_buf()
        } else {
            std::env::current_dir()?.join(file.path())
        };
        Ok(BookmarkRecord { version: RECORD_VERSION, path, stamp: None })
    }
}

impl Bookmarks for PathBookmarks {
    fn create(&self, file: &FileRef, options: BookmarkOptions) -> Result<AccessToken, AccessError> {
        let record = match options {
            BookmarkOptions::Full => Self::full_record(file),
            BookmarkOptions::Minimal => Self::minimal_record(file),
        }
        .map_err(|err| AccessError::Bookmark(format!("{}: {err}", file.path().display())))?;

        serde_json::to_vec(&record)
            .map(AccessToken::new)
            .map_err(|err| AccessError::Bookmark(err.to_string()))
    }

    fn resolve(&self, token: &AccessToken) -> Result<ResolvedBookmark, AccessError> {
        let record: BookmarkRecord = serde_json::from_slice(token.as_bytes())
            .map_err(|err| AccessError::Unresolvable(format!("malformed token: {err}")))?;

        if record.version != RECORD_VERSION {
            return Err(AccessError::Unresolvable(format!(
                "unsupported token version {}",
                record.version
            )));
        }

        let meta = fs::metadata(&record.path).map_err(|err| {
            AccessError::Unresolvable(format!("{}: {err}", record.path.display()))
        })?;

        let is_stale = !meta.is_file()
            || matches!(record.stamp, Some(stamp) if FileStamp::of(&meta) != Some(stamp));

        Ok(ResolvedBookmark { file: FileRef::new(record.path), is_stale })
    }
}
