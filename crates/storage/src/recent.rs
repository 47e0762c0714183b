use crate::{KeyValueStore, StorageError};
use chrono::Utc;
use doc_model::{DedupKey, EntryId, OpenedFile, RecentFileEntry, RecentFiles};

/// Key under which the recent files list is persisted.
pub const RECENT_FILES_KEY: &str = "RecentPDFFiles";

/// Persistence for the recent files list.
pub trait RecentFilesRepository: Send {
    /// Absent or undecodable data yields an empty list.
    fn load(&self) -> Vec<RecentFileEntry>;
    fn save(&self, entries: &[RecentFileEntry]) -> Result<(), StorageError>;
}

impl<R: RecentFilesRepository + ?Sized> RecentFilesRepository for Box<R> {
    fn load(&self) -> Vec<RecentFileEntry> {
        (**self).load()
    }

    fn save(&self, entries: &[RecentFileEntry]) -> Result<(), StorageError> {
        (**self).save(entries)
    }
}

/// Stores the list as one JSON document at [`RECENT_FILES_KEY`].
#[derive(Debug, Clone)]
pub struct KeyValueRecentFiles<K> {
    store: K,
}

impl<K: KeyValueStore> KeyValueRecentFiles<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }
}

impl<K: KeyValueStore> RecentFilesRepository for KeyValueRecentFiles<K> {
    fn load(&self) -> Vec<RecentFileEntry> {
        let bytes = match self.store.get(RECENT_FILES_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "error reading recent files");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, "error loading recent files, starting empty");
                Vec::new()
            }
        }
    }

    fn save(&self, entries: &[RecentFileEntry]) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        self.store.set(RECENT_FILES_KEY, &bytes)
    }
}

/// The recent files list, cached in memory and written through on every change.
///
/// A failed write is logged; the in-memory list stays current and the next
/// successful write catches the persisted copy up.
#[derive(Debug)]
pub struct RecentFilesStore<R> {
    repository: R,
    files: RecentFiles,
    dedup_key: DedupKey,
}

impl<R: RecentFilesRepository> RecentFilesStore<R> {
    pub fn open(repository: R, dedup_key: DedupKey) -> Self {
        let files = RecentFiles::from_entries(repository.load());
        tracing::debug!(count = files.len(), "loaded recent files");
        Self { repository, files, dedup_key }
    }

    pub fn entries(&self) -> &[RecentFileEntry] {
        self.files.entries()
    }

    pub fn get(&self, id: EntryId) -> Option<&RecentFileEntry> {
        self.files.get(id)
    }

    /// Re-reads the persisted list, discarding the cached copy.
    pub fn reload(&mut self) {
        self.files = RecentFiles::from_entries(self.repository.load());
    }

    pub fn save(&self) -> Result<(), StorageError> {
        self.repository.save(self.files.entries())
    }

    /// Records a newly opened file at the front of the list.
    pub fn upsert_on_open(&mut self, opened: OpenedFile) -> EntryId {
        let entry = RecentFileEntry::from_opened(opened, Utc::now());
        let id = entry.id;
        let name = entry.name.clone();

        for displaced in self.files.insert_front(entry, self.dedup_key) {
            tracing::debug!(name = %displaced.name, id = %displaced.id, "dropped recent file");
        }

        self.persist();
        tracing::debug!(name = %name, id = %id, "saved recent file");
        id
    }

    /// Updates the last-read page. Unknown ids are ignored and return `false`.
    pub fn record_progress(&mut self, id: EntryId, page: u32) -> bool {
        if !self.files.record_progress(id, page) {
            tracing::debug!(id = %id, "progress for unknown recent file ignored");
            return false;
        }

        self.persist();
        true
    }

    pub fn remove(&mut self, id: EntryId) -> Option<RecentFileEntry> {
        let removed = self.files.remove(id)?;
        self.persist();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = self.save() {
            tracing::warn!(error = %err, "error saving recent files");
        }
    }
}
