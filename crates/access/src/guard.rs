use crate::{AccessError, FileRef};
use std::fs::File;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Start/stop bracketing for paths that live outside the app's own storage.
pub trait ScopedAccess: Send + Sync {
    /// Returns `false` when the process may not read `file`.
    fn start_accessing(&self, file: &FileRef) -> bool;
    fn stop_accessing(&self, file: &FileRef);
}

/// Open access scope for one file. Dropping the guard ends the scope.
///
/// Guards are independent: two guards on the same file each start and each
/// stop their own scope.
pub struct AccessGuard<'a> {
    access: &'a dyn ScopedAccess,
    file: FileRef,
}

impl<'a> AccessGuard<'a> {
    pub fn acquire(access: &'a dyn ScopedAccess, file: &FileRef) -> Result<Self, AccessError> {
        if !access.start_accessing(file) {
            tracing::warn!(path = %file.path().display(), "failed to access security-scoped file");
            return Err(AccessError::Denied(file.path().to_path_buf()));
        }

        Ok(Self { access, file: file.clone() })
    }

    pub fn file(&self) -> &FileRef {
        &self.file
    }
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.access.stop_accessing(&self.file);
    }
}

impl std::fmt::Debug for AccessGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGuard").field("file", &self.file).finish()
    }
}

/// Desktop access: any file the process can open for reading.
///
/// A path that does not exist is still granted so callers can report it as
/// missing rather than denied.
#[derive(Debug, Default)]
pub struct LocalAccess {
    outstanding: AtomicUsize,
}

impl LocalAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scopes started and not yet stopped.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl ScopedAccess for LocalAccess {
    fn start_accessing(&self, file: &FileRef) -> bool {
        let granted = match File::open(file.path()) {
            Ok(handle) => handle.metadata().map(|meta| meta.is_file()).unwrap_or(false),
            Err(err) => err.kind() == ErrorKind::NotFound,
        };

        if granted {
            self.outstanding.fetch_add(1, Ordering::SeqCst);
        }
        granted
    }

    fn stop_accessing(&self, _file: &FileRef) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAccess {
        deny: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScopedAccess for RecordingAccess {
        fn start_accessing(&self, _file: &FileRef) -> bool {
            self.calls.lock().unwrap().push("start");
            !self.deny
        }

        fn stop_accessing(&self, _file: &FileRef) {
            self.calls.lock().unwrap().push("stop");
        }
    }

    fn fixture() -> (tempfile::TempDir, FileRef) {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.5").expect("fixture should be written");
        (temp, FileRef::new(path))
    }

    #[test]
    fn guard_stops_access_on_drop() {
        let access = RecordingAccess::default();
        let file = FileRef::new("/tmp/doc.pdf");

        {
            let guard = AccessGuard::acquire(&access, &file).expect("access should be granted");
            assert_eq!(guard.file(), &file);
        }

        assert_eq!(*access.calls.lock().unwrap(), vec!["start", "stop"]);
    }

    #[test]
    fn guard_stops_access_on_early_error_return() {
        fn use_file(access: &dyn ScopedAccess, file: &FileRef) -> Result<(), AccessError> {
            let _guard = AccessGuard::acquire(access, file)?;
            Err(AccessError::Bookmark("boom".to_owned()))
        }

        let access = RecordingAccess::default();
        assert!(use_file(&access, &FileRef::new("/tmp/doc.pdf")).is_err());
        assert_eq!(*access.calls.lock().unwrap(), vec!["start", "stop"]);
    }

    #[test]
    fn guard_stops_access_on_panic() {
        let access = RecordingAccess::default();
        let file = FileRef::new("/tmp/doc.pdf");

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = AccessGuard::acquire(&access, &file).expect("access should be granted");
            panic!("render failed");
        }));

        assert!(result.is_err());
        assert_eq!(*access.calls.lock().unwrap(), vec!["start", "stop"]);
    }

    #[test]
    fn denied_access_never_stops() {
        let access = RecordingAccess { deny: true, ..RecordingAccess::default() };
        let err = AccessGuard::acquire(&access, &FileRef::new("/tmp/doc.pdf"))
            .expect_err("access should be denied");

        assert!(matches!(err, AccessError::Denied(_)));
        assert_eq!(*access.calls.lock().unwrap(), vec!["start"]);
    }

    #[test]
    fn overlapping_guards_are_independent() {
        let (_temp, file) = fixture();
        let access = LocalAccess::new();

        let outer = AccessGuard::acquire(&access, &file).expect("outer scope");
        let inner = AccessGuard::acquire(&access, &file).expect("inner scope");
        assert_eq!(access.outstanding(), 2);

        drop(inner);
        assert_eq!(access.outstanding(), 1);
        drop(outer);
        assert_eq!(access.outstanding(), 0);
    }

    #[test]
    fn local_access_grants_missing_files_and_denies_directories() {
        let (temp, _file) = fixture();
        let access = LocalAccess::new();

        assert!(access.start_accessing(&FileRef::new(temp.path().join("gone.pdf"))));
        assert!(!access.start_accessing(&FileRef::new(temp.path())));
        assert_eq!(access.outstanding(), 1);
    }
}
