use crate::{AccessError, AccessGuard, AccessToken, BookmarkOptions, Bookmarks, FileRef, ResolveError};
use std::sync::Arc;

/// Turns files into persistable tokens and tokens back into files.
#[derive(Clone)]
pub struct AccessTokenResolver {
    bookmarks: Arc<dyn Bookmarks>,
}

impl AccessTokenResolver {
    pub fn new(bookmarks: Arc<dyn Bookmarks>) -> Self {
        Self { bookmarks }
    }

    /// Creates a token for the file behind `guard`.
    ///
    /// Taking the guard ties token creation to an open access scope. A full
    /// bookmark is attempted first, then a minimal one.
    pub fn create_token(&self, guard: &AccessGuard<'_>) -> Result<AccessToken, AccessError> {
        let file = guard.file();

        match self.bookmarks.create(file, BookmarkOptions::Full) {
            Ok(token) => Ok(token),
            Err(primary) => {
                tracing::debug!(path = %file.path().display(), error = %primary, "full bookmark failed, retrying minimal");
                self.bookmarks.create(file, BookmarkOptions::Minimal).inspect_err(|err| {
                    tracing::warn!(path = %file.path().display(), error = %err, "error creating bookmark");
                })
            }
        }
    }

    pub fn resolve(&self, token: &AccessToken) -> Result<FileRef, ResolveError> {
        match self.bookmarks.resolve(token) {
            Ok(resolved) if resolved.is_stale => {
                tracing::debug!(path = %resolved.file.path().display(), "bookmark is stale");
                Err(ResolveError::Stale)
            }
            Ok(resolved) => Ok(resolved.file),
            Err(err) => {
                tracing::warn!(error = %err, "error resolving bookmark");
                Err(ResolveError::Unresolvable(err.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for AccessTokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalAccess, PathBookmarks, ResolvedBookmark};
    use std::sync::Mutex;

    struct ScriptedBookmarks {
        fail_full: bool,
        fail_minimal: bool,
        stale: bool,
        attempts: Mutex<Vec<BookmarkOptions>>,
    }

    impl ScriptedBookmarks {
        fn new(fail_full: bool, fail_minimal: bool) -> Self {
            Self { fail_full, fail_minimal, stale: false, attempts: Mutex::new(Vec::new()) }
        }
    }

    impl Bookmarks for ScriptedBookmarks {
        fn create(&self, _file: &FileRef, options: BookmarkOptions) -> Result<AccessToken, AccessError> {
            self.attempts.lock().unwrap().push(options);
            let fail = match options {
                BookmarkOptions::Full => self.fail_full,
                BookmarkOptions::Minimal => self.fail_minimal,
            };
            if fail {
                return Err(AccessError::Bookmark(format!("{options:?} refused")));
            }
            Ok(AccessToken::new(format!("{options:?}").into_bytes()))
        }

        fn resolve(&self, _token: &AccessToken) -> Result<ResolvedBookmark, AccessError> {
            Ok(ResolvedBookmark { file: FileRef::new("/tmp/doc.pdf"), is_stale: self.stale })
        }
    }

    fn fixture() -> (tempfile::TempDir, FileRef) {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.5").expect("fixture should be written");
        (temp, FileRef::new(path))
    }

    #[test]
    fn primary_strategy_wins_when_it_succeeds() {
        let (_temp, file) = fixture();
        let bookmarks = Arc::new(ScriptedBookmarks::new(false, false));
        let resolver = AccessTokenResolver::new(bookmarks.clone());
        let access = LocalAccess::new();

        let guard = AccessGuard::acquire(&access, &file).expect("access should be granted");
        let token = resolver.create_token(&guard).expect("token should be created");

        assert_eq!(token.as_bytes(), b"Full");
        assert_eq!(*bookmarks.attempts.lock().unwrap(), vec![BookmarkOptions::Full]);
    }

    #[test]
    fn falls_back_to_minimal_bookmark() {
        let (_temp, file) = fixture();
        let bookmarks = Arc::new(ScriptedBookmarks::new(true, false));
        let resolver = AccessTokenResolver::new(bookmarks.clone());
        let access = LocalAccess::new();

        let guard = AccessGuard::acquire(&access, &file).expect("access should be granted");
        let token = resolver.create_token(&guard).expect("fallback should succeed");

        assert_eq!(token.as_bytes(), b"Minimal");
        assert_eq!(
            *bookmarks.attempts.lock().unwrap(),
            vec![BookmarkOptions::Full, BookmarkOptions::Minimal]
        );
    }

    #[test]
    fn fails_when_both_strategies_fail() {
        let (_temp, file) = fixture();
        let resolver = AccessTokenResolver::new(Arc::new(ScriptedBookmarks::new(true, true)));
        let access = LocalAccess::new();

        let guard = AccessGuard::acquire(&access, &file).expect("access should be granted");
        assert!(matches!(resolver.create_token(&guard), Err(AccessError::Bookmark(_))));
    }

    #[test]
    fn stale_bookmark_is_reported_as_stale() {
        let bookmarks = ScriptedBookmarks { stale: true, ..ScriptedBookmarks::new(false, false) };
        let resolver = AccessTokenResolver::new(Arc::new(bookmarks));

        assert_eq!(resolver.resolve(&AccessToken::new(Vec::new())), Err(ResolveError::Stale));
    }

    #[test]
    fn round_trips_through_path_bookmarks() {
        let (_temp, file) = fixture();
        let resolver = AccessTokenResolver::new(Arc::new(PathBookmarks::new()));
        let access = LocalAccess::new();

        let token = {
            let guard = AccessGuard::acquire(&access, &file).expect("access should be granted");
            resolver.create_token(&guard).expect("token should be created")
        };
        assert_eq!(access.outstanding(), 0);

        let resolved = resolver.resolve(&token).expect("token should resolve");
        assert_eq!(resolved.identity(), file.identity());

        std::fs::remove_file(file.path()).expect("fixture should be removed");
        assert!(matches!(resolver.resolve(&token), Err(ResolveError::Unresolvable(_))));
    }
}
