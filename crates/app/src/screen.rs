use crate::{AutosaveTimer, DocumentPicker, ReaderCommand, UiEvent, UiHandle};
use access::{AccessGuard, AccessTokenResolver, FileRef, ScopedAccess};
use doc_model::{format_file_size, EntryId, OpenedFile, RecentFileEntry, UNKNOWN_FILE_SIZE};
use pdf_engine::{count_pages_on_disk, PdfEngine, PdfEngineError};
use std::fs;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{RecentFilesRepository, RecentFilesStore};
use viewer_core::{LoadOutcome, ViewerError, ViewerSurface, INITIAL_PAGE_RETRY_DELAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The viewer shows the document. `entry` is `None` when no access token
    /// could be created for it.
    Opened { entry: Option<EntryId>, page_count: u32 },
    Cancelled,
    AccessDenied,
    MissingFile,
    /// The recent entry no longer resolves to a file and was dropped.
    Removed,
}

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error(transparent)]
    Viewer(#[from] ViewerError),
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error("unable to start autosave timer: {0}")]
    Timer(#[from] std::io::Error),
    #[error("no recent file with id {0}")]
    UnknownEntry(EntryId),
}

#[derive(Debug)]
struct Session {
    generation: u64,
    entry: Option<EntryId>,
    current_page: u32,
    total_pages: u32,
}

/// Home list plus the document viewer, driven from a single thread.
///
/// Other threads reach the screen only through [`UiHandle`]; queued events
/// are handled by [`ReaderScreen::pump`] or [`ReaderScreen::run_until_closed`].
pub struct ReaderScreen<R, E> {
    store: RecentFilesStore<R>,
    resolver: AccessTokenResolver,
    access: Arc<dyn ScopedAccess>,
    viewer: ViewerSurface<E>,
    autosave_interval: Duration,
    timer: Option<AutosaveTimer>,
    session: Option<Session>,
    generation: u64,
    events: Receiver<UiEvent>,
    handle: UiHandle,
}

impl<R: RecentFilesRepository, E: PdfEngine> ReaderScreen<R, E> {
    pub fn new(
        store: RecentFilesStore<R>,
        resolver: AccessTokenResolver,
        access: Arc<dyn ScopedAccess>,
        engine: E,
        autosave_interval: Duration,
    ) -> Self {
        let (sender, events) = mpsc::channel();
        let handle = UiHandle::new(sender);

        Self {
            store,
            resolver,
            access,
            viewer: ViewerSurface::new(engine),
            autosave_interval,
            timer: None,
            session: None,
            generation: 0,
            events,
            handle,
        }
    }

    pub fn handle(&self) -> UiHandle {
        self.handle.clone()
    }

    pub fn recent_files(&self) -> &[RecentFileEntry] {
        self.store.entries()
    }

    pub fn store(&self) -> &RecentFilesStore<R> {
        &self.store
    }

    pub fn viewer(&self) -> &ViewerSurface<E> {
        &self.viewer
    }

    pub fn is_viewing(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_page(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.current_page)
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.total_pages)
    }

    pub fn current_entry(&self) -> Option<&RecentFileEntry> {
        let id = self.session.as_ref()?.entry?;
        self.store.get(id)
    }

    /// Page position overlay, one-based: `"3/12"`.
    pub fn page_label(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|session| format!("{}/{}", session.current_page + 1, session.total_pages))
    }

    pub fn pick_document(
        &mut self,
        picker: &mut dyn DocumentPicker,
    ) -> Result<OpenOutcome, ReaderError> {
        match picker.pick() {
            Some(file) => self.open_picked(file),
            None => {
                tracing::debug!("document pick cancelled");
                Ok(OpenOutcome::Cancelled)
            }
        }
    }

    /// Opens a freshly picked file at its first page and records it as recent.
    pub fn open_picked(&mut self, file: FileRef) -> Result<OpenOutcome, ReaderError> {
        let access = Arc::clone(&self.access);
        let guard = match AccessGuard::acquire(access.as_ref(), &file) {
            Ok(guard) => guard,
            Err(err) => {
                tracing::warn!(error = %err, "unable to access picked file");
                return Ok(OpenOutcome::AccessDenied);
            }
        };

        if !file.path().is_file() {
            tracing::warn!(path = %file.path().display(), "picked file does not exist");
            return Ok(OpenOutcome::MissingFile);
        }

        let token = self.resolver.create_token(&guard).ok();
        let total_pages = count_pages_on_disk(self.viewer.engine_mut(), file.path())?;
        let file_size = fs::metadata(file.path())
            .map(|metadata| format_file_size(metadata.len()))
            .unwrap_or_else(|_| UNKNOWN_FILE_SIZE.to_string());

        let entry = token.map(|access_token| {
            self.store.upsert_on_open(OpenedFile {
                name: file.display_name(),
                access_token,
                file_size,
                total_pages,
                file_identity: file.identity(),
            })
        });
        drop(guard);

        self.present(file, entry, None)
    }

    /// Reopens a recent file at its saved page. Entries that no longer
    /// resolve to an existing file are removed; a denied file keeps its entry.
    pub fn open_recent(&mut self, id: EntryId) -> Result<OpenOutcome, ReaderError> {
        let Some(entry) = self.store.get(id) else {
            return Err(ReaderError::UnknownEntry(id));
        };
        let last_page = entry.last_page_number;

        let file = match self.resolver.resolve(&entry.access_token) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "removing unresolvable recent file");
                self.store.remove(id);
                return Ok(OpenOutcome::Removed);
            }
        };

        let access = Arc::clone(&self.access);
        let exists = match AccessGuard::acquire(access.as_ref(), &file) {
            Ok(_guard) => file.path().is_file(),
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "unable to access recent file");
                return Ok(OpenOutcome::AccessDenied);
            }
        };

        if !exists {
            tracing::warn!(path = %file.path().display(), "recent file is missing");
            self.store.remove(id);
            return Ok(OpenOutcome::Removed);
        }

        self.present(file, Some(id), Some(last_page))
    }

    /// Leaves the viewer: stops autosave, saves the current page once and
    /// unloads the document.
    pub fn close(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }

        if let Some(mut session) = self.session.take() {
            session.current_page = self.viewer.current_page();
            if let Some(id) = session.entry {
                self.store.record_progress(id, session.current_page);
            }
            tracing::debug!(page = session.current_page, "viewer closed");
        }

        self.viewer.unload();
    }

    pub fn dispatch(&mut self, event: UiEvent) -> Result<(), ReaderError> {
        match event {
            UiEvent::PageChanged { generation, page } => match &mut self.session {
                Some(session) if session.generation == generation => session.current_page = page,
                _ => tracing::debug!(generation, page, "page change from a closed document ignored"),
            },
            UiEvent::AutosaveTick => self.save_progress(),
            UiEvent::Command(command) => self.apply_command(command)?,
        }

        Ok(())
    }

    /// Handles every queued event without blocking. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.dispatch_logged(event);
            handled += 1;
        }

        self.viewer.poll(Instant::now());
        // Deferred navigation may have queued a page change.
        while let Ok(event) = self.events.try_recv() {
            self.dispatch_logged(event);
            handled += 1;
        }

        handled
    }

    /// Runs the UI loop until the viewer is closed. `observe` sees the screen
    /// after every handled event.
    pub fn run_until_closed(&mut self, mut observe: impl FnMut(&Self, &UiEvent)) {
        while self.is_viewing() {
            match self.events.recv_timeout(INITIAL_PAGE_RETRY_DELAY) {
                Ok(event) => {
                    self.dispatch_logged(event);
                    observe(self, &event);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.viewer.poll(Instant::now());
        }
    }

    fn dispatch_logged(&mut self, event: UiEvent) {
        if let Err(err) = self.dispatch(event) {
            tracing::warn!(?event, error = %err, "error handling event");
        }
    }

    fn apply_command(&mut self, command: ReaderCommand) -> Result<(), ReaderError> {
        match command {
            ReaderCommand::NextPage => self.viewer.next_page()?,
            ReaderCommand::PreviousPage => self.viewer.previous_page()?,
            ReaderCommand::GoToPage(page) => self.viewer.go_to_page(page)?,
            ReaderCommand::ScrollBy(delta_px) => self.viewer.scroll_by(delta_px),
            ReaderCommand::Resize { width_px, height_px } => self.viewer.resize(width_px, height_px),
            ReaderCommand::Close => self.close(),
        }

        Ok(())
    }

    fn save_progress(&mut self) {
        let Some(session) = &self.session else {
            tracing::debug!("autosave tick without open document ignored");
            return;
        };

        if let Some(id) = session.entry {
            self.store.record_progress(id, session.current_page);
        }
    }

    fn present(
        &mut self,
        file: FileRef,
        entry: Option<EntryId>,
        initial_page: Option<u32>,
    ) -> Result<OpenOutcome, ReaderError> {
        if self.viewer.file().is_some_and(|shown| shown != &file) {
            self.close();
        }

        let shown = self
            .session
            .as_ref()
            .filter(|_| self.viewer.is_loaded_for(&file))
            .map(|session| session.generation);
        let generation = match shown {
            Some(generation) => generation,
            None => self.start_generation(),
        };

        let page_count = match self.viewer.load(&file, self.access.as_ref(), initial_page) {
            Ok(LoadOutcome::Loaded { page_count }) => page_count,
            Ok(LoadOutcome::AlreadyLoaded) => self.viewer.page_count(),
            Err(ViewerError::Access(err)) => {
                tracing::warn!(error = %err, "unable to access document");
                return Ok(OpenOutcome::AccessDenied);
            }
            Err(err) => return Err(err.into()),
        };

        self.session = Some(Session {
            generation,
            entry,
            current_page: self.viewer.current_page(),
            total_pages: page_count,
        });

        if self.timer.is_none() {
            self.timer = Some(AutosaveTimer::start(self.autosave_interval, self.handle.clone())?);
        }

        tracing::debug!(path = %file.path().display(), page_count, "document presented");
        Ok(OpenOutcome::Opened { entry, page_count })
    }

    /// Page events are stamped with the document they came from so that
    /// events still queued after a close never reach the next document.
    fn start_generation(&mut self) -> u64 {
        self.generation += 1;
        let generation = self.generation;

        let listener = self.handle.clone();
        self.viewer.set_listener(move |page| {
            listener.post(UiEvent::PageChanged { generation, page });
        });

        generation
    }
}

impl<R, E> std::fmt::Debug for ReaderScreen<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderScreen")
            .field("session", &self.session)
            .field("autosave_interval", &self.autosave_interval)
            .finish_non_exhaustive()
    }
}
