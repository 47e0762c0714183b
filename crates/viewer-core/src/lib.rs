//! Viewer surface: loads a document, lays its pages out for the viewport and
//! tracks which page is visible.

mod layout;

use layout::{
    current_page_from_viewport, layout_page_heights, max_scroll_offset, page_start_offset,
    ViewportState,
};

use access::{AccessError, AccessGuard, FileRef, ScopedAccess};
use pdf_engine::{DocumentHandle, OpenSource, PageSize, PdfEngine, PdfEngineError};
use std::time::{Duration, Instant};

/// Delay before retrying an initial page that was not yet addressable.
pub const INITIAL_PAGE_RETRY_DELAY: Duration = Duration::from_millis(100);

const MAX_NAVIGATION_RETRIES: u8 = 3;

/// Receives the zero-based index of the visible page whenever it changes.
pub trait PageChangeListener: Send {
    fn page_changed(&self, page_index: u32);
}

impl<F> PageChangeListener for F
where
    F: Fn(u32) + Send,
{
    fn page_changed(&self, page_index: u32) {
        self(page_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { page_count: u32 },
    /// The same file is already on screen; nothing was reloaded.
    AlreadyLoaded,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error("no document loaded")]
    NoDocument,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
}

#[derive(Debug)]
struct LoadedDocument {
    file: FileRef,
    handle: DocumentHandle,
    page_sizes: Vec<PageSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingNavigation {
    page: u32,
    due: Instant,
    retries_left: u8,
}

pub struct ViewerSurface<E> {
    engine: E,
    document: Option<LoadedDocument>,
    viewport: ViewportState,
    current_page: u32,
    pending: Option<PendingNavigation>,
    listener: Option<Box<dyn PageChangeListener>>,
}

impl<E: PdfEngine> ViewerSurface<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            document: None,
            viewport: ViewportState::default(),
            current_page: 0,
            pending: None,
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: impl PageChangeListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn file(&self) -> Option<&FileRef> {
        self.document.as_ref().map(|document| &document.file)
    }

    pub fn is_loaded_for(&self, file: &FileRef) -> bool {
        self.file() == Some(file)
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |document| document.page_sizes.len() as u32)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Page still waiting for the layout to become ready.
    pub fn pending_page(&self) -> Option<u32> {
        self.pending.map(|pending| pending.page)
    }

    /// Pages can be addressed once a document is loaded and the viewport has a size.
    pub fn is_layout_ready(&self) -> bool {
        self.document.is_some()
            && self.viewport.viewport_width_px > 0.0
            && self.viewport.viewport_height_px > 0.0
    }

    /// Loads `file`, optionally positioned at `initial_page`.
    ///
    /// The access scope is held only while the engine reads the file. An
    /// initial page past the end is ignored and the viewer stays on page 0.
    pub fn load(
        &mut self,
        file: &FileRef,
        access: &dyn ScopedAccess,
        initial_page: Option<u32>,
    ) -> Result<LoadOutcome, ViewerError> {
        if self.is_loaded_for(file) {
            tracing::debug!(path = %file.path().display(), "document already loaded");
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        self.unload();

        let handle = {
            let _guard = AccessGuard::acquire(access, file)?;
            self.engine.open(OpenSource::from(file.path()))?
        };

        let page_sizes = match self.engine.page_sizes(handle) {
            Ok(sizes) => sizes,
            Err(err) => {
                let _ = self.engine.close(handle);
                return Err(err.into());
            }
        };
        let page_count = page_sizes.len() as u32;

        self.document = Some(LoadedDocument { file: file.clone(), handle, page_sizes });
        self.current_page = 0;
        self.relayout();
        tracing::debug!(path = %file.path().display(), page_count, "document loaded");

        match initial_page {
            Some(page) if page < page_count => self.request_page(page, Instant::now()),
            Some(page) => {
                tracing::debug!(page, page_count, "initial page out of range, opening at first page");
            }
            None => {}
        }

        Ok(LoadOutcome::Loaded { page_count })
    }

    pub fn unload(&mut self) {
        if let Some(document) = self.document.take() {
            if let Err(err) = self.engine.close(document.handle) {
                tracing::warn!(error = %err, "error closing document");
            }
        }
        self.current_page = 0;
        self.pending = None;
        self.viewport.scroll_offset_px = 0.0;
        self.viewport.page_heights_px.clear();
    }

    pub fn go_to_page(&mut self, page: u32) -> Result<(), ViewerError> {
        let page_count = self.page_count();
        if self.document.is_none() {
            return Err(ViewerError::NoDocument);
        }
        if page >= page_count {
            return Err(ViewerError::PageOutOfRange { page, page_count });
        }

        self.request_page(page, Instant::now());
        Ok(())
    }

    pub fn next_page(&mut self) -> Result<(), ViewerError> {
        let last = self.page_count().saturating_sub(1);
        self.go_to_page((self.current_page + 1).min(last))
    }

    pub fn previous_page(&mut self) -> Result<(), ViewerError> {
        self.go_to_page(self.current_page.saturating_sub(1))
    }

    pub fn scroll_by(&mut self, delta_px: f32) {
        if !self.is_layout_ready() {
            return;
        }

        let max = max_scroll_offset(&self.viewport);
        self.viewport.scroll_offset_px = (self.viewport.scroll_offset_px + delta_px).clamp(0.0, max);
        self.set_current_page(current_page_from_viewport(&self.viewport));
    }

    /// Applies a new viewport size, keeping the current page in place, and
    /// retries any navigation that was waiting for the layout.
    pub fn resize(&mut self, width_px: f32, height_px: f32) {
        self.viewport.viewport_width_px = width_px.max(0.0);
        self.viewport.viewport_height_px = height_px.max(0.0);
        self.relayout();

        if let Some(pending) = self.pending {
            if self.is_layout_ready() {
                self.pending = None;
                self.apply_page(pending.page);
            }
        }
    }

    /// Retries a deferred navigation once its delay has elapsed.
    pub fn poll(&mut self, now: Instant) {
        let Some(pending) = self.pending else {
            return;
        };
        if now < pending.due {
            return;
        }

        if self.is_layout_ready() {
            self.pending = None;
            self.apply_page(pending.page);
        } else if pending.retries_left <= 1 {
            tracing::debug!(page = pending.page, "page never became addressable, giving up");
            self.pending = None;
        } else {
            self.pending = Some(PendingNavigation {
                due: now + INITIAL_PAGE_RETRY_DELAY,
                retries_left: pending.retries_left - 1,
                ..pending
            });
        }
    }

    fn request_page(&mut self, page: u32, now: Instant) {
        if self.is_layout_ready() {
            self.pending = None;
            self.apply_page(page);
        } else {
            self.pending = Some(PendingNavigation {
                page,
                due: now + INITIAL_PAGE_RETRY_DELAY,
                retries_left: MAX_NAVIGATION_RETRIES,
            });
        }
    }

    fn apply_page(&mut self, page: u32) {
        let max = max_scroll_offset(&self.viewport);
        self.viewport.scroll_offset_px = page_start_offset(page, &self.viewport).min(max);
        self.set_current_page(page);
    }

    fn set_current_page(&mut self, page: u32) {
        if page == self.current_page {
            return;
        }

        self.current_page = page;
        if let Some(listener) = &self.listener {
            listener.page_changed(page);
        }
    }

    fn relayout(&mut self) {
        let Some(document) = &self.document else {
            return;
        };

        self.viewport.page_heights_px =
            layout_page_heights(&document.page_sizes, self.viewport.viewport_width_px);

        if self.is_layout_ready() {
            let max = max_scroll_offset(&self.viewport);
            self.viewport.scroll_offset_px =
                page_start_offset(self.current_page, &self.viewport).min(max);
        }
    }
}

impl<E> std::fmt::Debug for ViewerSurface<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSurface")
            .field("document", &self.document)
            .field("current_page", &self.current_page)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
