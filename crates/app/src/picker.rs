use access::FileRef;
use std::path::PathBuf;

/// Lets the user choose a single document. `None` means the pick was cancelled.
pub trait DocumentPicker {
    fn pick(&mut self) -> Option<FileRef>;
}

/// Hands over a path chosen up front, once.
#[derive(Debug, Clone, Default)]
pub struct PresetPicker {
    path: Option<PathBuf>,
}

impl PresetPicker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    pub fn cancelled() -> Self {
        Self { path: None }
    }
}

impl DocumentPicker for PresetPicker {
    fn pick(&mut self) -> Option<FileRef> {
        self.path.take().map(FileRef::new)
    }
}

/// Native open dialog limited to PDF files.
#[cfg(feature = "dialog")]
#[derive(Debug, Clone, Default)]
pub struct DialogPicker {
    title: Option<String>,
}

#[cfg(feature = "dialog")]
impl DialogPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[cfg(feature = "dialog")]
impl DocumentPicker for DialogPicker {
    fn pick(&mut self) -> Option<FileRef> {
        let mut dialog = rfd::FileDialog::new().add_filter("PDF", &["pdf"]);
        if let Some(title) = &self.title {
            dialog = dialog.set_title(title.as_str());
        }

        dialog.pick_file().map(FileRef::new)
    }
}
