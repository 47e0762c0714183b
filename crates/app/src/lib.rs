//! Reader screen: picks documents, keeps the recent list, shows the viewer
//! and periodically saves reading progress.

mod event;
mod picker;
mod screen;
mod timer;

pub use event::{ReaderCommand, UiEvent, UiHandle};
#[cfg(feature = "dialog")]
pub use picker::DialogPicker;
pub use picker::{DocumentPicker, PresetPicker};
pub use screen::{OpenOutcome, ReaderError, ReaderScreen};
pub use timer::AutosaveTimer;
