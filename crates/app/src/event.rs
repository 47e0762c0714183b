use std::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReaderCommand {
    NextPage,
    PreviousPage,
    GoToPage(u32),
    ScrollBy(f32),
    Resize { width_px: f32, height_px: f32 },
    Close,
}

/// Everything the UI thread reacts to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiEvent {
    /// The viewer now shows this zero-based page of the document opened as
    /// `generation`.
    PageChanged { generation: u64, page: u32 },
    AutosaveTick,
    Command(ReaderCommand),
}

/// Posts events onto the UI thread's queue from any thread.
#[derive(Debug, Clone)]
pub struct UiHandle {
    sender: Sender<UiEvent>,
}

impl UiHandle {
    pub(crate) fn new(sender: Sender<UiEvent>) -> Self {
        Self { sender }
    }

    /// Returns `false` once the screen is gone.
    pub fn post(&self, event: UiEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn command(&self, command: ReaderCommand) -> bool {
        self.post(UiEvent::Command(command))
    }
}
