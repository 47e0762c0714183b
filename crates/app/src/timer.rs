use crate::{UiEvent, UiHandle};
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Posts [`UiEvent::AutosaveTick`] onto the UI queue every `interval` until stopped.
///
/// The tick itself does no work; the UI thread decides what to save.
#[derive(Debug)]
pub struct AutosaveTimer {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AutosaveTimer {
    pub fn start(interval: Duration, handle: UiHandle) -> io::Result<Self> {
        let (stop, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new().name("autosave-timer".to_string()).spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !handle.post(UiEvent::AutosaveTick) {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "autosave timer started");
        Ok(Self { stop: Some(stop), thread: Some(thread) })
    }

    /// Stops the timer and waits for its thread. No tick is posted afterwards.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("autosave timer thread panicked");
            }
            tracing::debug!("autosave timer stopped");
        }
    }
}

impl Drop for AutosaveTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
