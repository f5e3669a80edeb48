//! The cooperative stop/pause control plane spec §4.7 describes: a
//! process-wide controller the engine consults before each batch and at
//! iteration boundaries, plus the OS signal and control-file surfaces that
//! drive it.

mod file_watcher;
mod signals;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fstree_error::{Error, Result};
use parking_lot::Mutex;
use tracing::info;

pub use file_watcher::ControlFileWatcher;
pub use signals::install_signal_handlers;

#[derive(Debug, Default)]
struct ControlState {
    stop_requested: AtomicBool,
    pause_requested: AtomicBool,
    pause_checkpointed: AtomicBool,
    stop_reason: Mutex<Option<String>>,
    pause_reason: Mutex<Option<String>>,
}

/// Shared, cloneable handle to the crawl's control plane. Every clone
/// observes the same underlying flags.
#[derive(Debug, Clone, Default)]
pub struct ControlPlane {
    state: Arc<ControlState>,
}

/// A callback invoked once, the first time a paused loop writes its
/// "pause" checkpoint, so the caller (the BFS engine) can record it via the
/// store without the control plane needing to know about stores.
pub trait PauseCheckpointer {
    fn checkpoint_pause(&self) -> Result<()>;
}

impl ControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips `stop_requested` once and clears any pending pause.
    pub fn request_stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        info!(reason = %reason, "stop requested");
        *self.state.stop_reason.lock() = Some(reason);
        self.state.stop_requested.store(true, Ordering::SeqCst);
        self.state.pause_requested.store(false, Ordering::SeqCst);
        self.state.pause_checkpointed.store(false, Ordering::SeqCst);
    }

    /// Flips `pause_requested`. The next control check blocks until
    /// [`ControlPlane::clear_pause`] or [`ControlPlane::request_stop`].
    pub fn request_pause(&self, reason: impl Into<String>) {
        let reason = reason.into();
        info!(reason = %reason, "pause requested");
        *self.state.pause_reason.lock() = Some(reason);
        self.state.pause_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_pause(&self) {
        info!("pause cleared");
        self.state.pause_requested.store(false, Ordering::SeqCst);
        self.state.pause_checkpointed.store(false, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.state.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.state.pause_requested.load(Ordering::SeqCst)
    }

    /// True once `wait_if_paused` has run `checkpoint_pause` for the
    /// pause currently in effect. Lets another thread (a test, the CLI)
    /// observe that the paused loop has actually reached a checkpoint
    /// rather than only that a pause was requested.
    pub fn pause_checkpointed(&self) -> bool {
        self.state.pause_checkpointed.load(Ordering::SeqCst)
    }

    pub fn stop_reason(&self) -> Option<String> {
        self.state.stop_reason.lock().clone()
    }

    /// Non-blocking check: returns `Err(Error::StopRequested)` if a stop is
    /// pending, `Ok(())` otherwise.
    pub fn check_stop(&self) -> Result<()> {
        if self.should_stop() {
            return Err(Error::stop_requested(self.stop_reason().unwrap_or_default()));
        }
        Ok(())
    }

    /// If paused, checkpoints once (via `checkpointer`) and spin-waits with
    /// 1-second granularity until resumed or stopped.
    pub async fn wait_if_paused(&self, checkpointer: &impl PauseCheckpointer) -> Result<()> {
        if !self.is_paused() {
            return Ok(());
        }
        checkpointer.checkpoint_pause()?;
        self.state.pause_checkpointed.store(true, Ordering::SeqCst);
        while self.is_paused() {
            self.check_stop()?;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Ok(())
    }
}
