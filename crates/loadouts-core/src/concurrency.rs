use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Exclusive advisory lock on a journal directory, released on drop.
#[derive(Debug)]
pub struct JournalLock {
    lock_file: File,
}

impl JournalLock {
    fn open(lock_path: &Path) -> Result<File, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?)
    }

    /// `None` when another process holds the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = Self::open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for JournalLock {
    fn drop(&mut self) {
        if let Err(e) = self.lock_file.unlock() {
            warn!("failed to release journal lock: {e}");
        }
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First ctrl-c asks for a clean shutdown, the second exits immediately.
pub fn install_signal_handler() {
    let result = ctrlc::set_handler(move || {
        if shutdown_requested() {
            std::process::exit(1);
        }
        request_shutdown();
        eprintln!("\nshutdown requested, finishing current cycle (ctrl-c again to force)");
    });
    if let Err(e) = result {
        warn!("failed to install signal handler: {e}");
    }
}

/// Raise the shutdown flag without a signal.
pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Polled by long-running loops between units of work.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
