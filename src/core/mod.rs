//! Process-wide state shared across subsystems.
//!
//! A single atomic flag: has shutdown been requested (Ctrl+C received)?
//! The watch loop polls it between debounce windows.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Request shutdown (called from the signal handler)
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Install the global Ctrl+C handler.
///
/// Must be called before any blocking operations in main().
pub fn setup_shutdown_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        crate::log!("watch"; "shutdown requested");
        request_shutdown();
    })?;
    Ok(())
}
