//! Shutdown and crash reporting.
//!
//! Signal handlers only flip a flag; the loop notices it at the next tick
//! and tears the pool down in ordinary context.

use std::backtrace::Backtrace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Installs a SIGINT/SIGTERM handler and returns the flag it sets.
///
/// A second signal exits immediately without teardown.
pub fn install_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();

    ctrlc::set_handler(move || {
        if shutdown_flag.swap(true, Ordering::SeqCst) {
            log::warn!("received second signal, forcing immediate exit");
            std::process::exit(1);
        }
        log::info!("received shutdown signal, releasing connections");
    })?;

    Ok(shutdown)
}

/// Logs panics together with a captured backtrace.
pub fn install_panic_reporter() {
    std::panic::set_hook(Box::new(|info| {
        let trace = Backtrace::force_capture();
        log::error!("{info}\n{trace}");
    }));
}
