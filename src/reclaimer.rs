//! Background reclamation worker
//!
//! A named thread that runs a reclamation pass every `interval` until it is
//! shut down or dropped.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use stm_concurrency::TransactionManager;

/// Wakes the worker early on shutdown
#[derive(Default)]
struct ShutdownSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownSignal {
    fn shutdown(&self) {
        *self.stopped.lock() = true;
        self.cv.notify_all();
    }

    /// Returns `true` once shutdown was requested
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.cv.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

/// Handle to a running reclamation thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct ReclaimWorker {
    signal: Arc<ShutdownSignal>,
    handle: Option<JoinHandle<()>>,
}

impl ReclaimWorker {
    pub(crate) fn spawn(manager: TransactionManager, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::Config("reclaim interval must be non-zero".to_string()));
        }
        let signal = Arc::new(ShutdownSignal::default());
        let worker_signal = Arc::clone(&signal);

        let handle = std::thread::Builder::new()
            .name("stm-reclaimer".into())
            .spawn(move || {
                tracing::info!(interval_ms = interval.as_millis() as u64, "reclaim worker started");
                let mut passes = 0u64;
                while !worker_signal.wait_timeout(interval) {
                    let stats = manager.reclaim();
                    passes += 1;
                    if !stats.is_noop() {
                        tracing::trace!(
                            floor = stats.floor,
                            versions = stats.versions_discarded,
                            "background reclamation"
                        );
                    }
                }
                tracing::info!(passes, "reclaim worker stopped");
            })?;

        Ok(ReclaimWorker {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    /// Check if the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop(&mut self) -> Result<()> {
        self.signal.shutdown();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Internal("reclaim worker panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for ReclaimWorker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl std::fmt::Debug for ReclaimWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclaimWorker")
            .field("running", &self.is_running())
            .finish()
    }
}
