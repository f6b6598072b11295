//! Background thread that keeps the directory store under its size budget.

use super::directory::Shared;
use crate::error::StoreError;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on how long a stop request goes unnoticed.
const MAX_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Periodic cull loop for one store.
///
/// Each cycle takes the store's global lock exclusively, so it never overlaps
/// a read, a write or `close()`. Failed cycles are logged and the loop waits
/// for the next one. Dropping the daemon stops and joins the thread.
pub(crate) struct CullDaemon {
    thread_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl CullDaemon {
    pub(crate) fn start(shared: Arc<Shared>, interval: Duration) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let thread_handle = thread::Builder::new()
            .name("ssim-cull".to_string())
            .spawn(move || Self::run_loop(&shared, interval, &shutdown_clone))?;

        info!(interval_secs = interval.as_secs_f64(), "Cull daemon started");

        Ok(Self {
            thread_handle: Some(thread_handle),
            shutdown,
        })
    }

    fn run_loop(shared: &Shared, interval: Duration, shutdown: &AtomicBool) {
        let check_interval = interval.min(MAX_CHECK_INTERVAL);
        let mut elapsed = Duration::ZERO;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                debug!("Cull daemon received shutdown signal");
                break;
            }

            thread::sleep(check_interval);
            elapsed += check_interval;

            if elapsed < interval {
                continue;
            }
            elapsed = Duration::ZERO;

            match shared.cull() {
                Ok(Some(report)) => info!(
                    files_deleted = report.files_deleted,
                    bytes_freed = report.bytes_freed,
                    size_after = report.size_after,
                    delete_failures = report.delete_failures,
                    duration_ms = report.duration.as_millis() as u64,
                    "Cull cycle complete"
                ),
                Ok(None) => {}
                Err(StoreError::Closed) => break,
                Err(e) => warn!(error = %e, "Cull cycle failed"),
            }
        }

        debug!("Cull daemon stopped");
    }

    /// Ask the loop to stop at its next check. Non-blocking.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Wait for the thread to finish.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                warn!("Cull daemon thread panicked: {:?}", e);
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CullDaemon {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::layout::storage_dir;
    use std::fs;
    use tempfile::TempDir;

    fn shared_with_budget(temp: &TempDir, budget: u64) -> Arc<Shared> {
        let dir = storage_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        Arc::new(Shared::new(dir, budget))
    }

    #[test]
    fn test_daemon_starts_and_stops() {
        let temp = TempDir::new().unwrap();
        let mut daemon =
            CullDaemon::start(shared_with_budget(&temp, 1000), Duration::from_secs(60)).unwrap();
        assert!(daemon.is_running());

        daemon.shutdown();
        daemon.join();
        assert!(!daemon.is_running());
    }

    #[test]
    fn test_daemon_culls_over_budget_cache() {
        let temp = TempDir::new().unwrap();
        let shared = shared_with_budget(&temp, 100);
        let uid_dir = shared.storage_dir().join("a_cache");
        fs::create_dir_all(&uid_dir).unwrap();
        let victim = uid_dir.join("instance_1_x_1_image.png");
        fs::write(&victim, vec![0u8; 500]).unwrap();

        let _daemon = CullDaemon::start(Arc::clone(&shared), Duration::from_millis(50)).unwrap();

        for _ in 0..100 {
            if !victim.exists() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!victim.exists());
    }

    #[test]
    fn test_daemon_exits_when_store_closed() {
        let temp = TempDir::new().unwrap();
        let shared = shared_with_budget(&temp, 100);
        shared.mark_closed();

        let daemon = CullDaemon::start(shared, Duration::from_millis(10)).unwrap();
        for _ in 0..100 {
            if !daemon.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!daemon.is_running());
    }
}
