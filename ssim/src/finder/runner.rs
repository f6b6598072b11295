//! Fixed-size worker pool for write-backs.

use crate::error::SsimError;
use parking_lot::Mutex;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs posted tasks on a fixed set of named threads.
///
/// Tasks are taken in posting order by whichever worker is free. `close()`
/// stops accepting tasks, lets the workers finish everything already
/// queued, and joins them.
pub struct WriteBackRunner {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WriteBackRunner {
    pub fn new(threads: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..threads.max(1))
            .map(|i| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("ssim-writeback-{}", i))
                    .spawn(move || Self::work(&receiver))
            })
            .collect::<io::Result<Vec<_>>>()?;

        debug!(threads = workers.len(), "Write-back runner started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    fn work(receiver: &Mutex<Receiver<Task>>) {
        loop {
            // Hold the receiver only while waiting, not while running
            let task = receiver.lock().recv();
            match task {
                Ok(task) => {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        warn!("Write-back task panicked");
                    }
                }
                Err(_) => break,
            }
        }
    }

    /// Queue a task. Fails once the runner is closed.
    pub fn post<F>(&self, task: F) -> Result<(), SsimError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender
                .send(Box::new(task))
                .map_err(|_| SsimError::WriteBackRejected),
            None => Err(SsimError::WriteBackRejected),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting tasks, drain the queue and join the workers. Idempotent.
    pub fn close(&self) {
        drop(self.sender.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        let count = workers.len();
        for handle in workers {
            if let Err(e) = handle.join() {
                warn!("Write-back worker panicked: {:?}", e);
            }
        }
        if count > 0 {
            debug!(threads = count, "Write-back runner closed");
        }
    }
}

impl Drop for WriteBackRunner {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_close_drains_queue() {
        let runner = WriteBackRunner::new(2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let done = Arc::clone(&done);
            runner
                .post(move || {
                    thread::sleep(Duration::from_millis(1));
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        runner.close();
        assert_eq!(done.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_post_after_close_rejected() {
        let runner = WriteBackRunner::new(1).unwrap();
        runner.close();
        runner.close();
        assert!(runner.is_closed());
        assert!(matches!(
            runner.post(|| {}),
            Err(SsimError::WriteBackRejected)
        ));
    }

    #[test]
    fn test_workers_are_named() {
        let runner = WriteBackRunner::new(3).unwrap();
        let names = Arc::new(parking_lot::Mutex::new(HashSet::new()));
        for _ in 0..30 {
            let names = Arc::clone(&names);
            runner
                .post(move || {
                    let name = thread::current().name().unwrap_or_default().to_string();
                    names.lock().insert(name);
                    thread::sleep(Duration::from_millis(2));
                })
                .unwrap();
        }
        runner.close();

        let names = names.lock();
        assert!(!names.is_empty());
        assert!(names.iter().all(|n| n.starts_with("ssim-writeback-")));
    }

    #[test]
    fn test_panicking_task_does_not_kill_pool() {
        let runner = WriteBackRunner::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        runner.post(|| panic!("boom")).unwrap();
        let flag = Arc::clone(&done);
        runner
            .post(move || {
                flag.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        runner.close();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
