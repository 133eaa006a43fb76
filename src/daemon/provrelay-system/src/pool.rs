//! Fixed-size worker pool
//!
//! Persistent named threads pull boxed tasks from a shared crossbeam queue.
//! The pool tracks queued plus running tasks so callers can wait for the
//! queue to drain.

use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn lock(&self) -> std::sync::MutexGuard<'_, usize> {
        // Task panics are caught by the guard, so poisoning is recoverable
        self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn increment(&self) {
        *self.lock() += 1;
    }

    fn decrement(&self) {
        let mut count = self.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the pending count even if the task panics
struct TaskGuard<'a>(&'a Pending);

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` threads named `<name>-<index>`
    pub fn new(size: usize, name: &str) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "worker pool needs at least one thread",
            ));
        }

        let (sender, receiver) = channel::unbounded::<Task>();
        let pending = Arc::new(Pending::default());
        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(size),
            pending,
            size,
        };

        for index in 0..size {
            let receiver = receiver.clone();
            let pending = Arc::clone(&pool.pending);
            // On error the partially built pool is dropped, which joins
            // the threads spawned so far
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(receiver, pending))?;
            pool.workers.push(handle);
        }

        debug!("Started worker pool with {} threads", size);
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a task for the next idle worker
    pub fn submit<F>(&self, task: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "worker pool is destroyed")
        })?;

        self.pending.increment();
        if sender.send(Box::new(task)).is_err() {
            self.pending.decrement();
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "worker pool has no live threads",
            ));
        }
        Ok(())
    }

    /// Queued plus running tasks
    pub fn active_tasks(&self) -> usize {
        *self.pending.lock()
    }

    /// Block until every submitted task has finished
    pub fn wait(&self) {
        let mut count = self.pending.lock();
        while *count > 0 {
            count = self.pending.idle.wait(count).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns
    /// whether the pool went idle.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self
                .pending
                .idle
                .wait_timeout(count, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }

    /// Close the queue and join every thread.
    ///
    /// Threads still running a task are detached instead of joined.
    pub fn destroy(&mut self) {
        self.sender.take();
        if self.active_tasks() > 0 {
            warn!(
                "Detaching worker pool with {} unfinished tasks",
                self.active_tasks()
            );
            self.workers.clear();
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn worker_loop(receiver: Receiver<Task>, pending: Arc<Pending>) {
    while let Ok(task) = receiver.recv() {
        let _guard = TaskGuard(&pending);
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
            warn!(
                "Task panicked on {}",
                thread::current().name().unwrap_or("worker")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_zero_threads_rejected() {
        let err = WorkerPool::new(0, "test").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_wait_runs_every_task() {
        let pool = WorkerPool::new(4, "test").unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.wait();
        assert_eq!(done.load(Ordering::SeqCst), 100);
        assert_eq!(pool.active_tasks(), 0);
    }

    #[test]
    fn test_long_running_tasks_are_active_until_released() {
        let pool = WorkerPool::new(2, "test").unwrap();
        let release = Arc::new(AtomicBool::new(false));

        for _ in 0..2 {
            let release = Arc::clone(&release);
            pool.submit(move || {
                while !release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .unwrap();
        }

        assert_eq!(pool.active_tasks(), 2);
        assert!(!pool.wait_timeout(Duration::from_millis(20)));

        release.store(true, Ordering::SeqCst);
        assert!(pool.wait_timeout(Duration::from_secs(5)));
        assert_eq!(pool.active_tasks(), 0);
    }

    #[test]
    fn test_panicking_task_is_not_counted_forever() {
        let pool = WorkerPool::new(1, "test").unwrap();
        pool.submit(|| panic!("boom")).unwrap();
        assert!(pool.wait_timeout(Duration::from_secs(5)));

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        pool.submit(move || flag.store(true, Ordering::SeqCst)).unwrap();
        pool.wait();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_submit_after_destroy_fails() {
        let mut pool = WorkerPool::new(2, "test").unwrap();
        pool.destroy();
        assert!(pool.submit(|| {}).is_err());
        assert_eq!(pool.active_tasks(), 0);
    }
}
