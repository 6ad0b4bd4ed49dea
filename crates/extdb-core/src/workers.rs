//! Worker pool.
//!
//! A fixed set of OS threads drains one FIFO channel of boxed task
//! closures. The dispatcher enqueues and returns; workers run tasks to
//! completion. Shutdown closes the channel, lets the queue drain, and joins
//! every thread; no task runs after `shutdown` returns.
//!
//! A panicking task is caught and logged; a worker thread never dies early.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver) = unbounded::<Task>();
        let workers = (0..threads)
            .map(|i| {
                let receiver: Receiver<Task> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("extdb-worker-{}", i))
                    .spawn(move || worker_loop(receiver))
                    .expect("spawn worker thread")
            })
            .collect();
        info!(threads, "worker pool started");
        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Enqueue a task. Silently dropped after shutdown.
    pub fn execute(&self, task: Task) {
        if let Some(sender) = &self.sender {
            if sender.send(task).is_err() {
                debug!("task dropped, worker pool is shut down");
            }
        }
    }

    /// Close the queue, drain it, and join all workers. Idempotent.
    pub fn shutdown(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Receiver<Task>) {
    // recv errors only once every sender is gone and the queue is empty
    while let Ok(task) = receiver.recv() {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("worker task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_tasks_run() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(pool); // drains before joining
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_single_worker_preserves_order() {
        let mut pool = WorkerPool::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            let seen = seen.clone();
            pool.execute(Box::new(move || {
                seen.lock().unwrap().push(i);
            }));
        }
        pool.shutdown();
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let mut pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.execute(Box::new(|| panic!("boom")));
        let c = counter.clone();
        pool.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execute_after_shutdown_is_dropped() {
        let mut pool = WorkerPool::new(2);
        pool.shutdown();
        // must not panic or block
        pool.execute(Box::new(|| {}));
        pool.shutdown();
    }
}
