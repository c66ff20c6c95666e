//! Fixed-size worker pool with a bounded priority queue.
//!
//! Tasks carry a key; a key that is queued or running cannot be submitted
//! again until its task finishes. Higher priorities run first, FIFO among
//! equals. Tasks that waited longer than the stale limit are discarded when
//! dequeued.
//!
//! A discarded task is dropped without running, outside the queue lock. Jobs
//! that own a completion must report it from `Drop` so their owner learns
//! the task is gone.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of [`WorkerPool::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Submitted,
    /// A task with the same key is queued or running
    Duplicate,
    QueueFull,
    ShutDown,
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub name: String,
    pub threads: usize,
    pub queue_capacity: usize,
    pub stale_limit: Duration,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, threads: usize) -> Self {
        Self {
            name: name.into(),
            threads,
            queue_capacity: 200,
            stale_limit: Duration::from_secs(30),
        }
    }
}

struct QueuedTask {
    key: String,
    priority: f64,
    seq: u64,
    enqueued: Instant,
    job: Job,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Max-heap: higher priority first, then lower sequence number first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<QueuedTask>,
    /// Keys queued or running
    keys: HashSet<String>,
    running: usize,
    next_seq: u64,
    shutdown: bool,
    stale_dropped: u64,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    idle: Condvar,
    capacity: usize,
    stale_limit: Duration,
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub queued: usize,
    pub running: usize,
    pub stale_dropped: u64,
}

/// Keyed, prioritized pool of worker threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    name: String,
}

impl WorkerPool {
    /// Start the worker threads.
    pub fn new(config: PoolConfig) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
            capacity: config.queue_capacity.max(1),
            stale_limit: config.stale_limit,
        });

        let mut workers = Vec::with_capacity(config.threads.max(1));
        for i in 0..config.threads.max(1) {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.name, i))
                .spawn(move || worker_loop(shared))?;
            workers.push(handle);
        }

        debug!(
            pool = %config.name,
            threads = workers.len(),
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            name: config.name,
        })
    }

    /// Queue a task under `key`. A rejected job is dropped.
    pub fn submit<F>(&self, key: impl Into<String>, priority: f64, job: F) -> Submission
    where
        F: FnOnce() + Send + 'static,
    {
        match self.try_submit(key, priority, job) {
            Ok(()) => Submission::Submitted,
            Err((rejected, _job)) => rejected,
        }
    }

    /// Queue a task under `key`, handing a rejected job back with the
    /// reason.
    pub fn try_submit<F>(
        &self,
        key: impl Into<String>,
        priority: f64,
        job: F,
    ) -> Result<(), (Submission, F)>
    where
        F: FnOnce() + Send + 'static,
    {
        let key = key.into();
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return Err((Submission::ShutDown, job));
        }
        if queue.keys.contains(&key) {
            trace!(pool = %self.name, key = %key, "Duplicate task rejected");
            return Err((Submission::Duplicate, job));
        }
        if queue.heap.len() >= self.shared.capacity {
            debug!(pool = %self.name, key = %key, "Queue full, task rejected");
            return Err((Submission::QueueFull, job));
        }

        queue.next_seq += 1;
        let seq = queue.next_seq;
        queue.keys.insert(key.clone());
        queue.heap.push(QueuedTask {
            key,
            priority,
            seq,
            enqueued: Instant::now(),
            job: Box::new(job),
        });
        drop(queue);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Whether a task with `key` is queued or running.
    pub fn contains(&self, key: &str) -> bool {
        self.shared.queue.lock().keys.contains(key)
    }

    pub fn stats(&self) -> PoolStats {
        let queue = self.shared.queue.lock();
        PoolStats {
            queued: queue.heap.len(),
            running: queue.running,
            stale_dropped: queue.stale_dropped,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.shared.queue.lock().heap.len() < self.shared.capacity
    }

    /// Block until no task is queued or running, or the timeout elapses.
    /// Returns whether the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        while !(queue.heap.is_empty() && queue.running == 0) {
            if self.shared.idle.wait_until(&mut queue, deadline).timed_out() {
                return queue.heap.is_empty() && queue.running == 0;
            }
        }
        true
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn shutdown(&self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.available.notify_all();
    }

    /// Stop accepting tasks and discard the queued ones. Running tasks
    /// finish on their own.
    pub fn shutdown_now(&self) {
        let discarded: Vec<QueuedTask> = {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            let discarded: Vec<QueuedTask> = queue.heap.drain().collect();
            for task in &discarded {
                queue.keys.remove(&task.key);
            }
            discarded
        };
        if !discarded.is_empty() {
            debug!(pool = %self.name, discarded = discarded.len(), "Discarded queued tasks");
        }
        drop(discarded);
        self.shared.available.notify_all();
        self.shared.idle.notify_all();
    }

    /// Wait for the worker threads to exit. Call after a shutdown.
    ///
    /// A worker dropping its own pool is detached instead of joined.
    pub fn join(&self) {
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if let Err(e) = handle.join() {
                warn!(pool = %self.name, "Worker thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_now();
        self.join();
    }
}

enum Dequeued {
    /// A task to run, plus stale tasks found ahead of it
    Task(QueuedTask, Vec<QueuedTask>),
    /// Only stale tasks were found
    Stale(Vec<QueuedTask>),
    Exit,
}

/// Pop the next runnable task, waiting while the queue is empty.
///
/// Stale tasks leave the queue here but count as running until the caller
/// has dropped them, so `wait_idle` covers their drop side effects.
fn dequeue(shared: &Shared) -> Dequeued {
    let mut queue = shared.queue.lock();
    let mut stale = Vec::new();
    loop {
        let next = queue.heap.pop();
        match next {
            Some(task) if task.enqueued.elapsed() > shared.stale_limit => {
                debug!(key = %task.key, "Discarding stale request");
                queue.keys.remove(&task.key);
                queue.stale_dropped += 1;
                queue.running += 1;
                stale.push(task);
            }
            Some(task) => {
                queue.running += 1;
                return Dequeued::Task(task, stale);
            }
            None if !stale.is_empty() => return Dequeued::Stale(stale),
            None if queue.shutdown => return Dequeued::Exit,
            None => {
                shared.idle.notify_all();
                shared.available.wait(&mut queue);
            }
        }
    }
}

/// Drop discarded tasks outside the lock, then release their running slots.
fn discard(shared: &Shared, tasks: Vec<QueuedTask>) {
    let count = tasks.len();
    if count == 0 {
        return;
    }
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || drop(tasks))).is_err() {
        warn!("Discarded task panicked while dropping");
    }
    let mut queue = shared.queue.lock();
    queue.running -= count;
    if queue.heap.is_empty() && queue.running == 0 {
        shared.idle.notify_all();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = match dequeue(&shared) {
            Dequeued::Task(task, stale) => {
                discard(&shared, stale);
                task
            }
            Dequeued::Stale(stale) => {
                discard(&shared, stale);
                continue;
            }
            Dequeued::Exit => return,
        };

        let QueuedTask { key, job, .. } = task;
        // A panicking job must not take the worker down with it.
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
            warn!(key = %key, "Task panicked");
        }

        let mut queue = shared.queue.lock();
        queue.running -= 1;
        queue.keys.remove(&key);
        if queue.heap.is_empty() && queue.running == 0 {
            shared.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn pool(threads: usize, capacity: usize) -> WorkerPool {
        let mut config = PoolConfig::new("test-pool", threads);
        config.queue_capacity = capacity;
        WorkerPool::new(config).unwrap()
    }

    /// Occupy the single worker until the returned sender fires.
    fn block_worker(pool: &WorkerPool) -> mpsc::Sender<()> {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        pool.submit("blocker", 0.0, move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        started_rx.recv().unwrap();
        release_tx
    }

    #[test]
    fn test_runs_submitted_tasks() {
        let pool = pool(2, 10);
        let count = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            let count = count.clone();
            assert_eq!(
                pool.submit(format!("k{i}"), 0.0, move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
                Submission::Submitted
            );
        }
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_duplicate_key_rejected_while_pending() {
        let pool = pool(1, 10);
        let release = block_worker(&pool);

        assert_eq!(pool.submit("tile", 0.0, || {}), Submission::Submitted);
        assert_eq!(pool.submit("tile", 5.0, || {}), Submission::Duplicate);
        assert_eq!(pool.submit("blocker", 0.0, || {}), Submission::Duplicate);
        assert!(pool.contains("tile"));

        release.send(()).unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert!(!pool.contains("tile"));
        assert_eq!(pool.submit("tile", 0.0, || {}), Submission::Submitted);
    }

    #[test]
    fn test_try_submit_hands_back_rejected_job() {
        let pool = pool(1, 10);
        let release = block_worker(&pool);
        let ran = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&ran);
        let rejected = pool.try_submit("blocker", 0.0, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let Err((reason, job)) = rejected else {
            panic!("duplicate key accepted");
        };
        assert_eq!(reason, Submission::Duplicate);
        job();
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        release.send(()).unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let pool = pool(1, 10);
        let release = block_worker(&pool);
        let order = Arc::new(Mutex::new(Vec::new()));

        for (key, priority) in [("low", 1.0), ("high-a", 9.0), ("mid", 5.0), ("high-b", 9.0)] {
            let order = order.clone();
            pool.submit(key, priority, move || order.lock().push(key));
        }

        release.send(()).unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(*order.lock(), vec!["high-a", "high-b", "mid", "low"]);
    }

    #[test]
    fn test_queue_full_rejects() {
        let pool = pool(1, 2);
        let release = block_worker(&pool);

        assert_eq!(pool.submit("a", 0.0, || {}), Submission::Submitted);
        assert_eq!(pool.submit("b", 0.0, || {}), Submission::Submitted);
        assert_eq!(pool.submit("c", 0.0, || {}), Submission::QueueFull);
        assert!(!pool.has_capacity());

        release.send(()).unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_stale_tasks_are_dropped() {
        let mut config = PoolConfig::new("stale-pool", 1);
        config.stale_limit = Duration::from_millis(20);
        let pool = WorkerPool::new(config).unwrap();
        let release = block_worker(&pool);

        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        pool.submit("old", 0.0, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(60));

        release.send(()).unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().stale_dropped, 1);
        assert!(!pool.contains("old"));
    }

    /// Records whether its job ran; on drop, re-enters the pool.
    struct ReportOnDrop {
        pool: Arc<WorkerPool>,
        ran: bool,
        abandoned: Arc<AtomicUsize>,
    }

    impl Drop for ReportOnDrop {
        fn drop(&mut self) {
            if !self.ran {
                // Would deadlock if the queue lock were still held.
                let _ = self.pool.contains("anything");
                self.abandoned.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_stale_task_is_dropped_outside_the_lock() {
        let mut config = PoolConfig::new("stale-drop-pool", 1);
        config.stale_limit = Duration::from_millis(20);
        let pool = Arc::new(WorkerPool::new(config).unwrap());
        let release = block_worker(&pool);

        let abandoned = Arc::new(AtomicUsize::new(0));
        let mut report = ReportOnDrop {
            pool: Arc::clone(&pool),
            ran: false,
            abandoned: Arc::clone(&abandoned),
        };
        pool.submit("late", 0.0, move || {
            report.ran = true;
        });
        thread::sleep(Duration::from_millis(60));

        release.send(()).unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(abandoned.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().running, 0);
    }

    #[test]
    fn test_shutdown_now_drops_queued_jobs() {
        let pool = Arc::new(pool(1, 10));
        let release = block_worker(&pool);

        let abandoned = Arc::new(AtomicUsize::new(0));
        let mut report = ReportOnDrop {
            pool: Arc::clone(&pool),
            ran: false,
            abandoned: Arc::clone(&abandoned),
        };
        pool.submit("queued", 0.0, move || {
            report.ran = true;
        });

        pool.shutdown_now();
        assert_eq!(abandoned.load(Ordering::SeqCst), 1);
        release.send(()).unwrap();
        pool.join();
    }

    #[test]
    fn test_shutdown_drains_queue_then_rejects() {
        let pool = pool(1, 10);
        let release = block_worker(&pool);
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        pool.submit("queued", 0.0, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown();
        assert_eq!(pool.submit("x", 0.0, || {}), Submission::ShutDown);
        release.send(()).unwrap();
        pool.join();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_now_discards_queue() {
        let pool = pool(1, 10);
        let release = block_worker(&pool);
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        pool.submit("queued", 0.0, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown_now();
        assert!(!pool.contains("queued"));
        release.send(()).unwrap();
        pool.join();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = pool(1, 10);
        pool.submit("boom", 0.0, || panic!("task failure"));
        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        pool.submit("after", 0.0, move || {
            d.fetch_add(1, Ordering::SeqCst);
        });
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
