//! Concurrent directory job queue with a provable termination condition
//!
//! New jobs are only ever discovered by active workers while they process
//! a directory they already own. Therefore, the moment every worker is
//! simultaneously waiting on an empty queue, no further job can appear
//! and the run is complete. The queue encodes exactly that invariant: a
//! monitor (mutex + condvar) guards the pending deque, the waiting-worker
//! count, and the done flag, and completion is declared in one place.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use tracing::trace;

/// How long a waiting worker sleeps before re-checking the keep-running
/// predicate.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One unit of traversal work: a source directory and its path relative
/// to the source root. Consumed exactly once by exactly one worker.
#[derive(Debug, Clone)]
pub struct DirJob {
    /// Absolute source directory
    pub source_dir: PathBuf,
    /// Directory path relative to the source root (empty for the root)
    pub rel_dir: PathBuf,
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<DirJob>,
    waiting: usize,
    done: bool,
}

/// Shared work-distribution queue for one sync task
#[derive(Debug)]
pub struct DirJobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    workers: usize,
}

impl DirJobQueue {
    /// Create a queue for `workers` consumer threads
    pub fn new(workers: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            workers: workers.max(1),
        }
    }

    /// Enqueue a job. After completion has been declared this is a
    /// silent no-op: the producer is past the point where its output
    /// matters.
    pub fn add(&self, job: DirJob) {
        let mut state = self.state.lock().unwrap();
        if state.done {
            return;
        }
        trace!("queueing {}", job.rel_dir.display());
        state.jobs.push_back(job);
        self.available.notify_one();
    }

    /// Take the next job, waiting for one to appear when the queue is
    /// empty but other workers are still active. Returns `None` when the
    /// task is complete or `keep_running` reports false.
    pub fn poll_or_wait(&self, keep_running: impl Fn() -> bool) -> Option<DirJob> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.done {
                return None;
            }
            if !keep_running() {
                state.done = true;
                self.available.notify_all();
                return None;
            }
            // A single worker cannot be handed work by anyone else, so
            // an empty queue means the traversal is finished.
            if self.workers <= 1 {
                state.done = true;
                return None;
            }

            state.waiting += 1;
            if state.waiting == self.workers {
                // Everyone is here and the queue is empty: no job can
                // ever appear again.
                state.done = true;
                state.waiting -= 1;
                self.available.notify_all();
                return None;
            }
            let (guard, _timeout) = self
                .available
                .wait_timeout(state, POLL_INTERVAL)
                .unwrap();
            state = guard;
            state.waiting -= 1;
        }
    }

    /// Declare completion regardless of pending jobs, waking all waiting
    /// workers. Used by the abort path.
    pub fn shut_down(&self) {
        let mut state = self.state.lock().unwrap();
        state.done = true;
        state.jobs.clear();
        self.available.notify_all();
    }

    /// Number of jobs currently pending (diagnostics only)
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn job(rel: &str) -> DirJob {
        DirJob {
            source_dir: PathBuf::from("/src").join(rel),
            rel_dir: PathBuf::from(rel),
        }
    }

    #[test]
    fn single_worker_drains_and_terminates() {
        let queue = DirJobQueue::new(1);
        queue.add(job("a"));
        queue.add(job("b"));
        assert!(queue.poll_or_wait(|| true).is_some());
        assert!(queue.poll_or_wait(|| true).is_some());
        assert!(queue.poll_or_wait(|| true).is_none());
        // Completion is sticky; late adds are no-ops.
        queue.add(job("c"));
        assert!(queue.poll_or_wait(|| true).is_none());
    }

    #[test]
    fn keep_running_false_stops_immediately() {
        let queue = DirJobQueue::new(4);
        assert!(queue.poll_or_wait(|| false).is_none());
    }

    #[test]
    fn every_job_is_consumed_exactly_once() {
        // Simulated traversal: each consumed job spawns children up to a
        // fixed depth, mimicking workers discovering subdirectories.
        const WORKERS: usize = 4;
        const FANOUT: usize = 3;
        const DEPTH: usize = 4;

        let queue = Arc::new(DirJobQueue::new(WORKERS));
        queue.add(job("root"));

        let consumed = Arc::new(Mutex::new(HashSet::new()));
        let duplicates = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..WORKERS {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            let duplicates = Arc::clone(&duplicates);
            handles.push(std::thread::spawn(move || {
                while let Some(job_item) = queue.poll_or_wait(|| true) {
                    {
                        let mut seen = consumed.lock().unwrap();
                        if !seen.insert(job_item.rel_dir.clone()) {
                            duplicates.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    let depth = job_item.rel_dir.components().count();
                    if depth < DEPTH {
                        for i in 0..FANOUT {
                            queue.add(DirJob {
                                source_dir: job_item.source_dir.join(format!("d{i}")),
                                rel_dir: job_item.rel_dir.join(format!("d{i}")),
                            });
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Full FANOUT-ary tree of DEPTH levels below the root.
        let expected: usize = (0..DEPTH).map(|d| FANOUT.pow(d as u32)).sum();
        assert_eq!(consumed.lock().unwrap().len(), expected);
        assert_eq!(duplicates.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn shut_down_releases_waiting_workers() {
        let queue = Arc::new(DirJobQueue::new(2));
        let q2 = Arc::clone(&queue);
        let handle = std::thread::spawn(move || q2.poll_or_wait(|| true));
        std::thread::sleep(Duration::from_millis(20));
        queue.shut_down();
        assert!(handle.join().unwrap().is_none());
    }
}
