//! The background download queue.
//!
//! An ordered set of jobs, unique by file name. A job is `pending` from
//! [`JobQueue::push_if_new`] until [`JobQueue::pop`], then `in progress`
//! until [`JobQueue::done`]. While a name is pending or in progress, pushes
//! for it are refused; a file re-requested mid-download only re-enters the
//! queue after `done`.
//!
//! All three pieces of state (the ordered pending list, the name index, and
//! the in-progress set) live under one lock and are mutated together.

use std::collections::HashSet;
use std::time::SystemTime;

use parking_lot::Mutex;

use vfold_common::PullOrder;

/// A queued request to download every block of one file.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub size: u64,
    pub mod_time: SystemTime,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<Job>,
    known: HashSet<String>,
    in_progress: HashSet<String>,
}

/// Ordered, name-unique download queue shared by the fetch workers.
#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `name` unless it is already pending or in progress. Returns
    /// whether a new entry was added.
    pub fn push_if_new(&self, name: &str, size: u64, mod_time: SystemTime) -> bool {
        let mut state = self.state.lock();
        if state.known.contains(name) {
            return false;
        }
        state.known.insert(name.to_string());
        state.pending.push(Job {
            name: name.to_string(),
            size,
            mod_time,
        });
        true
    }

    /// Take the frontmost pending job, marking it in progress. Non-blocking;
    /// `None` when nothing is pending.
    pub fn pop(&self) -> Option<Job> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return None;
        }
        let job = state.pending.remove(0);
        state.in_progress.insert(job.name.clone());
        Some(job)
    }

    /// Retire a job taken with [`pop`](Self::pop). The name may be enqueued
    /// again afterwards.
    pub fn done(&self, name: &str) {
        let mut state = self.state.lock();
        state.in_progress.remove(name);
        state.known.remove(name);
    }

    /// Move a pending job to the head of the queue. No-op for names that are
    /// not pending (unknown, or already in progress).
    pub fn bring_to_front(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(pos) = state.pending.iter().position(|job| job.name == name) {
            let job = state.pending.remove(pos);
            state.pending.insert(0, job);
        }
    }

    /// Stable-sort the pending jobs by the folder's configured order.
    /// In-progress jobs are unaffected.
    pub fn sort(&self, order: PullOrder) {
        let mut state = self.state.lock();
        match order {
            PullOrder::Alphabetic => state.pending.sort_by(|a, b| a.name.cmp(&b.name)),
            PullOrder::OldestFirst => state.pending.sort_by_key(|job| job.mod_time),
            PullOrder::NewestFirst => {
                state.pending.sort_by(|a, b| b.mod_time.cmp(&a.mod_time))
            }
            PullOrder::SmallestFirst => state.pending.sort_by_key(|job| job.size),
            PullOrder::LargestFirst => state.pending.sort_by(|a, b| b.size.cmp(&a.size)),
        }
    }

    /// Paginated listing for the control plane: `(pending page, in-progress
    /// page, total pending)`. Pages are 1-based.
    pub fn jobs(&self, page: usize, per_page: usize) -> (Vec<String>, Vec<String>, usize) {
        let state = self.state.lock();
        let total_pending = state.pending.len();

        let pending: Vec<String> = state.pending.iter().map(|job| job.name.clone()).collect();
        let mut in_progress: Vec<String> = state.in_progress.iter().cloned().collect();
        in_progress.sort();

        (
            page_slice(pending, page, per_page),
            page_slice(in_progress, page, per_page),
            total_pending,
        )
    }
}

fn page_slice(names: Vec<String>, page: usize, per_page: usize) -> Vec<String> {
    if per_page == 0 {
        return names;
    }
    let start = page.saturating_sub(1).saturating_mul(per_page);
    names.into_iter().skip(start).take(per_page).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(seconds: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(seconds)
    }

    #[test]
    fn push_is_unique_by_name() {
        let queue = JobQueue::new();
        assert!(queue.push_if_new("a", 1, at(0)));
        assert!(!queue.push_if_new("a", 1, at(0)));

        let (pending, _, total) = queue.jobs(1, 100);
        assert_eq!(pending, vec!["a".to_string()]);
        assert_eq!(total, 1);
    }

    #[test]
    fn in_progress_blocks_requeue_until_done() {
        let queue = JobQueue::new();
        queue.push_if_new("a", 1, at(0));

        let job = queue.pop().unwrap();
        assert_eq!(job.name, "a");
        assert!(!queue.push_if_new("a", 1, at(0)), "in progress, refused");

        queue.done("a");
        assert!(queue.push_if_new("a", 1, at(0)), "retired, accepted again");
    }

    #[test]
    fn alphabetic_sort_orders_pops() {
        let queue = JobQueue::new();
        queue.push_if_new("c", 1, at(0));
        queue.push_if_new("a", 1, at(0));
        queue.push_if_new("b", 1, at(0));
        queue.sort(PullOrder::Alphabetic);

        assert_eq!(queue.pop().unwrap().name, "a");
        assert_eq!(queue.pop().unwrap().name, "b");
        assert_eq!(queue.pop().unwrap().name, "c");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn largest_first_uses_sizes() {
        let queue = JobQueue::new();
        queue.push_if_new("small", 10, at(0));
        queue.push_if_new("large", 1000, at(0));
        queue.push_if_new("medium", 100, at(0));
        queue.sort(PullOrder::LargestFirst);

        assert_eq!(queue.pop().unwrap().name, "large");
        assert_eq!(queue.pop().unwrap().name, "medium");
        assert_eq!(queue.pop().unwrap().name, "small");
    }

    #[test]
    fn newest_first_uses_mod_times() {
        let queue = JobQueue::new();
        queue.push_if_new("a", 1, at(1));
        queue.push_if_new("b", 1, at(2));
        queue.push_if_new("c", 1, at(3));
        queue.sort(PullOrder::NewestFirst);

        assert_eq!(queue.pop().unwrap().name, "c");
    }

    #[test]
    fn bring_to_front_reorders_pending_only() {
        let queue = JobQueue::new();
        queue.push_if_new("a", 1, at(0));
        queue.push_if_new("b", 1, at(0));
        queue.push_if_new("c", 1, at(0));

        // unknown name: no-op
        queue.bring_to_front("zzz");
        // pending name moves to the head
        queue.bring_to_front("c");
        assert_eq!(queue.pop().unwrap().name, "c");

        // "a" is now in progress; bringing it to front is a no-op
        let a = queue.pop().unwrap();
        assert_eq!(a.name, "a");
        queue.bring_to_front("a");
        assert_eq!(queue.pop().unwrap().name, "b");
    }

    #[test]
    fn jobs_paginates_pending() {
        let queue = JobQueue::new();
        for name in ["a", "b", "c", "d", "e"] {
            queue.push_if_new(name, 1, at(0));
        }

        let (page1, _, total) = queue.jobs(1, 2);
        assert_eq!(page1, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(total, 5);

        let (page3, _, _) = queue.jobs(3, 2);
        assert_eq!(page3, vec!["e".to_string()]);

        let (all, _, _) = queue.jobs(1, 0);
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn jobs_reports_in_progress_separately() {
        let queue = JobQueue::new();
        queue.push_if_new("a", 1, at(0));
        queue.push_if_new("b", 1, at(0));
        queue.pop();

        let (pending, in_progress, total) = queue.jobs(1, 100);
        assert_eq!(pending, vec!["b".to_string()]);
        assert_eq!(in_progress, vec!["a".to_string()]);
        assert_eq!(total, 1);
    }
}
