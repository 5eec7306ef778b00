//! Run-scoped worker rotation.

use super::Worker;

/// Workers available to a single fulfillment run.
///
/// Built from the registry at run start and dropped when the run ends, so a
/// lockout never outlives the run that saw it. The cursor only moves
/// forward: once a worker is skipped it is not revisited in this run.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
    usable: Vec<bool>,
    cursor: usize,
}

impl WorkerPool {
    pub fn new(workers: Vec<Worker>) -> Self {
        let usable = vec![true; workers.len()];
        Self {
            workers,
            usable,
            cursor: 0,
        }
    }

    /// First usable worker at or after the cursor. Moves the cursor onto it.
    pub fn current(&mut self) -> Option<&Worker> {
        while self.cursor < self.workers.len() {
            if self.usable[self.cursor] {
                return Some(&self.workers[self.cursor]);
            }
            self.cursor += 1;
        }
        None
    }

    /// Disable the worker under the cursor for the rest of the run.
    pub fn lock_out_current(&mut self) {
        if let Some(flag) = self.usable.get_mut(self.cursor) {
            *flag = false;
        }
        self.cursor += 1;
    }

    /// Workers still usable in this run.
    pub fn usable_count(&self) -> usize {
        self.usable.iter().filter(|u| **u).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workers(n: i64) -> Vec<Worker> {
        (1..=n)
            .map(|id| Worker {
                id,
                identity: format!("worker-{}", id),
                secret: "secret".to_string(),
                active: true,
            })
            .collect()
    }

    #[test]
    fn test_current_stays_until_lockout() {
        let mut pool = WorkerPool::new(workers(2));
        assert_eq!(pool.current().unwrap().id, 1);
        assert_eq!(pool.current().unwrap().id, 1);
        pool.lock_out_current();
        assert_eq!(pool.current().unwrap().id, 2);
        assert_eq!(pool.usable_count(), 1);
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = WorkerPool::new(workers(2));
        pool.lock_out_current();
        assert!(pool.current().is_some());
        pool.lock_out_current();
        assert_eq!(pool.usable_count(), 0);
        assert!(pool.current().is_none());
        // Further lockouts on an exhausted pool are harmless
        pool.lock_out_current();
        assert!(pool.current().is_none());
    }

    #[test]
    fn test_empty_pool() {
        let mut pool = WorkerPool::new(Vec::new());
        assert_eq!(pool.usable_count(), 0);
        assert!(pool.current().is_none());
    }
}
