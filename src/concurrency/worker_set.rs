use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Returned by [`WorkerSet::spawn`] once the set has been closed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("worker set is closed")]
pub struct WorkerSetClosed;

/// Capacity gate bounding how many tasks run at once.
///
/// `spawn` waits for one of the `max_workers` permits and then runs the task
/// on the runtime; the permit comes back when the task completes, panics
/// included. There is no ordering guarantee between tasks.
#[derive(Debug, Clone)]
pub struct WorkerSet {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerSet {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Permits not currently handed out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free worker, then run `task` on it
    pub async fn spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>, WorkerSetClosed>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerSetClosed)?;

        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await
        }))
    }

    /// Refuse further work. Tasks already running are not affected.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_bounds_concurrency() {
        let workers = WorkerSet::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let active = active.clone();
            let max_active = max_active.clone();
            let handle = workers
                .spawn(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
            handles.push(handle);
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(max_active.load(Ordering::SeqCst) <= 3);
        assert_eq!(workers.available(), 3);
    }

    #[tokio::test]
    async fn test_returns_task_output() {
        let workers = WorkerSet::new(1);
        let handle = workers.spawn(async { 40 + 2 }).await.unwrap();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_permit_returned_after_panic() {
        let workers = WorkerSet::new(1);
        let handle = workers
            .spawn(async { panic!("worker failure") })
            .await
            .unwrap();
        assert!(handle.await.is_err());
        assert_eq!(workers.available(), 1);
    }

    #[tokio::test]
    async fn test_closed_set_refuses_work() {
        let workers = WorkerSet::new(2);
        workers.close();
        assert!(workers.is_closed());
        assert_eq!(workers.spawn(async {}).await.err(), Some(WorkerSetClosed));
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        assert_eq!(WorkerSet::new(0).max_workers(), 1);
    }
}
