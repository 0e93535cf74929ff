//! Shutdown coordination for background tasks.

use std::future::Future;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Background tasks sharing one shutdown broadcast.
///
/// Each task receives its own receiver at spawn time, so a signal sent while
/// the task is busy is still seen on its next `select!`.
pub struct TaskGroup {
    tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Vec::new(),
        }
    }

    /// Spawn a task built from a shutdown receiver.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.tx.subscribe()));
        self.tasks.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ask every task to exit without waiting.
    pub fn signal(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for every task to exit.
    pub async fn join(self) {
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "Background task ended abnormally");
            } else {
                tracing::debug!(task = name, "Background task stopped");
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks() {
        let exited = Arc::new(AtomicBool::new(false));
        let mut group = TaskGroup::new();

        let flag = exited.clone();
        group.spawn("ticker", move |mut shutdown| async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(5));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.recv() => break,
                }
            }
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(group.len(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!exited.load(Ordering::SeqCst));

        group.signal();
        group.join().await;
        assert!(exited.load(Ordering::SeqCst));
    }
}
