//! A group of tasks that share one cancellation scope.
//!
//! The first task to fail records its error and cancels the scope; errors
//! from tasks that fail afterwards (usually because they were cancelled) are
//! dropped. Joining the group therefore yields exactly the error that started
//! the shutdown.

use bkctl_core::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared state of a [`TaskGroup`], cloneable into work that runs outside it
#[derive(Debug, Clone)]
pub struct GroupHandle {
    cancel: CancellationToken,
    first_error: Arc<Mutex<Option<Error>>>,
}

impl GroupHandle {
    /// Token cancelled when any member fails or the parent scope is cancelled
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record a failure. Only the first one is kept; every failure cancels.
    pub fn fail(&self, err: Error) {
        {
            let mut first = self.first_error.lock();
            if first.is_none() {
                debug!(error = %err, "task failed, cancelling group");
                *first = Some(err);
            }
        }
        self.cancel.cancel();
    }

    /// Drive `fut` on the current task as a member of the group
    pub async fn run<T, F>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match fut.await {
            Ok(value) => Some(value),
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    /// Take the recorded failure, if any
    pub fn take_error(&self) -> Option<Error> {
        self.first_error.lock().take()
    }
}

/// Spawned members of a cancellation scope
#[derive(Debug)]
pub struct TaskGroup {
    tasks: JoinSet<()>,
    handle: GroupHandle,
}

impl TaskGroup {
    /// Create a group whose scope is a child of `parent`
    #[must_use]
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            handle: GroupHandle {
                cancel: parent.child_token(),
                first_error: Arc::new(Mutex::new(None)),
            },
        }
    }

    #[must_use]
    pub fn handle(&self) -> GroupHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.handle.token()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a member task
    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            handle.run(fut).await;
        });
    }

    /// Wait for every spawned member to finish
    pub async fn join(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                self.handle
                    .fail(Error::internal(format!("build task aborted: {e}")));
            }
        }
    }

    /// Wait for every member and return the first failure
    pub async fn wait(mut self) -> Result<()> {
        self.join().await;
        match self.handle.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_members_succeed() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        for _ in 0..3 {
            group.spawn(async { Ok(()) });
        }
        assert_eq!(group.len(), 3);

        group.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_first_failure_cancels_and_wins() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        let cancelled = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let token = group.token();
            let cancelled = Arc::clone(&cancelled);
            group.spawn(async move {
                token.cancelled().await;
                cancelled.fetch_add(1, Ordering::SeqCst);
                Err(Error::Canceled)
            });
        }
        group.spawn(async { Err(Error::sink("trace", "disk full")) });

        let err = group.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "progress sink 'trace' failed: disk full");
        assert_eq!(cancelled.load(Ordering::SeqCst), 2);
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_inline_failure_is_recorded() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        let token = group.token();
        group.spawn(async move {
            token.cancelled().await;
            Ok(())
        });

        let handle = group.handle();
        let (value, ()) = tokio::join!(
            handle.run(async { Err::<(), _>(Error::engine("solve failed")) }),
            group.join()
        );

        assert!(value.is_none());
        assert_eq!(handle.take_error().unwrap().to_string(), "solve failed");
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_members() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        let token = group.token();
        group.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => Err(Error::Canceled),
                _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(()),
            }
        });

        root.cancel();
        assert!(group.wait().await.unwrap_err().is_canceled());
    }

    #[tokio::test]
    async fn test_panicking_member_is_reported() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);
        group.spawn(async {
            let healthy = false;
            assert!(healthy, "boom");
            Ok(())
        });

        let err = group.wait().await.unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }
}
