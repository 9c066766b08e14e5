//! Memoized process runs keyed by cancellation-token identity
//!
//! A [`MemoizedProcess`] starts at most one underlying run per token identity
//! while a cache entry exists. Callers with the same token join the entry,
//! whether it is still in flight or already finished successfully. Failed and
//! aborted runs remove their entry before anyone can observe the failure, so
//! the next call with that token runs the command again.
//!
//! The cache lives on the wrapped [`ManagedProcess`], so every wrapper over
//! the same process shares it.

use crate::cancel::{CancelToken, TokenId};
use crate::error::RunError;
use crate::managed::{ManagedProcess, RunProcess};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use schema::ProcessId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache key: the token's identity, or `None` for runs without a token
type RunKey = Option<TokenId>;

/// An in-flight or finished run that any number of callers can await
type SharedRun = Shared<BoxFuture<'static, Result<(), RunError>>>;

/// Run outcomes of one process, keyed by token identity
#[derive(Clone, Default)]
pub(crate) struct RunCache(Arc<DashMap<RunKey, SharedRun>>);

impl RunCache {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn contains(&self, key: &RunKey) -> bool {
        self.0.contains_key(key)
    }
}

/// Wrap `process` so runs are memoized per cancellation token
///
/// The original process is left untouched and keeps running unmemoized.
pub fn memoize(process: &ManagedProcess) -> MemoizedProcess {
    MemoizedProcess {
        inner: process.clone(),
    }
}

/// A [`ManagedProcess`] whose runs are deduplicated per token identity
#[derive(Debug, Clone)]
pub struct MemoizedProcess {
    inner: ManagedProcess,
}

impl From<ManagedProcess> for MemoizedProcess {
    fn from(inner: ManagedProcess) -> Self {
        Self { inner }
    }
}

impl MemoizedProcess {
    /// Get the process id
    pub fn id(&self) -> ProcessId {
        self.inner.id()
    }

    /// Get the command line
    pub fn command(&self) -> &str {
        self.inner.command()
    }

    /// The wrapped, unmemoized process
    pub fn inner(&self) -> &ManagedProcess {
        &self.inner
    }

    /// Number of cached runs, in flight or succeeded
    pub fn cached_runs(&self) -> usize {
        self.inner.cache.len()
    }

    /// Whether a run for this token identity is cached
    pub fn is_cached(&self, token: Option<&CancelToken>) -> bool {
        self.inner.cache.contains(&token.map(CancelToken::id))
    }

    /// Run the command, or join the cached run for this token.
    ///
    /// # Errors
    ///
    /// The same errors as [`ManagedProcess::run`]. An already-cancelled
    /// token fails with [`RunError::AbortedBeforeStart`] without touching
    /// the cache.
    pub async fn run(&self, token: Option<&CancelToken>) -> Result<(), RunError> {
        if token.is_some_and(CancelToken::is_cancelled) {
            debug!("Memoized process {} cancelled before start", self.id());
            return Err(RunError::AbortedBeforeStart);
        }

        let key = token.map(CancelToken::id);
        let run = match self.inner.cache.0.entry(key) {
            Entry::Occupied(entry) => {
                debug!("Process {} joining cached run for {:?}", self.id(), key);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                debug!("Process {} starting memoized run for {:?}", self.id(), key);
                let run = self.start(key, token.cloned());
                entry.insert(run.clone());
                run
            }
        };

        run.await
    }

    /// Start the underlying run on its own task.
    ///
    /// Called with the vacant cache entry locked, so the task cannot evict
    /// before the entry is inserted. Eviction happens inside the task, ahead
    /// of the outcome becoming visible to any awaiting caller.
    fn start(&self, key: RunKey, token: Option<CancelToken>) -> SharedRun {
        let process = self.inner.clone();
        let cache = self.inner.cache.clone();
        let id = process.id();

        let task = tokio::spawn(async move {
            let result = process.run(token.as_ref()).await;
            if let Err(e) = &result {
                debug!("Evicting failed run of process {} for {:?}: {}", id, key, e);
                cache.0.remove(&key);
            }
            result
        });

        let cache = self.inner.cache.clone();
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Memoized run of process {} did not complete: {}", id, e);
                    cache.0.remove(&key);
                    Err(RunError::Spawn(format!("run task for process {} failed: {}", id, e)))
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[async_trait]
impl RunProcess for MemoizedProcess {
    fn id(&self) -> ProcessId {
        self.inner.id()
    }

    fn command(&self) -> &str {
        self.inner.command()
    }

    async fn run(&self, token: Option<&CancelToken>) -> Result<(), RunError> {
        MemoizedProcess::run(self, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockInstruction, MockProcessAdapter};
    use std::time::Duration;
    use tokio::time::timeout;

    fn memoized(adapter: &MockProcessAdapter, command: &str) -> MemoizedProcess {
        memoize(&ManagedProcess::new(1, command, Arc::new(adapter.clone())))
    }

    #[tokio::test]
    async fn test_success_is_reused_for_same_token() {
        let adapter = MockProcessAdapter::new();
        let process = memoized(&adapter, "build");
        let token = CancelToken::new();

        assert_eq!(process.run(Some(&token)).await, Ok(()));
        assert_eq!(process.run(Some(&token)).await, Ok(()));
        assert_eq!(process.run(Some(&token.clone())).await, Ok(()));

        assert_eq!(adapter.spawn_count(), 1);
        assert!(process.is_cached(Some(&token)));
        assert_eq!(process.cached_runs(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_spawn() {
        let adapter = MockProcessAdapter::new();
        adapter
            .add_instruction(MockInstruction::exit(0, Duration::from_millis(100)))
            .await;
        let process = memoized(&adapter, "build");
        let token = CancelToken::new();

        let (a, b) = tokio::join!(process.run(Some(&token)), process.run(Some(&token)));
        assert_eq!(a, Ok(()));
        assert_eq!(b, Ok(()));
        assert_eq!(adapter.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let adapter = MockProcessAdapter::new();
        adapter
            .add_instruction(MockInstruction::exit(4, Duration::from_millis(100)))
            .await;
        let process = memoized(&adapter, "build");

        let (a, b) = tokio::join!(process.run(None), process.run(None));
        assert!(matches!(a, Err(RunError::NonZeroExit(_))));
        assert_eq!(a, b);
        assert_eq!(adapter.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_evicted_and_rerun() {
        let adapter = MockProcessAdapter::new();
        adapter
            .add_instruction(MockInstruction::exit(1, Duration::from_millis(5)))
            .await;
        let process = memoized(&adapter, "test");
        let token = CancelToken::new();

        assert!(matches!(
            process.run(Some(&token)).await,
            Err(RunError::NonZeroExit(_))
        ));
        assert!(!process.is_cached(Some(&token)));

        assert_eq!(process.run(Some(&token)).await, Ok(()));
        assert_eq!(adapter.spawn_count(), 2);
        assert!(process.is_cached(Some(&token)));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_evicted() {
        let adapter = MockProcessAdapter::new();
        adapter.add_instruction(MockInstruction::spawn_failure()).await;
        let process = memoized(&adapter, "tool");

        assert!(matches!(process.run(None).await, Err(RunError::Spawn(_))));
        assert_eq!(process.cached_runs(), 0);
        assert_eq!(process.run(None).await, Ok(()));
        assert_eq!(adapter.spawned_commands().await.len(), 2);
    }

    #[tokio::test]
    async fn test_aborted_run_is_evicted() {
        let adapter = MockProcessAdapter::new();
        adapter
            .add_instruction(MockInstruction::exit(0, Duration::from_secs(10)))
            .await;
        let process = memoized(&adapter, "serve");
        let token = CancelToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = timeout(Duration::from_secs(1), process.run(Some(&token)))
            .await
            .expect("abort should settle promptly");
        assert_eq!(result, Err(RunError::Aborted));
        assert_eq!(adapter.kill_count(), 1);
        assert_eq!(process.cached_runs(), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_leaves_cache_alone() {
        let adapter = MockProcessAdapter::new();
        let process = memoized(&adapter, "build");
        let token = CancelToken::new();
        token.cancel();

        assert_eq!(
            process.run(Some(&token)).await,
            Err(RunError::AbortedBeforeStart)
        );
        assert_eq!(process.cached_runs(), 0);
        assert_eq!(adapter.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_cached_success_survives_later_cancellation() {
        let adapter = MockProcessAdapter::new();
        let process = memoized(&adapter, "build");
        let token = CancelToken::new();

        assert_eq!(process.run(Some(&token)).await, Ok(()));
        token.cancel();
        // an already-cancelled token never reaches the cache
        assert_eq!(
            process.run(Some(&token)).await,
            Err(RunError::AbortedBeforeStart)
        );
        assert!(process.is_cached(Some(&token)));
    }

    #[tokio::test]
    async fn test_distinct_tokens_never_share_entries() {
        let adapter = MockProcessAdapter::new();
        let process = memoized(&adapter, "build");
        let first = CancelToken::new();
        let second = CancelToken::new();

        assert_eq!(process.run(Some(&first)).await, Ok(()));
        assert_eq!(process.run(Some(&second)).await, Ok(()));
        assert_eq!(process.run(Some(&first.child_token())).await, Ok(()));

        assert_eq!(adapter.spawn_count(), 3);
        assert_eq!(process.cached_runs(), 3);
    }

    #[tokio::test]
    async fn test_no_token_is_its_own_identity() {
        let adapter = MockProcessAdapter::new();
        let process = memoized(&adapter, "build");

        assert_eq!(process.run(None).await, Ok(()));
        assert_eq!(process.run(None).await, Ok(()));
        assert_eq!(adapter.spawn_count(), 1);
        assert!(process.is_cached(None));

        let token = CancelToken::new();
        assert!(!process.is_cached(Some(&token)));
        assert_eq!(process.run(Some(&token)).await, Ok(()));
        assert_eq!(adapter.spawn_count(), 2);
    }

    #[tokio::test]
    async fn test_wrappers_over_one_process_share_cache() {
        let adapter = MockProcessAdapter::new();
        let process = ManagedProcess::new(9, "build", Arc::new(adapter.clone()));
        let first = memoize(&process);
        let second = memoize(&process);
        let token = CancelToken::new();

        assert_eq!(first.run(Some(&token)).await, Ok(()));
        assert_eq!(second.run(Some(&token)).await, Ok(()));
        assert_eq!(adapter.spawn_count(), 1);

        // the unmemoized original still spawns every time
        assert_eq!(process.run(Some(&token)).await, Ok(()));
        assert_eq!(adapter.spawn_count(), 2);
        assert_eq!(first.id(), 9);
        assert_eq!(second.command(), "build");
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_stall_run() {
        let adapter = MockProcessAdapter::new();
        adapter
            .add_instruction(MockInstruction::exit(0, Duration::from_millis(50)))
            .await;
        let process = memoized(&adapter, "build");

        let early = timeout(Duration::from_millis(5), process.run(None)).await;
        assert!(early.is_err());

        // the run keeps going on its own task and is joined, not restarted
        assert_eq!(process.run(None).await, Ok(()));
        assert_eq!(adapter.spawn_count(), 1);
    }
}
