use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use super::source::RefreshSource;
use crate::error::RefreshError;
use crate::store::AccessToken;

type RefreshOutcome = Result<AccessToken, RefreshError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The in-flight refresh and the cycle number it runs as
type Slot = Option<(u64, PendingRefresh)>;

/// Runs at most one refresh at a time and fans its outcome out to every
/// caller that asked while it was in flight.
///
/// The slot holding the in-flight refresh is checked and filled under one
/// lock, so two callers can never both start a refresh. The refresh clears
/// the slot itself once its outcome is known; callers arriving after that
/// start a new cycle. Any attached caller can drive the shared future, so
/// dropping one caller never strands the others.
pub struct RefreshCoordinator {
    source: Arc<dyn RefreshSource>,
    pending: Arc<Mutex<Slot>>,
    timeout: Option<Duration>,
    cycles: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(source: Arc<dyn RefreshSource>) -> Self {
        Self {
            source,
            pending: Arc::new(Mutex::new(None)),
            timeout: None,
            cycles: AtomicU64::new(0),
        }
    }

    /// Bound each refresh; when it elapses every waiter gets
    /// [`RefreshError::Cancelled`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// New access token from the shared in-flight refresh, starting one if
    /// none is running. Failures are not retried.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.refresh_in_cycle().await.1
    }

    /// Like [`refresh`](Self::refresh), also returning the cycle the outcome
    /// belongs to. Every caller sharing one refresh sees the same cycle.
    pub async fn refresh_in_cycle(&self) -> (u64, RefreshOutcome) {
        let (cycle, pending) = {
            let mut slot = lock(&self.pending);
            match slot.as_ref() {
                Some((cycle, pending)) => {
                    debug!(cycle, "Attaching to in-flight token refresh");
                    (*cycle, pending.clone())
                }
                None => {
                    let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
                    let pending = self.start(cycle).shared();
                    *slot = Some((cycle, pending.clone()));
                    (cycle, pending)
                }
            }
        };
        (cycle, pending.await)
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Number of refresh cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    fn start(&self, cycle: u64) -> BoxFuture<'static, RefreshOutcome> {
        let source = Arc::clone(&self.source);
        let slot = Arc::clone(&self.pending);
        let timeout = self.timeout;

        async move {
            debug!(cycle, "Starting token refresh");
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, source.fetch_token()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RefreshError::Cancelled),
                },
                None => source.fetch_token().await,
            };

            // Release before handing the outcome to waiters
            lock(&slot).take();

            match &outcome {
                Ok(_) => debug!(cycle, "Token refresh succeeded"),
                Err(e) => warn!(cycle, error = %e, "Token refresh failed"),
            }
            outcome
        }
        .boxed()
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("cycles", &self.cycles())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::join_all;
    use reqwest::StatusCode;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Source that blocks until released, counting calls
    struct GatedSource {
        calls: AtomicUsize,
        gate: Notify,
        outcome: RefreshOutcome,
    }

    impl GatedSource {
        fn new(outcome: RefreshOutcome) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                outcome,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshSource for GatedSource {
        async fn fetch_token(&self) -> RefreshOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.gate.notified().await;
            self.outcome
                .clone()
                .map(|t| AccessToken::new(format!("{}-{}", t.as_str(), n)))
        }
    }

    /// Source that never answers
    struct HangingSource;

    #[async_trait]
    impl RefreshSource for HangingSource {
        async fn fetch_token(&self) -> RefreshOutcome {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let source = GatedSource::new(Ok(AccessToken::new("T2")));
        let coordinator = RefreshCoordinator::new(source.clone());

        let callers = join_all((0..5).map(|_| coordinator.refresh()));
        let release = async {
            tokio::task::yield_now().await;
            source.gate.notify_one();
        };
        let (outcomes, ()) = tokio::join!(callers, release);

        assert_eq!(source.calls(), 1);
        assert_eq!(coordinator.cycles(), 1);
        for outcome in outcomes {
            assert_eq!(outcome, Ok(AccessToken::new("T2-1")));
        }
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let failure = RefreshError::Rejected {
            status: StatusCode::UNAUTHORIZED,
            message: "refresh token expired".to_string(),
        };
        let source = GatedSource::new(Err(failure.clone()));
        let coordinator = RefreshCoordinator::new(source.clone());

        let callers = join_all((0..3).map(|_| coordinator.refresh()));
        let release = async {
            tokio::task::yield_now().await;
            source.gate.notify_one();
        };
        let (outcomes, ()) = tokio::join!(callers, release);

        assert_eq!(source.calls(), 1);
        for outcome in outcomes {
            assert_eq!(outcome, Err(failure.clone()));
        }
    }

    #[tokio::test]
    async fn test_caller_after_release_starts_new_cycle() {
        let source = GatedSource::new(Ok(AccessToken::new("T")));
        let coordinator = RefreshCoordinator::new(source.clone());

        // A stored permit lets each cycle through immediately
        source.gate.notify_one();
        let first = coordinator.refresh().await;
        source.gate.notify_one();
        let second = coordinator.refresh().await;

        assert_eq!(first, Ok(AccessToken::new("T-1")));
        assert_eq!(second, Ok(AccessToken::new("T-2")));
        assert_eq!(source.calls(), 2);
        assert_eq!(coordinator.cycles(), 2);
    }

    #[tokio::test]
    async fn test_cycle_numbers_follow_refreshes() {
        let source = GatedSource::new(Err(RefreshError::MissingToken));
        let coordinator = RefreshCoordinator::new(source.clone());

        let callers = join_all((0..2).map(|_| coordinator.refresh_in_cycle()));
        let release = async {
            tokio::task::yield_now().await;
            source.gate.notify_one();
        };
        let (shared, ()) = tokio::join!(callers, release);
        assert!(shared.iter().all(|(cycle, _)| *cycle == 1));

        source.gate.notify_one();
        let (cycle, outcome) = coordinator.refresh_in_cycle().await;
        assert_eq!(cycle, 2);
        assert_eq!(outcome, Err(RefreshError::MissingToken));
    }

    #[tokio::test]
    async fn test_timeout_fails_every_waiter() {
        let coordinator =
            RefreshCoordinator::new(Arc::new(HangingSource)).with_timeout(Duration::from_millis(20));

        let outcomes = join_all((0..3).map(|_| coordinator.refresh())).await;

        for outcome in outcomes {
            assert_eq!(outcome, Err(RefreshError::Cancelled));
        }
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.cycles(), 1);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_strand_others() {
        let source = GatedSource::new(Ok(AccessToken::new("T2")));
        let coordinator = RefreshCoordinator::new(source.clone());

        // First caller starts the refresh, then goes away before it completes
        let mut first = Box::pin(coordinator.refresh());
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(coordinator.is_refreshing());
        drop(first);

        source.gate.notify_one();
        let outcome = coordinator.refresh().await;

        assert_eq!(outcome, Ok(AccessToken::new("T2-1")));
        assert_eq!(source.calls(), 1);
    }
}
