//! Cancellable, dependency-ordered store operations.
//!
//! Each [`Operation`] runs as its own task. It can be told to wait for other
//! operations first; it starts only once every one of them has finished, and
//! is itself cancelled if any of them was.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Finished,
    Cancelled,
}

/// Cloneable reference to a running operation, for cancelling it or for
/// ordering other operations after it.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    label: &'static str,
    cancel: CancellationToken,
    state: watch::Receiver<OperationState>,
}

impl OperationHandle {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> OperationState {
        *self.state.borrow()
    }

    /// Cancels the operation and, through it, everything ordered after it.
    /// Has no effect once it has finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the operation to finish or be cancelled.
    pub async fn finished(&self) -> OperationState {
        let mut state = self.state.clone();
        let outcome = state
            .wait_for(|s| *s != OperationState::Pending)
            .await
            .map(|s| *s);
        // Task gone without reporting, e.g. runtime shutdown.
        outcome.unwrap_or(OperationState::Cancelled)
    }
}

/// A store operation in flight.
///
/// Awaiting it yields the operation's outcome, or [`ClientError::Cancelled`]
/// if it was cancelled. Dropping it does not stop the work.
#[derive(Debug)]
pub struct Operation<T> {
    handle: OperationHandle,
    result: oneshot::Receiver<Result<T, ClientError>>,
}

impl<T: Send + 'static> Operation<T> {
    /// Spawns `work` to start once every operation in `after` has finished.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn spawn<F>(label: &'static str, after: &[OperationHandle], work: F) -> Self
    where
        F: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(OperationState::Pending);
        let (result_tx, result_rx) = oneshot::channel();
        let dependencies = after.to_vec();

        let token = cancel.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = run_after(label, dependencies, work) => outcome,
            };

            match outcome {
                Some(result) => {
                    if result_tx.send(result).is_err() {
                        tracing::trace!(operation = label, "result dropped unobserved");
                    }
                    state_tx.send_replace(OperationState::Finished);
                }
                None => {
                    token.cancel();
                    tracing::debug!(operation = label, "cancelled");
                    state_tx.send_replace(OperationState::Cancelled);
                }
            }
        });

        Self {
            handle: OperationHandle {
                label,
                cancel,
                state: state_rx,
            },
            result: result_rx,
        }
    }

    /// Runs `f` with the outcome, unless the operation is cancelled first.
    pub fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Result<T, ClientError>) + Send + 'static,
    {
        let result = self.result;
        tokio::spawn(async move {
            if let Ok(outcome) = result.await {
                f(outcome);
            }
        });
    }
}

impl<T> Operation<T> {
    pub fn handle(&self) -> OperationHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> OperationState {
        self.handle.state()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl<T> Future for Operation<T> {
    type Output = Result<T, ClientError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.result).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

async fn run_after<F: Future>(
    label: &'static str,
    dependencies: Vec<OperationHandle>,
    work: F,
) -> Option<F::Output> {
    {
        // Any one cancellation cancels the dependent, however long the
        // others still take.
        let mut pending: FuturesUnordered<_> = dependencies
            .iter()
            .map(|dependency| async move { (dependency, dependency.finished().await) })
            .collect();
        while let Some((dependency, state)) = pending.next().await {
            if state == OperationState::Cancelled {
                tracing::debug!(
                    operation = label,
                    dependency = dependency.label(),
                    "dependency was cancelled"
                );
                return None;
            }
        }
    }
    Some(work.await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_operation_yields_result() {
        let op = Operation::spawn("answer", &[], async { Ok(42) });
        assert_eq!(op.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_waits_for_dependencies() {
        let gate = Arc::new(Notify::new());
        let ran_first = Arc::new(AtomicBool::new(false));

        let first = {
            let gate = gate.clone();
            let ran_first = ran_first.clone();
            Operation::spawn("first", &[], async move {
                gate.notified().await;
                ran_first.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        let second = {
            let ran_first = ran_first.clone();
            Operation::spawn("second", &[first.handle()], async move {
                Ok(ran_first.load(Ordering::SeqCst))
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(second.state(), OperationState::Pending);

        gate.notify_one();
        assert!(second.await.unwrap());
        assert_eq!(first.state(), OperationState::Finished);
    }

    #[tokio::test]
    async fn test_failed_dependency_still_releases() {
        let first: Operation<()> =
            Operation::spawn("first", &[], async { Err(ClientError::RecordNotFound) });
        let second = Operation::spawn("second", &[first.handle()], async { Ok("ran") });

        assert!(matches!(first.await, Err(ClientError::RecordNotFound)));
        assert_eq!(second.await.unwrap(), "ran");
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_dependents() {
        let first: Operation<()> = Operation::spawn("first", &[], async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let second = Operation::spawn("second", &[first.handle()], async { Ok(()) });

        first.cancel();
        assert!(matches!(second.await, Err(ClientError::Cancelled)));
        assert!(matches!(first.await, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_propagates_past_slow_dependency() {
        let slow: Operation<()> = Operation::spawn("slow", &[], async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let doomed: Operation<()> = Operation::spawn("doomed", &[], async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let dependent = Operation::spawn("dependent", &[slow.handle(), doomed.handle()], async {
            Ok(())
        });
        let handle = dependent.handle();

        doomed.cancel();
        let outcome = tokio::time::timeout(Duration::from_millis(500), dependent)
            .await
            .expect("dependent should be cancelled without waiting for the slow dependency");
        assert!(matches!(outcome, Err(ClientError::Cancelled)));
        assert_eq!(handle.state(), OperationState::Cancelled);
        assert_eq!(slow.state(), OperationState::Pending);
        slow.cancel();
    }

    #[tokio::test]
    async fn test_cancelled_operation_skips_completion_handler() {
        let fired = Arc::new(AtomicBool::new(false));
        let op: Operation<()> = Operation::spawn("slow", &[], async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let handle = op.handle();
        {
            let fired = fired.clone();
            op.on_complete(move |_| fired.store(true, Ordering::SeqCst));
        }

        handle.cancel();
        assert_eq!(handle.finished().await, OperationState::Cancelled);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_completion_handler_fires() {
        let (tx, rx) = oneshot::channel();
        Operation::spawn("quick", &[], async { Ok(7) }).on_complete(move |outcome| {
            let _ = tx.send(outcome.unwrap());
        });
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_after_finish_is_noop() {
        let op = Operation::spawn("done", &[], async { Ok(1) });
        let handle = op.handle();
        assert_eq!(handle.finished().await, OperationState::Finished);
        handle.cancel();
        assert_eq!(op.await.unwrap(), 1);
    }
}
