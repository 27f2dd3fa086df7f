use super::BridgeError;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: usize,
    pub operation: String,
    pub message: String,
}

/// What happened to one batch on the host context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Operations that ran to completion.
    pub succeeded: usize,
    pub failures: Vec<StepFailure>,
}

impl BatchOutcome {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
enum Status {
    Queued,
    Running,
    Finished(BatchOutcome),
    Cancelled,
    /// The worker dropped the batch without finishing it.
    Abandoned,
}

#[derive(Debug)]
struct State {
    status: Status,
    waker: Option<Waker>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    done: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn settled(status: &Status) -> Option<Result<BatchOutcome, BridgeError>> {
    match status {
        Status::Queued | Status::Running => None,
        Status::Finished(outcome) => Some(Ok(outcome.clone())),
        Status::Cancelled => Some(Err(BridgeError::Cancelled)),
        Status::Abandoned => Some(Err(BridgeError::WorkerGone)),
    }
}

/// Caller side of a submitted batch. Resolves only after every operation
/// in the batch has run.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    shared: Arc<Shared>,
}

/// Worker side of a batch. Dropping it unfinished abandons the batch so
/// waiters never hang.
#[derive(Debug)]
pub(crate) struct Completion {
    shared: Arc<Shared>,
    settled: bool,
}

pub(crate) fn batch_pair() -> (BatchHandle, Completion) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            status: Status::Queued,
            waker: None,
        }),
        done: Condvar::new(),
    });
    (
        BatchHandle {
            shared: Arc::clone(&shared),
        },
        Completion {
            shared,
            settled: false,
        },
    )
}

impl BatchHandle {
    /// Discards the batch if the worker has not started it yet. Returns
    /// `false` once the batch is running or settled.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.lock();
        if !matches!(state.status, Status::Queued) {
            return false;
        }
        state.status = Status::Cancelled;
        let waker = state.waker.take();
        drop(state);
        self.shared.done.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        settled(&self.shared.lock().status).is_some()
    }

    pub fn wait(&self) -> Result<BatchOutcome, BridgeError> {
        let mut state = self.shared.lock();
        loop {
            if let Some(result) = settled(&state.status) {
                return result;
            }
            state = self
                .shared
                .done
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// `Ok(None)` when the batch is still queued or running at the deadline.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<BatchOutcome>, BridgeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(result) = settled(&state.status) {
                return result.map(Some);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (next, _) = self
                .shared
                .done
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = next;
        }
    }
}

impl Future for BatchHandle {
    type Output = Result<BatchOutcome, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.lock();
        match settled(&state.status) {
            Some(result) => Poll::Ready(result),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Completion {
    /// Moves the batch to running. `false` when the caller cancelled it
    /// first, in which case the batch must be discarded.
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.shared.lock();
        match state.status {
            Status::Queued => {
                state.status = Status::Running;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn finish(mut self, outcome: BatchOutcome) {
        self.settle(Status::Finished(outcome));
    }

    fn settle(&mut self, status: Status) {
        self.settled = true;
        let mut state = self.shared.lock();
        if matches!(state.status, Status::Cancelled) {
            return;
        }
        state.status = status;
        let waker = state.waker.take();
        drop(state);
        self.shared.done.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(Status::Abandoned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;
    use std::thread;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn wait_returns_the_finished_outcome() {
        let (handle, completion) = batch_pair();
        let worker = thread::spawn(move || {
            assert!(completion.begin());
            completion.finish(BatchOutcome {
                succeeded: 3,
                failures: Vec::new(),
            });
        });
        let outcome = handle.wait().expect("outcome");
        worker.join().expect("join");
        assert_eq!(outcome.attempted(), 3);
        assert!(outcome.is_clean());
    }

    #[test]
    fn cancel_before_start_discards_the_batch() {
        let (handle, completion) = batch_pair();
        assert!(handle.cancel());
        assert!(!completion.begin());
        drop(completion);
        assert!(matches!(handle.wait(), Err(BridgeError::Cancelled)));
    }

    #[test]
    fn cancel_after_start_is_refused() {
        let (handle, completion) = batch_pair();
        assert!(completion.begin());
        assert!(!handle.cancel());
        completion.finish(BatchOutcome::default());
        assert!(handle.wait().is_ok());
    }

    #[test]
    fn dropped_completion_abandons_waiters() {
        let (handle, completion) = batch_pair();
        drop(completion);
        assert!(matches!(handle.wait(), Err(BridgeError::WorkerGone)));
    }

    #[test]
    fn wait_timeout_reports_pending_batches() {
        let (handle, completion) = batch_pair();
        let pending = handle
            .wait_timeout(Duration::from_millis(20))
            .expect("timeout is not an error");
        assert!(pending.is_none());
        completion.finish(BatchOutcome::default());
        assert!(handle
            .wait_timeout(Duration::from_millis(20))
            .expect("finished")
            .is_some());
    }

    #[test]
    fn polling_registers_a_waker_and_completes() {
        let (mut handle, completion) = batch_pair();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counter));
        let mut cx = Context::from_waker(&waker);

        assert!(Pin::new(&mut handle).poll(&mut cx).is_pending());
        completion.finish(BatchOutcome {
            succeeded: 1,
            failures: Vec::new(),
        });
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        match Pin::new(&mut handle).poll(&mut cx) {
            Poll::Ready(Ok(outcome)) => assert_eq!(outcome.succeeded, 1),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }
}
