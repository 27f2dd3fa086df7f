use super::handle::{batch_pair, BatchHandle, BatchOutcome, Completion, StepFailure};
use super::queue::QueuedOperation;
use super::BridgeError;
use crate::config::EngineSettings;
use crate::host::HostModel;
use crate::operations::ExecutionContext;
use crate::reports::ReportBus;
use crate::session::SessionStore;
use crate::shared::logging::EngineLog;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

const WORKER_THREAD_NAME: &str = "cadpilot-host";
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Everything that lives on the host execution context. Only the worker
/// thread ever holds it, so none of it is locked.
pub struct HostState {
    pub model: Box<dyn HostModel>,
    pub session: SessionStore,
    pub reports: ReportBus,
    pub settings: EngineSettings,
}

impl HostState {
    pub fn new(model: Box<dyn HostModel>, settings: EngineSettings, reports: ReportBus) -> Self {
        Self {
            model,
            session: SessionStore::new(&settings.session),
            reports,
            settings,
        }
    }

    pub fn context(&mut self) -> ExecutionContext<'_> {
        ExecutionContext::new(
            &mut *self.model,
            &mut self.session,
            &self.reports,
            &self.settings,
        )
    }
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("document", &self.model.document_name())
            .field("session", &self.session.summary())
            .finish()
    }
}

type HostCall = Box<dyn FnOnce(&mut HostState) + Send>;

enum Message {
    Batch {
        operations: Vec<QueuedOperation>,
        reset_session: bool,
        completion: Completion,
    },
    Call(HostCall),
    Shutdown,
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}

/// Runs every operation in order. A failing or panicking operation is
/// reported and the batch moves on to the next one.
fn run_operations(state: &mut HostState, operations: Vec<QueuedOperation>) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for queued in operations {
        let QueuedOperation {
            step,
            mut operation,
        } = queued;
        let name = operation.name();
        let result = {
            let mut ctx = state.context();
            panic::catch_unwind(AssertUnwindSafe(|| operation.execute(&mut ctx)))
        };
        let message = match result {
            Ok(Ok(())) => {
                outcome.succeeded += 1;
                continue;
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        state
            .reports
            .error(format!("Step {step} ({name}) failed: {message}"));
        outcome.failures.push(StepFailure {
            step,
            operation: name.to_string(),
            message,
        });
    }
    outcome
}

fn worker_loop(mut state: HostState, inbox: Receiver<Message>, log: EngineLog) -> Box<dyn HostModel> {
    while let Ok(message) = inbox.recv() {
        match message {
            Message::Batch {
                operations,
                reset_session,
                completion,
            } => {
                if !completion.begin() {
                    log.append(
                        "info",
                        "batch.cancelled",
                        &format!("{} operations discarded", operations.len()),
                    );
                    continue;
                }
                if reset_session {
                    state.session.reset();
                }
                log.append(
                    "info",
                    "batch.started",
                    &format!("{} operations", operations.len()),
                );
                let outcome = run_operations(&mut state, operations);
                log.append(
                    if outcome.is_clean() { "info" } else { "warn" },
                    "batch.finished",
                    &format!(
                        "{} succeeded, {} failed",
                        outcome.succeeded,
                        outcome.failures.len()
                    ),
                );
                completion.finish(outcome);
            }
            Message::Call(call) => call(&mut state),
            Message::Shutdown => break,
        }
    }
    state.model
}

/// Owns the host worker thread. Batches and calls are delivered through
/// one inbox, so they never interleave.
#[derive(Debug)]
pub struct HostBridge {
    sender: Sender<Message>,
    worker: Option<JoinHandle<Box<dyn HostModel>>>,
}

impl HostBridge {
    pub fn spawn(state: HostState, log: EngineLog) -> Result<Self, BridgeError> {
        let (sender, inbox) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || worker_loop(state, inbox, log))
            .map_err(BridgeError::Spawn)?;
        Ok(Self {
            sender,
            worker: Some(worker),
        })
    }

    /// Hands a batch to the worker. With `reset_session` the session store
    /// is cleared on the worker right before the batch runs.
    pub fn submit(
        &self,
        operations: Vec<QueuedOperation>,
        reset_session: bool,
    ) -> Result<BatchHandle, BridgeError> {
        let (handle, completion) = batch_pair();
        self.sender
            .send(Message::Batch {
                operations,
                reset_session,
                completion,
            })
            .map_err(|_| BridgeError::WorkerGone)?;
        Ok(handle)
    }

    /// Runs `f` on the host context and waits for its result.
    pub fn call<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut HostState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = mpsc::channel();
        let call: HostCall = Box::new(move |state| {
            let value = panic::catch_unwind(AssertUnwindSafe(|| f(state)))
                .map_err(|payload| BridgeError::Panicked(panic_message(payload.as_ref())));
            let _ = reply.send(value);
        });
        self.sender
            .send(Message::Call(call))
            .map_err(|_| BridgeError::WorkerGone)?;
        result.recv().map_err(|_| BridgeError::WorkerGone)?
    }

    /// Stops the worker after everything already submitted and returns the
    /// host model.
    pub fn shutdown(mut self) -> Result<Box<dyn HostModel>, BridgeError> {
        let _ = self.sender.send(Message::Shutdown);
        let worker = self.worker.take().ok_or(BridgeError::WorkerGone)?;
        worker
            .join()
            .map_err(|payload| BridgeError::Panicked(panic_message(payload.as_ref())))
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.sender.send(Message::Shutdown);
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{BoundParams, FieldValue};
    use crate::operations::fixtures::sample_model;
    use crate::operations::queries::{ByCategory, CreateGlobalScope};
    use crate::operations::{Operation, OperationError};
    use crate::registry::OperationKind;
    use crate::reports::Audience;

    struct Explode;

    impl Operation for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn kind(&self) -> OperationKind {
            OperationKind::Action
        }

        fn execute(&mut self, _ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
            panic!("boom");
        }
    }

    fn bridge() -> (HostBridge, ReportBus) {
        let reports = ReportBus::default();
        let state = HostState::new(
            Box::new(sample_model()),
            EngineSettings::default(),
            reports.clone(),
        );
        (
            HostBridge::spawn(state, EngineLog::disabled()).expect("spawn"),
            reports,
        )
    }

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }

    #[test]
    fn batches_run_in_order_on_the_worker() {
        let (bridge, _reports) = bridge();
        let operations = vec![
            QueuedOperation::new(
                1,
                CreateGlobalScope::create(&BoundParams::default().with("key", text("$q1"))),
            ),
            QueuedOperation::new(
                2,
                ByCategory::create(
                    &BoundParams::default()
                        .with("key", text("$q1"))
                        .with("category", text("Walls")),
                ),
            ),
        ];
        let outcome = bridge
            .submit(operations, true)
            .expect("submit")
            .wait()
            .expect("wait");
        assert_eq!(outcome.succeeded, 2);
        let summary = bridge
            .call(|state| state.session.summary())
            .expect("summary");
        assert_eq!(summary.get("$q1"), Some(&4));
    }

    #[test]
    fn panics_are_contained_to_their_step() {
        let (bridge, reports) = bridge();
        let operations = vec![
            QueuedOperation::new(1, Box::new(Explode)),
            QueuedOperation::new(2, CreateGlobalScope::create(&BoundParams::default())),
        ];
        let outcome = bridge
            .submit(operations, false)
            .expect("submit")
            .wait()
            .expect("wait");
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].step, 1);
        let errors = reports
            .drain()
            .into_iter()
            .filter(|report| report.audience == Audience::Error)
            .map(|report| report.text)
            .collect::<Vec<_>>();
        assert_eq!(errors, vec!["Step 1 (explode) failed: panicked: boom".to_string()]);
    }

    #[test]
    fn reset_clears_the_previous_turn() {
        let (bridge, _reports) = bridge();
        let first = vec![QueuedOperation::new(
            1,
            CreateGlobalScope::create(&BoundParams::default().with("key", text("$q1"))),
        )];
        bridge.submit(first, true).expect("submit").wait().expect("wait");
        bridge
            .submit(Vec::new(), true)
            .expect("submit")
            .wait()
            .expect("wait");
        let summary = bridge
            .call(|state| state.session.summary())
            .expect("summary");
        assert!(summary.is_empty());
    }

    #[test]
    fn panicking_calls_surface_as_errors() {
        let (bridge, _reports) = bridge();
        let err = bridge
            .call(|_state| -> usize { panic!("inspect failed") })
            .expect_err("panic");
        assert!(matches!(err, BridgeError::Panicked(ref message) if message == "inspect failed"));
        assert_eq!(bridge.call(|state| state.model.element_handles().len()).expect("alive"), 12);
    }

    #[test]
    fn cancelled_batches_are_discarded_by_the_worker() {
        let (bridge, _reports) = bridge();
        let (started, worker_busy) = mpsc::channel();
        let (release, gate) = mpsc::channel::<()>();
        thread::scope(|scope| {
            scope.spawn(|| {
                bridge
                    .call(move |_state| {
                        let _ = started.send(());
                        let _ = gate.recv();
                    })
                    .expect("blocking call");
            });
            worker_busy.recv().expect("worker busy");
            let handle = bridge
                .submit(
                    vec![QueuedOperation::new(
                        1,
                        CreateGlobalScope::create(&BoundParams::default().with("key", text("$q1"))),
                    )],
                    false,
                )
                .expect("submit");
            assert!(handle.cancel());
            release.send(()).expect("release worker");
            assert!(matches!(handle.wait(), Err(BridgeError::Cancelled)));
        });
        let summary = bridge
            .call(|state| state.session.summary())
            .expect("summary");
        assert!(summary.is_empty());
    }

    #[test]
    fn shutdown_returns_the_model() {
        let (bridge, _reports) = bridge();
        let model = bridge.shutdown().expect("shutdown");
        assert_eq!(model.document_name(), "sample");
    }
}
