//! One turn of plan execution.
//!
//! The caller's thread parses the plan, resolves and binds every step, and
//! queues the resulting operations. The batch then runs on the host worker,
//! which clears the session first. Reports from the turn stay on the bus
//! until the next plan arrives.

pub mod error;
pub mod factory;
pub mod feedback;
pub mod plan;

pub use error::EngineError;
pub use factory::{BuiltOperation, OperationBuilder};
pub use feedback::{execution_timeline, feedback_prompt, EMPTY_TIMELINE};
pub use plan::{Plan, PlanError, PlanStep};

use crate::config::EngineSettings;
use crate::execution::{BatchHandle, HostBridge, HostState, OperationQueue, QueuedOperation};
use crate::host::HostModel;
use crate::mapping::ParameterMapper;
use crate::registry::{register_all, TypeRegistry};
use crate::reports::{Report, ReportBus};
use crate::shared::logging::EngineLog;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug)]
pub struct Engine {
    bridge: HostBridge,
    queue: OperationQueue,
    builder: OperationBuilder,
    reports: ReportBus,
    log: EngineLog,
    /// Held while a turn drains, builds and submits.
    turn: Mutex<()>,
}

impl Engine {
    /// Validates `settings` and starts the host worker around `model`,
    /// using the built-in operation catalog.
    pub fn start(model: Box<dyn HostModel>, settings: EngineSettings) -> Result<Self, EngineError> {
        Self::start_with_registry(model, settings, register_all())
    }

    pub fn start_with_registry(
        model: Box<dyn HostModel>,
        settings: EngineSettings,
        registry: &'static TypeRegistry,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let log = EngineLog::new(settings.log_path.clone());
        let reports = ReportBus::new(log.clone());
        for diagnostic in registry.diagnostics() {
            log.append("warn", "registry.collision", diagnostic);
            reports.system(diagnostic.clone());
        }
        let builder = OperationBuilder::new(
            registry,
            ParameterMapper::new(settings.units.default_unit),
        );
        let state = HostState::new(model, settings, reports.clone());
        let bridge = HostBridge::spawn(state, log.clone())?;
        Ok(Self {
            bridge,
            queue: OperationQueue::new(),
            builder,
            reports,
            log,
            turn: Mutex::new(()),
        })
    }

    pub fn reports(&self) -> &ReportBus {
        &self.reports
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    /// Operation schemas for the prompting layer.
    pub fn catalog(&self) -> Value {
        self.builder.registry().catalog()
    }

    pub fn run_plan(&self, raw: &str) -> Result<BatchHandle, EngineError> {
        let plan = Plan::parse(raw)?;
        self.run(&plan)
    }

    pub fn run_plan_value(&self, value: &Value) -> Result<BatchHandle, EngineError> {
        let plan = Plan::from_value(value)?;
        self.run(&plan)
    }

    /// Starts a new turn: drops the previous turn's reports, builds every
    /// step, and submits the batch with a session reset. Concurrent turns
    /// are submitted one after another, each with only its own steps.
    pub fn run(&self, plan: &Plan) -> Result<BatchHandle, EngineError> {
        let _turn = self
            .turn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.reports.drain();
        self.log.append(
            "info",
            "plan.accepted",
            &format!(
                "fingerprint={} steps={}",
                plan.fingerprint(),
                plan.steps.len()
            ),
        );
        let batch = self.build_plan(plan);
        Ok(self.bridge.submit(batch, true)?)
    }

    /// Builds and queues each step for the next [`Engine::run_batch`].
    pub fn enqueue_plan(&self, plan: &Plan) {
        for queued in self.build_plan(plan) {
            self.queue.enqueue(queued.step, queued.operation);
        }
    }

    /// Unknown operations and binding problems become system reports; they
    /// never stop the remaining steps.
    fn build_plan(&self, plan: &Plan) -> Vec<QueuedOperation> {
        let mut batch = Vec::with_capacity(plan.steps.len());
        for (index, step) in plan.steps.iter().enumerate() {
            let number = index + 1;
            if step.action.is_empty() {
                self.reports
                    .system(format!("Step {number}: no operation named; step skipped."));
                continue;
            }
            let Some(built) = self.builder.create(&step.action, &step.payload) else {
                self.reports.system(format!(
                    "Step {number}: unknown operation `{}`; step skipped.",
                    step.action
                ));
                continue;
            };
            for issue in &built.issues {
                self.reports.system(format!(
                    "Step {number} ({}): {issue}",
                    built.descriptor.name
                ));
            }
            batch.push(QueuedOperation::new(number, built.operation));
        }
        batch
    }

    /// Swaps out everything queued so far and sends it to the host worker
    /// as one batch.
    pub fn run_batch(&self, reset_session: bool) -> Result<BatchHandle, EngineError> {
        let _turn = self
            .turn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let batch = self.queue.take_batch();
        Ok(self.bridge.submit(batch, reset_session)?)
    }

    pub fn drain_reports(&self) -> Vec<Report> {
        self.reports.drain()
    }

    /// Key to element count of every result set in the current session.
    pub fn session_summary(&self) -> Result<BTreeMap<String, usize>, EngineError> {
        Ok(self.bridge.call(|state| state.session.summary())?)
    }

    /// Runs `f` on the host worker, between batches.
    pub fn with_host<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut HostState) -> R + Send + 'static,
        R: Send + 'static,
    {
        Ok(self.bridge.call(f)?)
    }

    /// Feedback prompt for the agent built from this turn's reports.
    pub fn next_turn_context(&self, user_request: &str) -> String {
        feedback_prompt(&self.reports.snapshot(), user_request)
    }

    pub fn shutdown(self) -> Result<Box<dyn HostModel>, EngineError> {
        Ok(self.bridge.shutdown()?)
    }
}
