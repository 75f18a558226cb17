//! Workflow engine.
//!
//! The engine owns the table of in-flight executions and drives each one
//! through the step loop: execute the current node, route to the next,
//! persist, notify subscribers. Lifecycle operations (`initialize`,
//! `start`, `pause`, `resume`, `stop`) are the only entry points that
//! touch an execution's status, and they all serialize through the table's
//! lock.
//!
//! Cancellation is cooperative and checked only at loop boundaries: a node
//! action or wait that is already in flight runs to completion, its result
//! is merged, and no further stepping occurs. Side effects it performed are
//! not undone.

use crate::definition::{NodeKind, WorkflowConfig};
use crate::error::{ConfigError, EngineError};
use crate::execution::{ErrorCode, ErrorInfo, Execution, ExecutionStatus};
use crate::executor::NodeExecutor;
use crate::graph::WorkflowGraph;
use crate::registry::FunctionRegistry;
use crate::router::EdgeRouter;
use crate::store::StateManager;
use amber_relay_core::ExecutionId;
use amber_relay_scheduler::Scheduler;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

/// Handle identifying a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type SubscriberFn = Box<dyn Fn(&Execution) + Send + Sync>;

/// One tracked execution: its state plus the cooperative cancellation flag.
struct ExecutionHandle {
    state: Execution,
    cancelled: Arc<AtomicBool>,
    /// True while a step loop is driving this execution. Guards against a
    /// `resume` racing an in-flight loop and double-stepping.
    loop_active: bool,
}

/// The workflow engine: interprets one configuration and drives any number
/// of independent executions of it.
///
/// Constructed from an already-populated [`FunctionRegistry`]; every
/// function reference in the configuration is validated at construction,
/// so unknown names fail fast instead of at first use. The engine is used
/// behind an [`Arc`]; all entry points take `&self`.
pub struct WorkflowEngine {
    config: Arc<WorkflowConfig>,
    graph: Arc<WorkflowGraph>,
    executor: NodeExecutor,
    router: EdgeRouter,
    state_manager: Arc<StateManager>,
    executions: RwLock<HashMap<ExecutionId, ExecutionHandle>>,
    subscribers: Mutex<Vec<(SubscriberId, SubscriberFn)>>,
    next_subscriber_id: AtomicU64,
}

impl WorkflowEngine {
    /// Builds an engine for `config`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is structurally invalid or references a
    /// function name that is not registered.
    pub fn new(
        config: WorkflowConfig,
        registry: FunctionRegistry,
        state_manager: StateManager,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        config.validate_references(&registry)?;

        let registry = Arc::new(registry);
        let graph = Arc::new(WorkflowGraph::from_config(&config)?);
        let scheduler = Arc::new(Scheduler::new());
        let executor = NodeExecutor::new(registry.clone(), scheduler);
        let router = EdgeRouter::new(graph.clone(), registry);

        Ok(Self {
            config: Arc::new(config),
            graph,
            executor,
            router,
            state_manager: Arc::new(state_manager),
            executions: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
        })
    }

    /// The configuration this engine interprets.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// The state manager backing this engine's persistence.
    #[must_use]
    pub fn state_manager(&self) -> &StateManager {
        &self.state_manager
    }

    /// Creates a new idle execution positioned at the start node, persists
    /// it, and registers it in the execution table.
    ///
    /// # Errors
    ///
    /// Fails if the configuration has no start node or persistence fails.
    pub async fn initialize(&self, context_data: serde_json::Value) -> Result<ExecutionId, EngineError> {
        let start_node = self
            .config
            .start_node()
            .ok_or(EngineError::Config(ConfigError::NoStartNode))?;

        let mut state = self.state_manager.create_state(
            self.config.id.clone(),
            context_data,
            self.config.initial_variables.clone(),
        );
        state.current_node_id = Some(start_node.id.clone());
        self.state_manager.save(&state).await?;

        let execution_id = state.execution_id;
        self.executions.write().await.insert(
            execution_id,
            ExecutionHandle {
                state,
                cancelled: Arc::new(AtomicBool::new(false)),
                loop_active: false,
            },
        );

        tracing::debug!(%execution_id, workflow_id = %self.config.id, "execution initialized");
        Ok(execution_id)
    }

    /// Starts an idle execution and drives it until it pauses or reaches a
    /// terminal status. The call resolves when the loop stops.
    ///
    /// # Errors
    ///
    /// Fails if the execution is unknown, not idle, or persistence fails.
    pub async fn start(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        self.transition(execution_id, ExecutionStatus::Idle, ExecutionStatus::Running, "start")
            .await?;
        tracing::debug!(%execution_id, "execution started");
        self.run_loop(execution_id).await
    }

    /// Pauses a running execution.
    ///
    /// This is a loop-boundary flag: it does not interrupt an in-flight
    /// node execution or wait. The loop observes the flip when the current
    /// step commits.
    ///
    /// # Errors
    ///
    /// Fails if the execution is unknown or not running.
    pub async fn pause(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        self.transition(execution_id, ExecutionStatus::Running, ExecutionStatus::Paused, "pause")
            .await?;
        tracing::debug!(%execution_id, "execution paused");
        Ok(())
    }

    /// Resumes a paused execution and drives it until it pauses again or
    /// reaches a terminal status.
    ///
    /// # Errors
    ///
    /// Fails if the execution is unknown, not paused, or persistence fails.
    pub async fn resume(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        self.transition(execution_id, ExecutionStatus::Paused, ExecutionStatus::Running, "resume")
            .await?;
        tracing::debug!(%execution_id, "execution resumed");
        self.run_loop(execution_id).await
    }

    /// Stops a running or paused execution.
    ///
    /// Signals cancellation, marks the execution cancelled with an end
    /// timestamp, persists, and notifies. Takes effect at the next loop
    /// boundary; in-flight node work runs to completion but no further
    /// nodes execute.
    ///
    /// # Errors
    ///
    /// Fails if the execution is unknown, not active, or persistence fails.
    pub async fn stop(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        let snapshot = {
            let mut table = self.executions.write().await;
            let handle = table
                .get_mut(&execution_id)
                .ok_or(EngineError::ExecutionNotFound { execution_id })?;
            if !handle.state.status.is_active() {
                return Err(EngineError::InvalidTransition {
                    execution_id,
                    from: handle.state.status,
                    operation: "stop",
                });
            }
            handle.cancelled.store(true, Ordering::SeqCst);
            handle.state.cancel();
            handle.state.clone()
        };

        self.state_manager.save(&snapshot).await?;
        self.notify(&snapshot);
        tracing::debug!(%execution_id, "execution stopped");
        Ok(())
    }

    /// Returns a snapshot of an execution's state.
    pub async fn state(&self, execution_id: ExecutionId) -> Option<Execution> {
        self.executions
            .read()
            .await
            .get(&execution_id)
            .map(|handle| handle.state.clone())
    }

    /// Registers a subscriber invoked with the full execution snapshot on
    /// every transition. Callbacks run synchronously on the engine's tasks
    /// and must not re-enter the engine.
    pub fn subscribe(&self, callback: impl Fn(&Execution) + Send + Sync + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers_locked().push((id, Box::new(callback)));
        id
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers_locked().retain(|(sub_id, _)| *sub_id != id);
    }

    fn subscribers_locked(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(SubscriberId, SubscriberFn)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, execution: &Execution) {
        for (_, callback) in self.subscribers_locked().iter() {
            callback(execution);
        }
    }

    /// Flips `expected → to` under the table lock and notifies.
    async fn transition(
        &self,
        execution_id: ExecutionId,
        expected: ExecutionStatus,
        to: ExecutionStatus,
        operation: &'static str,
    ) -> Result<(), EngineError> {
        let snapshot = {
            let mut table = self.executions.write().await;
            let handle = table
                .get_mut(&execution_id)
                .ok_or(EngineError::ExecutionNotFound { execution_id })?;
            if handle.state.status != expected {
                return Err(EngineError::InvalidTransition {
                    execution_id,
                    from: handle.state.status,
                    operation,
                });
            }
            handle.state.status = to;
            handle.state.clone()
        };
        self.notify(&snapshot);
        Ok(())
    }

    /// Drives the step loop, guaranteeing a single driver per execution.
    async fn run_loop(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        {
            let mut table = self.executions.write().await;
            let handle = table
                .get_mut(&execution_id)
                .ok_or(EngineError::ExecutionNotFound { execution_id })?;
            if handle.loop_active {
                // Another task is already driving this execution; it will
                // observe the current status at its next boundary check.
                return Ok(());
            }
            handle.loop_active = true;
        }

        let result = self.step_loop(execution_id).await;

        let mut table = self.executions.write().await;
        if let Some(handle) = table.get_mut(&execution_id) {
            handle.loop_active = false;
        }
        result
    }

    async fn step_loop(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        loop {
            let (state, cancelled) = {
                let table = self.executions.read().await;
                let handle = table
                    .get(&execution_id)
                    .ok_or(EngineError::ExecutionNotFound { execution_id })?;
                (handle.state.clone(), handle.cancelled.clone())
            };

            // Boundary checks: cancellation first, then status.
            if cancelled.load(Ordering::SeqCst) || state.status != ExecutionStatus::Running {
                break;
            }

            let Some(node_id) = state.current_node_id.clone() else {
                // The branch ended with the execution still running.
                let mut next = state;
                next.complete();
                self.commit(execution_id, next).await?;
                break;
            };

            let Some(node) = self.graph.node(&node_id) else {
                let mut next = state;
                next.fail(
                    ErrorInfo::new(
                        ErrorCode::NodeNotFound,
                        format!("node {node_id} not found in workflow {}", self.config.id),
                    )
                    .with_node(node_id),
                );
                self.commit(execution_id, next).await?;
                break;
            };

            let mut next = self.executor.execute(node, state).await;

            if next.status == ExecutionStatus::Failed {
                // The executor already finalized the failure.
            } else if node.kind == NodeKind::End {
                next.complete();
            } else {
                next.current_node_id = self.router.next_node(&node.id, &next).await;
            }

            let snapshot = self.commit(execution_id, next).await?;
            if snapshot.status != ExecutionStatus::Running {
                break;
            }
        }

        Ok(())
    }

    /// Writes a step result back into the table, persists it, and notifies.
    ///
    /// Status flips that landed while the step was in flight win over the
    /// step's still-running status: a pause keeps the routed successor but
    /// suspends the loop; a cancellation discards further stepping.
    async fn commit(
        &self,
        execution_id: ExecutionId,
        mut next: Execution,
    ) -> Result<Execution, EngineError> {
        let snapshot = {
            let mut table = self.executions.write().await;
            let handle = table
                .get_mut(&execution_id)
                .ok_or(EngineError::ExecutionNotFound { execution_id })?;

            if next.status == ExecutionStatus::Running {
                match handle.state.status {
                    ExecutionStatus::Paused => next.status = ExecutionStatus::Paused,
                    ExecutionStatus::Cancelled => {
                        next.status = ExecutionStatus::Cancelled;
                        next.current_node_id = None;
                        next.finished_at = handle.state.finished_at;
                    }
                    _ => {}
                }
            }

            handle.state = next.clone();
            next
        };

        self.state_manager.save(&snapshot).await?;
        self.notify(&snapshot);
        Ok(snapshot)
    }
}
