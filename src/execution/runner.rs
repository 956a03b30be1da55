use std::sync::Arc;

use uuid::Uuid;

use crate::delivery::types::{DeliveryContext, DeliveryResult, StructuredRecord};
use crate::delivery::{deliver_all, Deliverer};
use crate::error::{AppError, Result};
use crate::execution::machine::{decide_next_state, Action};
use crate::extraction::Extractor;
use crate::hub::types::{AgentExecution, ExecutionState, ExecutionStatus};
use crate::hub::Hub;
use crate::workspace::{FileSource, WorkspaceManager};

/// How the driver handles an execution that is waiting for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Return as soon as review is pending.
    OneShot,
    /// Block on the hub until the execution is confirmed or canceled.
    Wait,
}

/// Where a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Canceled,
    Delivered { deliveries: Vec<DeliveryResult> },
    AwaitingReview,
}

const REVIEW_TARGETS: [ExecutionStatus; 2] = [ExecutionStatus::Confirmed, ExecutionStatus::Canceled];

/// Drives one execution forward until it halts or needs a human.
pub struct Runner {
    hub: Arc<dyn Hub>,
    files: Arc<dyn FileSource>,
    extractor: Arc<dyn Extractor>,
    deliverer: Arc<Deliverer>,
    workspace: WorkspaceManager,
    mode: RunMode,
    concurrent_delivery: bool,
    expected_agent_id: Option<Uuid>,
    expected_workspace_id: Option<Uuid>,
}

impl Runner {
    pub fn new(
        hub: Arc<dyn Hub>,
        files: Arc<dyn FileSource>,
        extractor: Arc<dyn Extractor>,
        deliverer: Arc<Deliverer>,
        workspace: WorkspaceManager,
    ) -> Self {
        Self {
            hub,
            files,
            extractor,
            deliverer,
            workspace,
            mode: RunMode::OneShot,
            concurrent_delivery: false,
            expected_agent_id: None,
            expected_workspace_id: None,
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_concurrent_delivery(mut self, concurrent: bool) -> Self {
        self.concurrent_delivery = concurrent;
        self
    }

    /// Refuse to run executions that belong to a different agent.
    pub fn with_expected_agent(mut self, agent_id: Uuid) -> Self {
        self.expected_agent_id = Some(agent_id);
        self
    }

    /// Refuse to run executions that live in a different workspace.
    pub fn with_expected_workspace(mut self, workspace_id: Uuid) -> Self {
        self.expected_workspace_id = Some(workspace_id);
        self
    }

    /// Advance the execution as far as possible.
    ///
    /// Safe to re-invoke: every step is gated on the state the hub returns.
    pub async fn run_once(&self, execution_id: Uuid) -> Result<RunOutcome> {
        tracing::info!(execution_id = %execution_id, "Getting agent execution");
        let mut execution = self.hub.get_execution(execution_id).await?;

        if let Some(expected) = self.expected_agent_id {
            if execution.agent_id != expected {
                return Err(AppError::Config(format!(
                    "execution {execution_id} belongs to agent {}, not {expected}",
                    execution.agent_id
                )));
            }
        }

        if let Some(expected) = self.expected_workspace_id {
            if execution.workspace_id != expected {
                return Err(AppError::Config(format!(
                    "execution {execution_id} belongs to workspace {}, not {expected}",
                    execution.workspace_id
                )));
            }
        }

        loop {
            let status = execution.state.status();
            tracing::debug!(execution_id = %execution_id, status = %status, "Deciding next action");

            execution = match decide_next_state(&execution.state) {
                Action::Halt => return halt_outcome(execution.state),
                Action::Extract => {
                    let next = self.extract(&execution).await?;
                    self.persist(&execution, next).await?
                }
                Action::AwaitReview => match self.mode {
                    RunMode::OneShot => {
                        tracing::info!(execution_id = %execution_id, "Waiting for review of extracted data - exiting");
                        return Ok(RunOutcome::AwaitingReview);
                    }
                    RunMode::Wait => {
                        tracing::info!(execution_id = %execution_id, "Waiting for review of extracted data");
                        self.hub.wait_for_status(execution_id, &REVIEW_TARGETS).await?
                    }
                },
                Action::Deliver(data) => {
                    let next = self.deliver(&execution, &data).await?;
                    self.persist(&execution, next).await?
                }
            };
        }
    }

    async fn extract(&self, execution: &AgentExecution) -> Result<ExecutionState> {
        tracing::info!(agent_id = %execution.agent_id, "Getting agent");
        let agent = self.hub.get_agent(execution.agent_id).await?;

        let workspace = self
            .workspace
            .download_input_files(self.files.as_ref(), execution.workspace_id, execution.id)
            .await?;

        tracing::info!("Loading files from disk");
        let files = workspace.load_files().await?;

        tracing::info!(files = files.len(), "Extracting data from files");
        let data = self.extractor.extract(&files, &agent.data_schema).await?;

        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "Failed to remove input file directory");
        }

        Ok(ExecutionState::PendingReview {
            data_extracted: data,
        })
    }

    async fn deliver(
        &self,
        execution: &AgentExecution,
        data: &StructuredRecord,
    ) -> Result<ExecutionState> {
        tracing::info!(
            execution_id = %execution.id,
            "Execution was confirmed, processing data destinations"
        );
        let agent = self.hub.get_agent(execution.agent_id).await?;

        let context = DeliveryContext {
            agent_id: execution.agent_id,
            agent_execution_id: execution.id,
            workspace_id: execution.workspace_id,
        };

        let deliveries = deliver_all(
            &self.deliverer,
            &agent.data_destinations,
            data,
            &context,
            self.concurrent_delivery,
        )
        .await;

        Ok(ExecutionState::DeliveredToDestination { deliveries })
    }

    /// Persist `next` and return what the hub stored, which must lie ahead of
    /// the current status.
    async fn persist(
        &self,
        current: &AgentExecution,
        next: ExecutionState,
    ) -> Result<AgentExecution> {
        let from = current.state.status();
        tracing::info!(
            execution_id = %current.id,
            from = %from,
            to = %next.status(),
            "Updating agent execution state"
        );

        let stored = self.hub.update_execution_state(current.id, &next).await?;
        let stored_status = stored.state.status();

        if !from.can_advance_to(stored_status) {
            return Err(AppError::Hub(format!(
                "hub stored {stored_status} for execution {} which does not follow {from}",
                current.id
            )));
        }

        Ok(stored)
    }
}

fn halt_outcome(state: ExecutionState) -> Result<RunOutcome> {
    match state {
        ExecutionState::Canceled => {
            tracing::info!("Execution was canceled");
            Ok(RunOutcome::Canceled)
        }
        ExecutionState::DeliveredToDestination { deliveries } => {
            tracing::info!(
                deliveries = deliveries.len(),
                "Execution has ended (DELIVERED_TO_DESTINATION)"
            );
            Ok(RunOutcome::Delivered { deliveries })
        }
        other => Err(AppError::Internal(format!(
            "halted in non-terminal state {}",
            other.status()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceConfig;
    use crate::delivery::http::{HttpPoster, HttpResponse};
    use crate::delivery::types::*;
    use crate::hub::types::{Agent, RemoteFile, Schedule, ScheduleRunCommand};
    use crate::hub::Scheduler;
    use crate::workspace::{input_files_prefix, InputFile};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    // --- Fakes ---

    struct FakeHub {
        execution: Mutex<AgentExecution>,
        agent: Agent,
        updates: Mutex<Vec<ExecutionState>>,
        agent_fetches: Mutex<usize>,
        /// State the reviewer moves the execution to while we wait.
        review_result: Option<ExecutionState>,
        /// Ignore writes and keep returning the old state.
        stale_writes: bool,
    }

    impl FakeHub {
        fn new(state: ExecutionState, destinations: Vec<Destination>) -> Self {
            let agent_id = Uuid::new_v4();
            let workspace_id = Uuid::new_v4();
            Self {
                execution: Mutex::new(AgentExecution {
                    id: Uuid::new_v4(),
                    agent_id,
                    workspace_id,
                    state,
                    created_at: None,
                    updated_at: None,
                }),
                agent: Agent {
                    id: agent_id,
                    workspace_id,
                    name: Some("invoices".to_string()),
                    data_schema: json!({"type": "object", "properties": {"total": {"type": "number"}}}),
                    data_destinations: destinations,
                },
                updates: Mutex::new(Vec::new()),
                agent_fetches: Mutex::new(0),
                review_result: None,
                stale_writes: false,
            }
        }

        fn execution(&self) -> AgentExecution {
            self.execution.lock().unwrap().clone()
        }

        fn updates(&self) -> Vec<ExecutionState> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Hub for FakeHub {
        async fn get_execution(&self, _execution_id: Uuid) -> Result<AgentExecution> {
            Ok(self.execution())
        }

        async fn update_execution_state(
            &self,
            _execution_id: Uuid,
            state: &ExecutionState,
        ) -> Result<AgentExecution> {
            self.updates.lock().unwrap().push(state.clone());
            let mut execution = self.execution.lock().unwrap();
            if !self.stale_writes {
                execution.state = state.clone();
            }
            Ok(execution.clone())
        }

        async fn get_agent(&self, _agent_id: Uuid) -> Result<Agent> {
            *self.agent_fetches.lock().unwrap() += 1;
            Ok(self.agent.clone())
        }

        async fn wait_for_status(
            &self,
            _execution_id: Uuid,
            _targets: &[ExecutionStatus],
        ) -> Result<AgentExecution> {
            let mut execution = self.execution.lock().unwrap();
            if let Some(state) = &self.review_result {
                execution.state = state.clone();
            }
            Ok(execution.clone())
        }
    }

    struct FakeFiles {
        files: BTreeMap<String, Vec<u8>>,
    }

    impl FakeFiles {
        fn for_execution(execution: &AgentExecution) -> Self {
            let prefix = input_files_prefix(execution.workspace_id, execution.id);
            let mut files = BTreeMap::new();
            files.insert(format!("{prefix}invoice.txt"), b"Total: 42".to_vec());
            Self { files }
        }

        fn empty() -> Self {
            Self {
                files: BTreeMap::new(),
            }
        }
    }

    #[async_trait]
    impl FileSource for FakeFiles {
        async fn list_files(&self, prefix: &str) -> Result<Vec<RemoteFile>> {
            Ok(self
                .files
                .keys()
                .filter(|p| p.starts_with(prefix))
                .map(|p| RemoteFile {
                    path: p.clone(),
                    size: None,
                })
                .collect())
        }

        async fn download_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| AppError::Download(path.to_string()))
        }
    }

    struct FakeExtractor {
        result: std::result::Result<Value, String>,
        seen: Mutex<Vec<Vec<InputFile>>>,
    }

    impl FakeExtractor {
        fn returning(value: Value) -> Self {
            Self {
                result: Ok(value),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract(&self, files: &[InputFile], _data_schema: &Value) -> Result<StructuredRecord> {
            self.seen.lock().unwrap().push(files.to_vec());
            self.result.clone().map_err(AppError::Extraction)
        }
    }

    #[derive(Default)]
    struct FakeScheduler {
        commands: Mutex<Vec<ScheduleRunCommand>>,
    }

    #[async_trait]
    impl Scheduler for FakeScheduler {
        async fn schedule_run(&self, command: &ScheduleRunCommand) -> Result<Schedule> {
            let mut commands = self.commands.lock().unwrap();
            commands.push(command.clone());
            Ok(Schedule {
                id: format!("sched-{}", commands.len()),
            })
        }
    }

    #[derive(Default)]
    struct TimeoutPoster {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl HttpPoster for TimeoutPoster {
        async fn post_json(
            &self,
            _url: &str,
            _headers: &BTreeMap<String, String>,
            _body: &Value,
        ) -> Result<HttpResponse> {
            *self.calls.lock().unwrap() += 1;
            Err(AppError::Delivery("timeout".to_string()))
        }
    }

    struct Harness {
        hub: Arc<FakeHub>,
        extractor: Arc<FakeExtractor>,
        scheduler: Arc<FakeScheduler>,
        poster: Arc<TimeoutPoster>,
        runner: Runner,
        _base: tempfile::TempDir,
    }

    fn harness(hub: FakeHub, files: Option<FakeFiles>, extractor: FakeExtractor, mode: RunMode) -> Harness {
        let files = files.unwrap_or_else(|| FakeFiles::for_execution(&hub.execution()));
        let hub = Arc::new(hub);
        let extractor = Arc::new(extractor);
        let scheduler = Arc::new(FakeScheduler::default());
        let poster = Arc::new(TimeoutPoster::default());
        let base = tempfile::tempdir().unwrap();

        let deliverer = Arc::new(Deliverer::new(scheduler.clone(), poster.clone()));
        let runner = Runner::new(
            hub.clone(),
            Arc::new(files),
            extractor.clone(),
            deliverer,
            WorkspaceManager::new(&WorkspaceConfig {
                base_dir: base.path().to_path_buf(),
            }),
        )
        .with_mode(mode);

        Harness {
            hub,
            extractor,
            scheduler,
            poster,
            runner,
            _base: base,
        }
    }

    fn workflow_and_webhook() -> Vec<Destination> {
        vec![
            Destination::Workflow(WorkflowDestination {
                host: "h".to_string(),
                workflows: ["w1".to_string()].into_iter().collect(),
                runner_tags: Default::default(),
            }),
            Destination::Webhook(WebhookDestination {
                url: "http://example/hook".to_string(),
                headers: BTreeMap::new(),
            }),
        ]
    }

    // --- Tests ---

    #[tokio::test]
    async fn test_extraction_moves_to_pending_review() {
        let h = harness(
            FakeHub::new(ExecutionState::PendingDataExtraction, vec![]),
            None,
            FakeExtractor::returning(json!({"total": 42})),
            RunMode::OneShot,
        );
        let id = h.hub.execution().id;

        let outcome = h.runner.run_once(id).await.unwrap();

        assert_eq!(outcome, RunOutcome::AwaitingReview);
        assert_eq!(
            h.hub.updates(),
            vec![ExecutionState::PendingReview {
                data_extracted: json!({"total": 42})
            }]
        );
        let seen = h.extractor.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 1);
        assert_eq!(seen[0][0].name, "invoice.txt");
    }

    #[tokio::test]
    async fn test_confirmed_delivers_with_partial_failure() {
        let h = harness(
            FakeHub::new(
                ExecutionState::Confirmed {
                    data_confirmed: json!({"x": 1}),
                },
                workflow_and_webhook(),
            ),
            None,
            FakeExtractor::failing("unused"),
            RunMode::OneShot,
        );
        let id = h.hub.execution().id;

        let outcome = h.runner.run_once(id).await.unwrap();

        let expected = vec![
            DeliveryResult::Workflow {
                schedule_id: "sched-1".to_string(),
            },
            DeliveryResult::failed(DestinationType::Webhook, "timeout"),
        ];
        assert_eq!(
            h.hub.updates(),
            vec![ExecutionState::DeliveredToDestination {
                deliveries: expected.clone()
            }]
        );
        assert_eq!(outcome, RunOutcome::Delivered { deliveries: expected });

        let commands = h.scheduler.commands.lock().unwrap();
        assert_eq!(commands[0].host, "h");
        assert_eq!(commands[0].data, json!({"x": 1}));
        assert_eq!(h.extractor.calls(), 0);
    }

    #[tokio::test]
    async fn test_delivered_execution_is_idempotent() {
        let h = harness(
            FakeHub::new(
                ExecutionState::DeliveredToDestination { deliveries: vec![] },
                workflow_and_webhook(),
            ),
            None,
            FakeExtractor::failing("unused"),
            RunMode::Wait,
        );
        let id = h.hub.execution().id;

        for _ in 0..2 {
            let outcome = h.runner.run_once(id).await.unwrap();
            assert_eq!(outcome, RunOutcome::Delivered { deliveries: vec![] });
        }

        assert!(h.hub.updates().is_empty());
        assert_eq!(*h.hub.agent_fetches.lock().unwrap(), 0);
        assert!(h.scheduler.commands.lock().unwrap().is_empty());
        assert_eq!(*h.poster.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_second_run_after_delivery_does_nothing() {
        let h = harness(
            FakeHub::new(
                ExecutionState::Confirmed {
                    data_confirmed: json!({"x": 1}),
                },
                workflow_and_webhook(),
            ),
            None,
            FakeExtractor::failing("unused"),
            RunMode::OneShot,
        );
        let id = h.hub.execution().id;

        h.runner.run_once(id).await.unwrap();
        h.runner.run_once(id).await.unwrap();

        assert_eq!(h.hub.updates().len(), 1);
        assert_eq!(h.scheduler.commands.lock().unwrap().len(), 1);
        assert_eq!(*h.poster.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_canceled_ends_without_side_effects() {
        let h = harness(
            FakeHub::new(ExecutionState::Canceled, workflow_and_webhook()),
            None,
            FakeExtractor::failing("unused"),
            RunMode::Wait,
        );
        let id = h.hub.execution().id;

        assert_eq!(h.runner.run_once(id).await.unwrap(), RunOutcome::Canceled);
        assert!(h.hub.updates().is_empty());
        assert_eq!(*h.hub.agent_fetches.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wait_mode_runs_full_pipeline() {
        let mut hub = FakeHub::new(ExecutionState::PendingDataExtraction, workflow_and_webhook());
        // Reviewer corrects the extracted total before confirming.
        hub.review_result = Some(ExecutionState::Confirmed {
            data_confirmed: json!({"total": 43}),
        });
        let h = harness(
            hub,
            None,
            FakeExtractor::returning(json!({"total": 42})),
            RunMode::Wait,
        );
        let id = h.hub.execution().id;

        let outcome = h.runner.run_once(id).await.unwrap();

        let updates = h.hub.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].status(), ExecutionStatus::PendingReview);
        assert_eq!(updates[1].status(), ExecutionStatus::DeliveredToDestination);
        assert!(matches!(outcome, RunOutcome::Delivered { ref deliveries } if deliveries.len() == 2));
        assert_eq!(
            h.scheduler.commands.lock().unwrap()[0].data,
            json!({"total": 43})
        );
        // Agent fetched once for the schema and again before delivery.
        assert_eq!(*h.hub.agent_fetches.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_wait_mode_observes_cancellation() {
        let mut hub = FakeHub::new(
            ExecutionState::PendingReview {
                data_extracted: json!({}),
            },
            workflow_and_webhook(),
        );
        hub.review_result = Some(ExecutionState::Canceled);
        let h = harness(hub, None, FakeExtractor::failing("unused"), RunMode::Wait);
        let id = h.hub.execution().id;

        assert_eq!(h.runner.run_once(id).await.unwrap(), RunOutcome::Canceled);
        assert!(h.hub.updates().is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_halts_run() {
        let h = harness(
            FakeHub::new(ExecutionState::PendingDataExtraction, vec![]),
            None,
            FakeExtractor::failing("model unavailable"),
            RunMode::OneShot,
        );
        let id = h.hub.execution().id;

        let err = h.runner.run_once(id).await.unwrap_err();

        assert!(matches!(err, AppError::Extraction(ref m) if m == "model unavailable"));
        assert!(h.hub.updates().is_empty());
    }

    #[tokio::test]
    async fn test_download_failure_halts_run() {
        let h = harness(
            FakeHub::new(ExecutionState::PendingDataExtraction, vec![]),
            Some(FakeFiles::empty()),
            FakeExtractor::returning(json!({})),
            RunMode::OneShot,
        );
        let id = h.hub.execution().id;

        let err = h.runner.run_once(id).await.unwrap_err();

        assert!(matches!(err, AppError::Download(_)));
        assert_eq!(h.extractor.calls(), 0);
        assert!(h.hub.updates().is_empty());
    }

    #[tokio::test]
    async fn test_state_that_does_not_advance_is_rejected() {
        let mut hub = FakeHub::new(ExecutionState::PendingDataExtraction, vec![]);
        hub.stale_writes = true;
        let h = harness(
            hub,
            None,
            FakeExtractor::returning(json!({"total": 42})),
            RunMode::OneShot,
        );
        let id = h.hub.execution().id;

        let err = h.runner.run_once(id).await.unwrap_err();

        assert!(matches!(err, AppError::Hub(_)));
        assert_eq!(h.extractor.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejects_execution_of_other_agent() {
        let Harness {
            hub, runner, _base, ..
        } = harness(
            FakeHub::new(ExecutionState::PendingDataExtraction, vec![]),
            None,
            FakeExtractor::returning(json!({})),
            RunMode::OneShot,
        );
        let runner = runner.with_expected_agent(Uuid::new_v4());

        let err = runner.run_once(hub.execution().id).await.unwrap_err();

        assert!(matches!(err, AppError::Config(_)));
        assert!(hub.updates().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_execution_of_other_workspace() {
        let Harness {
            hub,
            extractor,
            runner,
            _base,
            ..
        } = harness(
            FakeHub::new(ExecutionState::PendingDataExtraction, vec![]),
            None,
            FakeExtractor::returning(json!({})),
            RunMode::OneShot,
        );
        let execution = hub.execution();
        let runner = runner
            .with_expected_agent(execution.agent_id)
            .with_expected_workspace(Uuid::new_v4());

        let err = runner.run_once(execution.id).await.unwrap_err();

        assert!(matches!(err, AppError::Config(ref m) if m.contains("workspace")));
        assert!(hub.updates().is_empty());
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn test_matching_agent_and_workspace_runs() {
        let Harness {
            hub, runner, _base, ..
        } = harness(
            FakeHub::new(ExecutionState::PendingDataExtraction, vec![]),
            None,
            FakeExtractor::returning(json!({"total": 1})),
            RunMode::OneShot,
        );
        let execution = hub.execution();
        let runner = runner
            .with_expected_agent(execution.agent_id)
            .with_expected_workspace(execution.workspace_id);

        let outcome = runner.run_once(execution.id).await.unwrap();

        assert_eq!(outcome, RunOutcome::AwaitingReview);
        assert_eq!(hub.updates().len(), 1);
    }
}
