//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{Orchestrator, RunManager, SharedOrchestrator};
use crate::checkpoint::Checkpoint;
use crate::config::OrchestratorConfig;
use crate::db::{RunRecord, RunStatus};
use crate::document::DocumentError;
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::participant::Cast;
use crate::state_machine::{Limits, RunContext, StepFailure};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Delay applied before every response
    delay: Option<Duration>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful text response
    pub fn queue_text(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(LlmResponse::from_text(text)));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::transport("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Document Source
// ============================================================================

/// Document source serving fixed texts by reference
#[derive(Default)]
pub struct MockDocumentSource {
    documents: HashMap<String, String>,
    /// Record of fetched references
    pub fetches: Mutex<Vec<String>>,
}

impl MockDocumentSource {
    pub fn with_document(mut self, reference: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.insert(reference.into(), text.into());
        self
    }

    pub fn recorded_fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentSource for MockDocumentSource {
    async fn fetch_text(&self, reference: &str) -> Result<String, DocumentError> {
        self.fetches.lock().unwrap().push(reference.to_string());
        self.documents
            .get(reference)
            .cloned()
            .ok_or_else(|| DocumentError::Fetch {
                reference: reference.to_string(),
                message: "not found".to_string(),
            })
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// In-memory run registry and checkpoint sequence
#[derive(Default)]
pub struct InMemoryStorage {
    runs: Mutex<HashMap<String, RunRecord>>,
    checkpoints: Mutex<Vec<Checkpoint>>,
    fail_checkpoints: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent checkpoint write fail
    pub fn fail_checkpoints(&self) {
        self.fail_checkpoints.store(true, Ordering::SeqCst);
    }

    pub fn checkpoints_for(&self, run_id: &str) -> Vec<Checkpoint> {
        self.checkpoints
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Count derived from stored checkpoints, as the database does
    fn with_checkpoint_count(&self, record: RunRecord) -> RunRecord {
        let count = u32::try_from(self.checkpoints_for(&record.id).len()).unwrap();
        RunRecord {
            checkpoint_count: count,
            ..record
        }
    }

    pub fn status_of(&self, run_id: &str) -> Option<RunStatus> {
        self.runs.lock().unwrap().get(run_id).map(|r| r.status)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), String> {
        if self.fail_checkpoints.load(Ordering::SeqCst) {
            return Err("disk full".to_string());
        }
        let mut checkpoints = self.checkpoints.lock().unwrap();
        if checkpoints
            .iter()
            .any(|c| c.run_id == checkpoint.run_id && c.sequence == checkpoint.sequence)
        {
            return Err(format!(
                "Checkpoint {} already exists for run {}",
                checkpoint.sequence, checkpoint.run_id
            ));
        }
        checkpoints.push(checkpoint.clone());
        Ok(())
    }

    async fn list_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, String> {
        let mut checkpoints = self.checkpoints_for(run_id);
        checkpoints.sort_by_key(|c| c.sequence);
        Ok(checkpoints)
    }

    async fn latest_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, String> {
        Ok(self
            .checkpoints_for(run_id)
            .into_iter()
            .max_by_key(|c| c.sequence))
    }
}

#[async_trait]
impl RunStore for InMemoryStorage {
    async fn create_run(&self, run_id: &str, source_ref: &str) -> Result<RunRecord, String> {
        let now = Utc::now();
        let record = RunRecord {
            id: run_id.to_string(),
            source_ref: source_ref.to_string(),
            status: RunStatus::Running,
            error: None,
            created_at: now,
            updated_at: now,
            checkpoint_count: 0,
        };
        self.runs
            .lock()
            .unwrap()
            .insert(run_id.to_string(), record.clone());
        Ok(record)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, String> {
        let record = self.runs.lock().unwrap().get(run_id).cloned();
        Ok(record.map(|r| self.with_checkpoint_count(r)))
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, String> {
        let records: Vec<RunRecord> = self.runs.lock().unwrap().values().cloned().collect();
        let mut runs: Vec<RunRecord> = records
            .into_iter()
            .map(|r| self.with_checkpoint_count(r))
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn set_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), String> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| format!("Run not found: {run_id}"))?;
        run.status = status;
        run.error = error.map(str::to_string);
        run.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// Mock Cast Factory
// ============================================================================

/// Binds one mock collaborator per role
pub struct MockCastFactory {
    pub student: Arc<MockLlmService>,
    pub teacher: Arc<MockLlmService>,
    pub observer: Arc<MockLlmService>,
    config: OrchestratorConfig,
    setup_error: Option<String>,
    /// Number of successful `assemble` calls
    pub assembled: AtomicUsize,
}

impl MockCastFactory {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            student: Arc::new(MockLlmService::new("student-model")),
            teacher: Arc::new(MockLlmService::new("teacher-model")),
            observer: Arc::new(MockLlmService::new("observer-model")),
            config,
            setup_error: None,
            assembled: AtomicUsize::new(0),
        }
    }

    /// Replace the teacher collaborator
    pub fn with_teacher(mut self, teacher: MockLlmService) -> Self {
        self.teacher = Arc::new(teacher);
        self
    }

    /// Fail every `assemble` call with a setup failure
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.setup_error = Some(message.into());
        self
    }
}

impl CastFactory for MockCastFactory {
    fn assemble(&self, document_text: &str) -> Result<Cast, StepFailure> {
        if let Some(message) = &self.setup_error {
            return Err(StepFailure::setup(message.clone()));
        }
        self.assembled.fetch_add(1, Ordering::SeqCst);
        Ok(Cast::bind(
            self.student.clone(),
            self.teacher.clone(),
            self.observer.clone(),
            &self.config,
            document_text,
        ))
    }
}

// ============================================================================
// Test Harness
// ============================================================================

pub const PAPER_REF: &str = "papers/attention.md";
pub const PAPER: &str = "# Attention Is All You Need\n\nThe Transformer relies entirely on attention.";

pub const OPENING: &str = r#"[
  {"title": "Architecture", "prompt": "Why drop recurrence?", "category": "method"},
  {"title": "Data", "prompt": "Which corpora were used?", "category": "data"}
]"#;
pub const FOLLOW_UP: &str = r#"["How is position encoded?", "What does multi-head add?"]"#;
pub const ANSWERS: &str =
    r#"[{"question": "Why drop recurrence?", "answer": "Attention parallelizes across positions."}]"#;
pub const INSTRUCTIONS: &str =
    "<Instructions><Student>Probe the ablations.</Student><Teacher>Quote section 3.</Teacher></Instructions>";

/// Shared mocks wired the way `RunManager` wires production collaborators
pub struct TestHarness {
    pub storage: Arc<InMemoryStorage>,
    pub documents: Arc<MockDocumentSource>,
    pub cast: Arc<MockCastFactory>,
    pub limits: Limits,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_cast(MockCastFactory::new(OrchestratorConfig::default()))
    }

    pub fn with_cast(cast: MockCastFactory) -> Self {
        Self {
            storage: Arc::new(InMemoryStorage::new()),
            documents: Arc::new(MockDocumentSource::default().with_document(PAPER_REF, PAPER)),
            cast: Arc::new(cast),
            limits: Limits::default(),
        }
    }

    /// Register a run and build its orchestrator
    pub async fn orchestrator(&self, run_id: &str, source_ref: &str) -> SharedOrchestrator {
        self.storage.create_run(run_id, source_ref).await.unwrap();
        Orchestrator::new(
            RunContext::new(run_id, self.limits),
            source_ref,
            self.storage.clone(),
            self.documents.clone(),
            self.cast.clone(),
        )
    }

    pub fn manager(&self) -> RunManager {
        RunManager::new(
            self.storage.clone(),
            self.documents.clone(),
            self.cast.clone(),
            self.limits,
        )
    }

    /// Queue every collaborator response of a default-limits run
    pub fn script_full_run(&self) {
        self.cast.student.queue_text(OPENING);
        self.script_after_opening();
    }

    /// Queue the responses that follow the opening batch
    pub fn script_after_opening(&self) {
        for _ in 0..3 {
            self.cast.student.queue_text(FOLLOW_UP);
            self.cast.teacher.queue_text(ANSWERS);
            self.cast.observer.queue_text(INSTRUCTIONS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::capture;
    use crate::runtime::{RunError, StreamItem};
    use crate::state_machine::{
        ConversationState, Participant, Phase, QuestionBatch, RunOutcome, StepDelta,
    };
    use tokio_util::sync::CancellationToken;

    const K3_N9_ORDER: [Participant; 10] = [
        Participant::Student,
        Participant::Teacher,
        Participant::Student,
        Participant::Observer,
        Participant::Student,
        Participant::Teacher,
        Participant::Observer,
        Participant::Student,
        Participant::Teacher,
        Participant::Observer,
    ];

    #[tokio::test]
    async fn test_mock_llm_service() {
        let llm = MockLlmService::new("m");
        llm.queue_text("hello");

        let request = LlmRequest::user(vec![], "hi");
        let response = llm.complete(&request).await.unwrap();
        assert_eq!(response.text(), "hello");
        assert_eq!(llm.recorded_requests().len(), 1);

        let err = llm.complete(&request).await.unwrap_err();
        assert!(err.message.contains("No mock response queued"));
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryStorage::new();
        storage.create_run("r1", "doc").await.unwrap();

        let checkpoint = Checkpoint {
            run_id: "r1".to_string(),
            sequence: 0,
            produced_by: Phase::Init,
            next_phase: Phase::Student,
            snapshot: capture(&ConversationState::new()),
            created_at: Utc::now(),
        };
        storage.save_checkpoint(&checkpoint).await.unwrap();
        assert!(storage.save_checkpoint(&checkpoint).await.is_err());

        let run = storage.get_run("r1").await.unwrap().unwrap();
        assert_eq!(run.checkpoint_count, 1);
        let runs = storage.list_runs().await.unwrap();
        assert_eq!(runs[0].checkpoint_count, 1);
        assert!(storage.set_status("missing", RunStatus::Failed, None).await.is_err());
    }

    #[tokio::test]
    async fn test_full_run_follows_observer_cadence() {
        let harness = TestHarness::new();
        harness.script_full_run();

        let report = harness.orchestrator("run-1", PAPER_REF).await.run().await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.phase, Phase::Terminal);
        let state = &report.state;
        assert_eq!(state.turn_count(), 10);
        assert!(state.error().is_none());
        assert_eq!(state.document_text(), Some(PAPER));
        let authors: Vec<Participant> = state.messages().iter().map(|m| m.author).collect();
        assert_eq!(authors, K3_N9_ORDER);
        let turns: Vec<u32> = state.messages().iter().map(|m| m.turn).collect();
        assert_eq!(turns, (1..=10).collect::<Vec<_>>());
        assert_eq!(state.insights().len(), 3);
        assert_eq!(state.questions().len(), 4);
        assert!(matches!(state.questions()[0], QuestionBatch::Opening { .. }));

        // One checkpoint for Init plus one per step
        let checkpoints = harness.storage.checkpoints_for("run-1");
        let sequences: Vec<u32> = checkpoints.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, (0..=10).collect::<Vec<_>>());
        assert_eq!(checkpoints[0].produced_by, Phase::Init);
        assert_eq!(checkpoints[0].next_phase, Phase::Student);
        assert_eq!(checkpoints[10].next_phase, Phase::Terminal);
        assert_eq!(checkpoints[10].snapshot.turn_count, 10);

        assert_eq!(harness.storage.status_of("run-1"), Some(RunStatus::Completed));
        assert_eq!(harness.documents.recorded_fetches(), vec![PAPER_REF.to_string()]);
        assert_eq!(harness.cast.assembled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observer_every_turn_completes_without_teacher() {
        let mut harness = TestHarness::new();
        harness.limits = Limits::new(1, 9).unwrap();
        harness.cast.student.queue_text(OPENING);
        for _ in 0..4 {
            harness.cast.student.queue_text(FOLLOW_UP);
        }
        for _ in 0..5 {
            harness.cast.observer.queue_text(INSTRUCTIONS);
        }

        let report = harness.orchestrator("run-1", PAPER_REF).await.run().await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        let state = &report.state;
        assert_eq!(state.turn_count(), 10);
        let authors: Vec<Participant> = state.messages().iter().map(|m| m.author).collect();
        let expected: Vec<Participant> = [Participant::Student, Participant::Observer]
            .into_iter()
            .cycle()
            .take(10)
            .collect();
        assert_eq!(authors, expected);
        assert_eq!(state.insights().len(), 5);
        assert!(harness.cast.teacher.recorded_requests().is_empty());

        // Follow-ups build on the previous batch
        let student_requests = harness.cast.student.recorded_requests();
        assert_eq!(student_requests.len(), 5);
        assert!(student_requests[1].messages[0]
            .text
            .contains("<Question>Why drop recurrence?</Question>"));
        assert_eq!(harness.storage.status_of("run-1"), Some(RunStatus::Completed));
    }

    #[tokio::test]
    async fn test_insights_reach_later_prompts() {
        let harness = TestHarness::new();
        harness.script_full_run();

        harness.orchestrator("run-1", PAPER_REF).await.run().await;

        let student_requests = harness.cast.student.recorded_requests();
        assert_eq!(student_requests.len(), 4);
        // Follow-up before the first observer step has no insights
        assert!(!student_requests[1].messages[0].text.contains("Probe the ablations"));
        assert!(student_requests[2].messages[0].text.contains("Probe the ablations"));

        let teacher_requests = harness.cast.teacher.recorded_requests();
        assert_eq!(teacher_requests.len(), 3);
        assert!(teacher_requests[0].system[1].text.contains("Transformer"));
        assert!(teacher_requests[1].messages[0].text.contains("Probe the ablations"));
    }

    #[tokio::test]
    async fn test_unparseable_first_batch_stops_run() {
        let harness = TestHarness::new();
        harness.cast.student.queue_text("Here are some questions you might ask...");

        let report = harness.orchestrator("run-1", PAPER_REF).await.run().await;

        let RunOutcome::Failed { message } = &report.outcome else {
            panic!("expected failure, got {:?}", report.outcome);
        };
        assert!(message.contains("opening questions"));
        assert_eq!(report.state.turn_count(), 0);
        assert!(report.state.messages().is_empty());
        assert_eq!(report.state.error(), Some(message.as_str()));
        assert!(harness.cast.teacher.recorded_requests().is_empty());
        assert!(harness.cast.observer.recorded_requests().is_empty());

        let checkpoints = harness.storage.checkpoints_for("run-1");
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[1].produced_by, Phase::Student);
        assert_eq!(checkpoints[1].next_phase, Phase::Terminal);
        assert!(checkpoints[1].snapshot.error.is_some());
        assert_eq!(harness.storage.status_of("run-1"), Some(RunStatus::Failed));
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_committed_steps() {
        let harness = TestHarness::new();
        harness.cast.student.queue_text(OPENING);
        harness
            .cast
            .teacher
            .queue_error(LlmError::provider("overloaded"));

        let report = harness.orchestrator("run-1", PAPER_REF).await.run().await;

        assert!(matches!(report.outcome, RunOutcome::Failed { .. }));
        assert_eq!(report.state.turn_count(), 1);
        assert!(report.state.error().unwrap().contains("overloaded"));
        assert!(harness.cast.observer.recorded_requests().is_empty());

        let run = harness.storage.get_run("run-1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_missing_document_is_setup_failure() {
        let harness = TestHarness::new();

        let report = harness.orchestrator("run-1", "missing.md").await.run().await;

        let RunOutcome::Failed { message } = &report.outcome else {
            panic!("expected failure");
        };
        assert!(message.starts_with("setup failed"));
        assert!(message.contains("missing.md"));
        assert!(report.state.messages().is_empty());
        assert!(report.state.document_text().is_none());
        assert!(harness.cast.student.recorded_requests().is_empty());
        assert_eq!(harness.storage.status_of("run-1"), Some(RunStatus::Failed));
    }

    #[tokio::test]
    async fn test_unbindable_cast_is_setup_failure() {
        let harness = TestHarness::with_cast(
            MockCastFactory::new(OrchestratorConfig::default()).failing("no language model"),
        );

        let report = harness.orchestrator("run-1", PAPER_REF).await.run().await;

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                message: "setup failed: no language model".to_string()
            }
        );
        assert!(report.state.document_text().is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let harness = TestHarness::new();
        harness.script_full_run();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = harness
            .orchestrator("run-1", PAPER_REF)
            .await
            .with_cancel(cancel)
            .run()
            .await;

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert!(report.state.error().is_none());
        assert!(harness.documents.recorded_fetches().is_empty());
        assert!(harness.storage.checkpoints_for("run-1").is_empty());
        assert_eq!(harness.storage.status_of("run-1"), Some(RunStatus::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_in_flight_step() {
        let cast = MockCastFactory::new(OrchestratorConfig::default())
            .with_teacher(MockLlmService::new("slow-teacher").with_delay(Duration::from_secs(60)));
        let harness = TestHarness::with_cast(cast);
        harness.script_full_run();

        let cancel = CancellationToken::new();
        let orchestrator = harness
            .orchestrator("run-1", PAPER_REF)
            .await
            .with_cancel(cancel.clone());
        let task = tokio::spawn(orchestrator.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let report = task.await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.state.turn_count(), 1);
        assert!(report.state.error().is_none());
        assert_eq!(harness.cast.teacher.recorded_requests().len(), 1);
        // Init and the student step only
        assert_eq!(harness.storage.checkpoints_for("run-1").len(), 2);
        assert_eq!(harness.storage.status_of("run-1"), Some(RunStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_storage_failure_fails_run() {
        let harness = TestHarness::new();
        harness.script_full_run();
        harness.storage.fail_checkpoints();

        let report = harness.orchestrator("run-1", PAPER_REF).await.run().await;

        let RunOutcome::Failed { message } = &report.outcome else {
            panic!("expected failure");
        };
        assert!(message.contains("disk full"));
        assert!(harness.cast.student.recorded_requests().is_empty());
        assert_eq!(harness.storage.status_of("run-1"), Some(RunStatus::Failed));
    }

    #[tokio::test]
    async fn test_stream_delivers_fragments_in_step_order() {
        let harness = TestHarness::new();
        harness.script_full_run();
        let manager = harness.manager();

        let (run_id, mut rx) = manager.run_streaming(PAPER_REF).await.unwrap();
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }

        let participants: Vec<Participant> = items
            .iter()
            .map(|item| match item {
                StreamItem::Fragment { participant, .. } => *participant,
                StreamItem::Failed { message } => panic!("unexpected failure: {message}"),
            })
            .collect();
        assert_eq!(participants, K3_N9_ORDER);
        assert!(matches!(
            &items[0],
            StreamItem::Fragment { content, .. } if content.contains("Why drop recurrence?")
        ));

        // The channel closes only after the task finished
        let run = manager.get_run(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.checkpoint_count, 11);
    }

    #[tokio::test]
    async fn test_stream_ends_with_error_on_failure() {
        let harness = TestHarness::new();
        harness.cast.student.queue_text(OPENING);
        harness.cast.teacher.queue_text("not json");
        let manager = harness.manager();

        let (_, mut rx) = manager.run_streaming(PAPER_REF).await.unwrap();
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }

        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[0],
            StreamItem::Fragment {
                participant: Participant::Student,
                ..
            }
        ));
        let StreamItem::Failed { message } = &items[1] else {
            panic!("expected error item last");
        };
        assert!(message.contains("answers"));
    }

    #[tokio::test]
    async fn test_dropped_stream_cancels_run() {
        let harness = TestHarness::new();
        harness.script_full_run();
        let manager = harness.manager();

        let (run_id, rx) = manager.run_streaming(PAPER_REF).await.unwrap();
        drop(rx);

        let mut status = RunStatus::Running;
        for _ in 0..200 {
            status = manager.get_run(&run_id).await.unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(status, RunStatus::Cancelled);
        assert!(harness.cast.teacher.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_batch_run_through_manager() {
        let harness = TestHarness::new();
        harness.script_full_run();
        let manager = harness.manager();

        let report = manager.run_batch(PAPER_REF).await.unwrap();
        assert!(report.outcome.is_completed());

        let runs = manager.list_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, report.run_id);
        assert_eq!(manager.checkpoints(&report.run_id).await.unwrap().len(), 11);
        assert!(!manager.cancel(&report.run_id).await);

        let err = manager.resume(&report.run_id).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::AlreadyFinished {
                status: RunStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resume_continues_interrupted_run() {
        let harness = TestHarness::new();
        let storage = &harness.storage;
        storage.create_run("run-1", PAPER_REF).await.unwrap();

        // Init and the opening batch were checkpointed before the process died
        let mut state = ConversationState::new();
        state.set_document(PAPER.to_string()).unwrap();
        let checkpoint = |sequence, produced_by, next_phase, state: &ConversationState| Checkpoint {
            run_id: "run-1".to_string(),
            sequence,
            produced_by,
            next_phase,
            snapshot: capture(state),
            created_at: Utc::now(),
        };
        storage
            .save_checkpoint(&checkpoint(0, Phase::Init, Phase::Student, &state))
            .await
            .unwrap();
        state.fold(
            Participant::Student,
            StepDelta::message("<Questions>opening</Questions>").with_questions(
                QuestionBatch::FollowUp {
                    questions: vec!["Why drop recurrence?".to_string()],
                },
            ),
        );
        storage
            .save_checkpoint(&checkpoint(1, Phase::Student, Phase::Teacher, &state))
            .await
            .unwrap();
        storage
            .set_status("run-1", RunStatus::Interrupted, None)
            .await
            .unwrap();

        harness.script_after_opening();
        let report = harness.manager().resume("run-1").await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.state.turn_count(), 10);
        assert_eq!(
            report.state.messages()[0].content,
            "<Questions>opening</Questions>"
        );
        let authors: Vec<Participant> = report.state.messages().iter().map(|m| m.author).collect();
        assert_eq!(authors, K3_N9_ORDER);

        // The document is not fetched again; participants bind from the checkpoint
        assert!(harness.documents.recorded_fetches().is_empty());
        assert_eq!(harness.cast.assembled.load(Ordering::SeqCst), 1);
        assert_eq!(harness.cast.student.recorded_requests().len(), 3);

        let sequences: Vec<u32> = storage
            .checkpoints_for("run-1")
            .iter()
            .map(|c| c.sequence)
            .collect();
        assert_eq!(sequences, (0..=10).collect::<Vec<_>>());
        assert_eq!(storage.status_of("run-1"), Some(RunStatus::Completed));
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_restarts() {
        let harness = TestHarness::new();
        harness.script_full_run();
        harness
            .storage
            .create_run("run-1", PAPER_REF)
            .await
            .unwrap();
        harness
            .storage
            .set_status("run-1", RunStatus::Interrupted, None)
            .await
            .unwrap();

        let report = harness.manager().resume("run-1").await.unwrap();
        assert!(report.outcome.is_completed());
        assert_eq!(harness.documents.recorded_fetches().len(), 1);
    }

    #[tokio::test]
    async fn test_resume_errors() {
        let harness = TestHarness::new();
        let manager = harness.manager();

        assert!(matches!(
            manager.resume("nope").await,
            Err(RunError::NotFound(_))
        ));
        assert!(!manager.cancel("nope").await);
    }

    #[tokio::test]
    async fn test_empty_opening_batch_is_parse_failure() {
        let harness = TestHarness::new();
        harness.cast.student.queue_text("[]");

        let report = harness.orchestrator("run-1", PAPER_REF).await.run().await;
        let RunOutcome::Failed { message } = report.outcome else {
            panic!("expected failure");
        };
        assert!(message.starts_with("unparseable output"));
        assert!(report.state.messages().is_empty());
    }
}
