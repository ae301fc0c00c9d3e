//! Participant steps
//!
//! Each participant reads the whole conversation state and returns either a
//! delta or a `StepFailure`. Nothing here mutates state or raises past the
//! step boundary.

mod observer;
pub mod parse;
mod prompts;
pub mod render;
mod student;
mod teacher;

pub use observer::ObserverAgent;
pub use student::StudentAgent;
pub use teacher::TeacherAgent;

use crate::config::{GenerationSettings, OrchestratorConfig};
use crate::llm::{LlmRequest, LlmService, ModelRegistry, SystemContent};
use crate::state_machine::{ConversationState, MessageMeta, Participant, StepFailure};
use crate::state_machine::StepDelta;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// A single step of one role
#[async_trait]
pub trait ParticipantAgent: Send + Sync {
    fn participant(&self) -> Participant;

    async fn respond(&self, state: &ConversationState) -> Result<StepDelta, StepFailure>;
}

/// Text returned by a collaborator, with its call metadata
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub meta: MessageMeta,
}

/// A collaborator bound to one role and one document
pub struct RoleClient {
    llm: Arc<dyn LlmService>,
    system: Vec<SystemContent>,
    settings: GenerationSettings,
}

impl RoleClient {
    pub fn new(
        llm: Arc<dyn LlmService>,
        role_prompt: &str,
        document_text: &str,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            llm,
            system: vec![
                SystemContent::new(role_prompt),
                SystemContent::cached(render::document_block(document_text)),
            ],
            settings,
        }
    }

    pub fn model_id(&self) -> &str {
        self.llm.model_id()
    }

    /// One request/response exchange; failures and timeouts are generation failures
    pub async fn ask(&self, prompt: String) -> Result<Reply, StepFailure> {
        let request = LlmRequest {
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            ..LlmRequest::user(self.system.clone(), prompt)
        };

        let start = Instant::now();
        let response = tokio::time::timeout(self.settings.step_timeout, self.llm.complete(&request))
            .await
            .map_err(|_| {
                StepFailure::generation(format!(
                    "{} did not answer within {}s",
                    self.model_id(),
                    self.settings.step_timeout.as_secs()
                ))
            })?
            .map_err(|e| StepFailure::generation(format!("{}: {e}", self.model_id())))?;

        let text = response.text().trim().to_string();
        if text.is_empty() {
            return Err(StepFailure::generation(format!(
                "{} returned an empty response",
                self.model_id()
            )));
        }

        Ok(Reply {
            text,
            meta: MessageMeta {
                model_id: Some(self.model_id().to_string()),
                usage: Some(response.usage),
                duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
            },
        })
    }
}

/// The three participants of one run
pub struct Cast {
    pub student: Arc<dyn ParticipantAgent>,
    pub teacher: Arc<dyn ParticipantAgent>,
    pub observer: Arc<dyn ParticipantAgent>,
}

impl Cast {
    /// Bind one collaborator per role to the document
    pub fn bind(
        student_llm: Arc<dyn LlmService>,
        teacher_llm: Arc<dyn LlmService>,
        observer_llm: Arc<dyn LlmService>,
        config: &OrchestratorConfig,
        document_text: &str,
    ) -> Self {
        let settings = config.generation;
        Self {
            student: Arc::new(StudentAgent::new(
                RoleClient::new(student_llm, prompts::STUDENT_ROLE, document_text, settings),
                config.first_batch_size,
                config.follow_up_batch_size,
            )),
            teacher: Arc::new(TeacherAgent::new(RoleClient::new(
                teacher_llm,
                prompts::TEACHER_ROLE,
                document_text,
                settings,
            ))),
            observer: Arc::new(ObserverAgent::new(RoleClient::new(
                observer_llm,
                prompts::OBSERVER_ROLE,
                document_text,
                settings,
            ))),
        }
    }

    /// Resolve each role's model from the registry and bind it
    pub fn assemble(
        registry: &ModelRegistry,
        config: &OrchestratorConfig,
        document_text: &str,
    ) -> Result<Self, StepFailure> {
        let resolve = |participant: Participant, model: Option<&str>| {
            registry.resolve(model).ok_or_else(|| {
                StepFailure::setup(format!(
                    "no language model available for the {participant}; configure an API key or LLM_GATEWAY"
                ))
            })
        };

        let student = resolve(Participant::Student, config.models.student.as_deref())?;
        let teacher = resolve(Participant::Teacher, config.models.teacher.as_deref())?;
        let observer = resolve(Participant::Observer, config.models.observer.as_deref())?;

        tracing::info!(
            student = student.model_id(),
            teacher = teacher.model_id(),
            observer = observer.model_id(),
            "Participants bound"
        );
        Ok(Self::bind(student, teacher, observer, config, document_text))
    }

    pub fn agent(&self, participant: Participant) -> &Arc<dyn ParticipantAgent> {
        match participant {
            Participant::Student => &self.student,
            Participant::Teacher => &self.teacher,
            Participant::Observer => &self.observer,
        }
    }
}
