//! Conversation state types

use crate::llm::Usage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::router::Limits;

// ============================================================================
// Participants and Phases
// ============================================================================

/// One of the three roles taking turns over the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participant {
    Student,
    Teacher,
    Observer,
}

impl Participant {
    pub fn as_str(self) -> &'static str {
        match self {
            Participant::Student => "student",
            Participant::Teacher => "teacher",
            Participant::Observer => "observer",
        }
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a run in the orchestration graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Document not loaded yet
    #[default]
    Init,
    Student,
    Teacher,
    Observer,
    /// No participant runs again
    Terminal,
}

impl Phase {
    /// The participant that runs in this phase, if any
    pub fn participant(self) -> Option<Participant> {
        match self {
            Phase::Student => Some(Participant::Student),
            Phase::Teacher => Some(Participant::Teacher),
            Phase::Observer => Some(Participant::Observer),
            Phase::Init | Phase::Terminal => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Terminal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Student => "student",
            Phase::Teacher => "teacher",
            Phase::Observer => "observer",
            Phase::Terminal => "terminal",
        }
    }
}

impl From<Participant> for Phase {
    fn from(participant: Participant) -> Self {
        match participant {
            Participant::Student => Phase::Student,
            Participant::Teacher => Phase::Teacher,
            Participant::Observer => Phase::Observer,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Phase::Init),
            "student" => Ok(Phase::Student),
            "teacher" => Ok(Phase::Teacher),
            "observer" => Ok(Phase::Observer),
            "terminal" => Ok(Phase::Terminal),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

// ============================================================================
// Messages and Question Batches
// ============================================================================

/// Per-message data that only lives in memory.
///
/// Dropped by the checkpoint projection; never persisted or streamed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMeta {
    pub model_id: Option<String>,
    pub usage: Option<Usage>,
    pub duration_ms: Option<u64>,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub author: Participant,
    pub content: String,
    /// Value of `turn_count` right after the step that produced this message
    pub turn: u32,
    pub meta: MessageMeta,
}

/// Item of the Student's opening batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuestion {
    pub title: String,
    pub prompt: String,
    pub category: String,
}

/// A batch of questions posed by the Student in one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionBatch {
    /// First batch, generated from the whole document
    Opening { questions: Vec<StructuredQuestion> },
    /// Later batches, conditioned on the latest Teacher answer
    FollowUp { questions: Vec<String> },
}

impl QuestionBatch {
    /// The question texts in order
    pub fn prompts(&self) -> Vec<&str> {
        match self {
            QuestionBatch::Opening { questions } => {
                questions.iter().map(|q| q.prompt.as_str()).collect()
            }
            QuestionBatch::FollowUp { questions } => questions.iter().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QuestionBatch::Opening { questions } => questions.len(),
            QuestionBatch::FollowUp { questions } => questions.len(),
        }
    }

    #[allow(dead_code)] // Pairs with len()
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Shared record of a run.
///
/// Fields are private so the append-only and set-once rules can only be
/// broken from inside this module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    turn_count: u32,
    messages: Vec<Message>,
    questions: Vec<QuestionBatch>,
    insights: Vec<String>,
    document_text: Option<String>,
    error: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from previously persisted parts.
    ///
    /// Rejects combinations that no sequence of steps can produce.
    pub fn restore(
        turn_count: u32,
        messages: Vec<Message>,
        questions: Vec<QuestionBatch>,
        insights: Vec<String>,
        document_text: Option<String>,
        error: Option<String>,
    ) -> Result<Self, String> {
        if messages.len() != turn_count as usize {
            return Err(format!(
                "{} messages recorded for turn count {turn_count}",
                messages.len()
            ));
        }
        let observer_steps = messages
            .iter()
            .filter(|m| m.author == Participant::Observer)
            .count();
        if observer_steps != insights.len() {
            return Err(format!(
                "{} insights recorded for {observer_steps} observer steps",
                insights.len()
            ));
        }
        if turn_count > 0 && document_text.is_none() {
            return Err("steps recorded without a document".to_string());
        }
        Ok(Self {
            turn_count,
            messages,
            questions,
            insights,
            document_text,
            error,
        })
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn questions(&self) -> &[QuestionBatch] {
        &self.questions
    }

    pub fn insights(&self) -> &[String] {
        &self.insights
    }

    pub fn document_text(&self) -> Option<&str> {
        self.document_text.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Most recent message written by `author`
    pub fn last_message_by(&self, author: Participant) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.author == author)
    }

    pub fn latest_questions(&self) -> Option<&QuestionBatch> {
        self.questions.last()
    }

    /// Transcript without the bootstrap entry.
    ///
    /// The first message is the Student's opening batch. It is already
    /// represented by the Teacher's answers, so reviews leave it out.
    pub fn exclude_bootstrap_entry(&self) -> &[Message] {
        self.messages.get(1..).unwrap_or(&[])
    }

    pub(crate) fn set_document(&mut self, text: String) -> Result<(), String> {
        if self.document_text.is_some() {
            return Err("document text is already set".to_string());
        }
        self.document_text = Some(text);
        Ok(())
    }

    /// Fold a successful step into the state. All fields change together.
    pub(crate) fn fold(&mut self, author: Participant, delta: StepDelta) {
        debug_assert!(self.error.is_none(), "fold after terminal error");
        self.turn_count += 1;
        self.messages.push(Message {
            author,
            content: delta.content,
            turn: self.turn_count,
            meta: delta.meta,
        });
        if let Some(batch) = delta.question_batch {
            self.questions.push(batch);
        }
        if let Some(insight) = delta.insight {
            self.insights.push(insight);
        }
    }

    /// Record the terminal error. Later errors never overwrite the first.
    pub(crate) fn record_error(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }
}

/// What a successful participant step contributes to the state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDelta {
    pub content: String,
    pub meta: MessageMeta,
    /// Set by Student steps only
    pub question_batch: Option<QuestionBatch>,
    /// Set by Observer steps only
    pub insight: Option<String>,
}

impl StepDelta {
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            meta: MessageMeta::default(),
            question_batch: None,
            insight: None,
        }
    }

    pub fn with_questions(mut self, batch: QuestionBatch) -> Self {
        self.question_batch = Some(batch);
        self
    }

    pub fn with_insight(mut self, insight: impl Into<String>) -> Self {
        self.insight = Some(insight.into());
        self
    }

    pub fn with_meta(mut self, meta: MessageMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Immutable configuration of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub limits: Limits,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, limits: Limits) -> Self {
        Self {
            run_id: run_id.into(),
            limits,
        }
    }
}
