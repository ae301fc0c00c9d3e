//! Checkpoint projection
//!
//! A checkpoint is the persisted form of a `ConversationState`. Messages are
//! projected onto `{author, content, turn}`; model ids, token usage and
//! latency stay in memory.

use crate::state_machine::{ConversationState, Message, MessageMeta, Participant, Phase, QuestionBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted form of a transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub author: Participant,
    pub content: String,
    pub turn: u32,
}

/// Sanitized, serializable copy of a conversation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub turn_count: u32,
    pub messages: Vec<MessageRecord>,
    pub questions: Vec<QuestionBatch>,
    pub insights: Vec<String>,
    pub document_text: Option<String>,
    pub error: Option<String>,
}

/// One write-once entry in a run's checkpoint sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    /// 0 for Init, then one per committed or failed step
    pub sequence: u32,
    /// Phase whose outcome this checkpoint records
    pub produced_by: Phase,
    /// Phase the router chose next
    pub next_phase: Phase,
    pub snapshot: StateSnapshot,
    pub created_at: DateTime<Utc>,
}

/// Project a message onto its persisted fields
pub fn sanitize(message: &Message) -> MessageRecord {
    MessageRecord {
        author: message.author,
        content: message.content.clone(),
        turn: message.turn,
    }
}

/// Take a snapshot of `state`
pub fn capture(state: &ConversationState) -> StateSnapshot {
    StateSnapshot {
        turn_count: state.turn_count(),
        messages: state.messages().iter().map(sanitize).collect(),
        questions: state.questions().to_vec(),
        insights: state.insights().to_vec(),
        document_text: state.document_text().map(str::to_string),
        error: state.error().map(str::to_string),
    }
}

/// Rebuild a state from a snapshot. Restored messages carry no metadata.
pub fn restore(snapshot: StateSnapshot) -> Result<ConversationState, String> {
    let messages = snapshot
        .messages
        .into_iter()
        .map(|m| Message {
            author: m.author,
            content: m.content,
            turn: m.turn,
            meta: MessageMeta::default(),
        })
        .collect();

    ConversationState::restore(
        snapshot.turn_count,
        messages,
        snapshot.questions,
        snapshot.insights,
        snapshot.document_text,
        snapshot.error,
    )
}
