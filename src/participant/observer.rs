//! Observer: reviews the discussion and steers both sides

use super::{prompts, render, ParticipantAgent, RoleClient};
use crate::state_machine::{ConversationState, Participant, StepDelta, StepFailure};
use async_trait::async_trait;

pub struct ObserverAgent {
    client: RoleClient,
}

impl ObserverAgent {
    pub fn new(client: RoleClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParticipantAgent for ObserverAgent {
    fn participant(&self) -> Participant {
        Participant::Observer
    }

    async fn respond(&self, state: &ConversationState) -> Result<StepDelta, StepFailure> {
        if state.document_text().is_none() {
            return Err(StepFailure::generation("no document loaded"));
        }
        let history = render::history_block(state.exclude_bootstrap_entry());
        let reply = self.client.ask(prompts::review_history(&history)).await?;

        // The instructions are both the transcript entry and the new insight
        Ok(StepDelta::message(reply.text.clone())
            .with_insight(reply.text)
            .with_meta(reply.meta))
    }
}
