//! Teacher: answers the latest question batch

use super::{parse, prompts, render, ParticipantAgent, RoleClient};
use crate::state_machine::{ConversationState, Participant, StepDelta, StepFailure};
use async_trait::async_trait;

pub struct TeacherAgent {
    client: RoleClient,
}

impl TeacherAgent {
    pub fn new(client: RoleClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParticipantAgent for TeacherAgent {
    fn participant(&self) -> Participant {
        Participant::Teacher
    }

    async fn respond(&self, state: &ConversationState) -> Result<StepDelta, StepFailure> {
        if state.document_text().is_none() {
            return Err(StepFailure::generation("no document loaded"));
        }
        let batch = state
            .latest_questions()
            .ok_or_else(|| StepFailure::generation("no question batch to answer"))?;

        let questions = render::questions_block(&batch.prompts());
        let prompt =
            prompts::answer_questions(&questions, &render::insights_block(state.insights()));
        let reply = self.client.ask(prompt).await?;

        let answers = parse::parse_answers(&reply.text)
            .map_err(|e| StepFailure::parse(format!("answers: {e}")))?;
        if answers.len() != batch.len() {
            tracing::warn!(
                questions = batch.len(),
                answers = answers.len(),
                "Answer count differs from question count"
            );
        }

        Ok(StepDelta::message(render::responses_block(&answers)).with_meta(reply.meta))
    }
}
