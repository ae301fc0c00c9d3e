//! Student: poses question batches

use super::{parse, prompts, render, ParticipantAgent, RoleClient};
use crate::state_machine::{ConversationState, Participant, QuestionBatch, StepDelta, StepFailure};
use async_trait::async_trait;

pub struct StudentAgent {
    client: RoleClient,
    first_batch_size: usize,
    follow_up_batch_size: usize,
}

impl StudentAgent {
    pub fn new(client: RoleClient, first_batch_size: usize, follow_up_batch_size: usize) -> Self {
        Self {
            client,
            first_batch_size,
            follow_up_batch_size,
        }
    }

    /// Structured questions over the whole document
    async fn opening_batch(&self) -> Result<StepDelta, StepFailure> {
        let reply = self
            .client
            .ask(prompts::opening_questions(self.first_batch_size))
            .await?;
        let questions = parse::parse_opening_batch(&reply.text)
            .map_err(|e| StepFailure::parse(format!("opening questions: {e}")))?;

        if questions.len() != self.first_batch_size {
            tracing::warn!(
                requested = self.first_batch_size,
                received = questions.len(),
                "Opening batch size differs from request"
            );
        }

        let prompts: Vec<&str> = questions.iter().map(|q| q.prompt.as_str()).collect();
        let content = render::questions_block(&prompts);
        Ok(StepDelta::message(content)
            .with_questions(QuestionBatch::Opening { questions })
            .with_meta(reply.meta))
    }

    /// Questions conditioned on the Teacher's latest answer.
    ///
    /// With an observer interval of one the Teacher never speaks, so the
    /// Student builds on its own latest batch instead.
    async fn follow_up_batch(&self, state: &ConversationState) -> Result<StepDelta, StepFailure> {
        let insights = render::insights_block(state.insights());
        let prompt = match state.last_message_by(Participant::Teacher) {
            Some(teacher) => {
                prompts::follow_up_questions(self.follow_up_batch_size, &teacher.content, &insights)
            }
            None => {
                let batch = state
                    .latest_questions()
                    .ok_or_else(|| StepFailure::generation("no questions to follow up on"))?;
                prompts::follow_up_unanswered(
                    self.follow_up_batch_size,
                    &render::questions_block(&batch.prompts()),
                    &insights,
                )
            }
        };
        let reply = self.client.ask(prompt).await?;
        let questions = parse::parse_follow_up_batch(&reply.text)
            .map_err(|e| StepFailure::parse(format!("follow-up questions: {e}")))?;

        if questions.len() != self.follow_up_batch_size {
            tracing::warn!(
                requested = self.follow_up_batch_size,
                received = questions.len(),
                "Follow-up batch size differs from request"
            );
        }

        let content = render::questions_block(&questions);
        Ok(StepDelta::message(content)
            .with_questions(QuestionBatch::FollowUp { questions })
            .with_meta(reply.meta))
    }
}

#[async_trait]
impl ParticipantAgent for StudentAgent {
    fn participant(&self) -> Participant {
        Participant::Student
    }

    async fn respond(&self, state: &ConversationState) -> Result<StepDelta, StepFailure> {
        if state.document_text().is_none() {
            return Err(StepFailure::generation("no document loaded"));
        }
        if state.turn_count() == 0 {
            self.opening_batch().await
        } else {
            self.follow_up_batch(state).await
        }
    }
}
