//! Multi-round conversations between agents sharing one memory.

use baton_model::{AssistantMessage, ModelMessage, ModelRequest};

use crate::error::{Error, Result};
use crate::memory::{ConversationMemory, Summarizer};
use crate::model_client::ModelClient;
use crate::prompt;
use crate::task::Runner;
use crate::tree::{DelegationTree, TaskId};

/// Rounds held unless configured otherwise.
pub const DEFAULT_ROUNDS: usize = 3;

/// What one participant said in a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Name of the participant.
    pub agent: String,
    /// The participant's answer.
    pub content: String,
}

/// The record of one round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Round {
    /// The question the round was about.
    pub question: String,
    /// Answers in speaking order.
    pub responses: Vec<Response>,
    /// The question generated for the next round. `None` after the last
    /// round.
    pub follow_up: Option<String>,
}

/// Takes participants through several rounds of questions.
///
/// In each round the first participant answers the question, and every
/// later one reacts to whoever spoke before it. Everyone sees the insights
/// remembered before the round started. Every answer is condensed into the
/// shared memory, and between rounds a moderator model asks a follow-up
/// question that becomes the next round's topic.
pub struct Roundtable<S> {
    participants: Vec<TaskId>,
    memory: ConversationMemory<S>,
    moderator: ModelClient,
    moderator_history: Vec<ModelMessage>,
    rounds: usize,
}

impl<S: Summarizer> Roundtable<S> {
    /// Creates a roundtable of `participants`, in speaking order.
    pub fn new(
        participants: Vec<TaskId>,
        memory: ConversationMemory<S>,
        moderator: ModelClient,
    ) -> Self {
        Self {
            participants,
            memory,
            moderator,
            moderator_history: Vec::new(),
            rounds: DEFAULT_ROUNDS,
        }
    }

    /// Sets the number of rounds; zero is raised to one.
    #[inline]
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    /// Returns the shared memory.
    #[inline]
    pub fn memory(&self) -> &ConversationMemory<S> {
        &self.memory
    }

    /// Holds every round, starting from `question`.
    pub async fn run(
        &mut self,
        tree: &mut DelegationTree,
        question: &str,
    ) -> Result<Vec<Round>> {
        let mut records = Vec::with_capacity(self.rounds);
        let mut question = question.to_owned();

        for round in 0..self.rounds {
            info!("round {}: {question}", round + 1);
            let context = self.memory.get_context();
            let mut responses: Vec<Response> = Vec::new();

            for &id in &self.participants {
                let agent = tree
                    .task(id)
                    .ok_or(Error::TaskNotFound(id))?
                    .name()
                    .to_owned();
                let input = match responses.last() {
                    None => prompt::opening(&context, &question),
                    Some(previous) => {
                        prompt::reaction(&context, &previous.agent, &previous.content)
                    }
                };
                let content = Runner::run(tree, id, input).await?;
                self.memory.add_insight(&agent, &content).await?;
                responses.push(Response { agent, content });
            }

            let follow_up = if round + 1 < self.rounds {
                Some(self.follow_up(&context, &responses, &question).await?)
            } else {
                None
            };
            let next = follow_up.clone();
            records.push(Round {
                question,
                responses,
                follow_up,
            });
            question = next.unwrap_or_default();
        }
        Ok(records)
    }

    async fn follow_up(
        &mut self,
        context: &str,
        responses: &[Response],
        current: &str,
    ) -> Result<String> {
        let lines: Vec<_> = responses
            .iter()
            .map(|response| format!("{}: {}", response.agent, response.content))
            .collect();
        self.moderator_history
            .push(ModelMessage::User(prompt::follow_up(context, &lines)));
        let reply = self
            .moderator
            .generate(ModelRequest {
                messages: self.moderator_history.clone(),
                tools: vec![],
            })
            .await?;
        self.moderator_history
            .push(ModelMessage::Assistant(AssistantMessage::text(&reply.content)));

        let next = reply.content.trim();
        if next.is_empty() {
            warn!("the moderator asked nothing; keeping the current question");
            return Ok(current.to_owned());
        }
        Ok(next.to_owned())
    }
}
