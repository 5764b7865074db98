//! Bounded memory of the key points made in a conversation.

use std::collections::VecDeque;
use std::error::Error as StdError;

use baton_model::{ModelMessage, ModelRequest};
use tokio::time::timeout;

use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::model_client::ModelClient;
use crate::prompt;

/// The error type returned by summarizers.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Condenses a message into its single most important point.
pub trait Summarizer: Send + Sync {
    /// Summarizes `content`.
    fn summarize(
        &self,
        content: &str,
    ) -> impl Future<Output = std::result::Result<String, BoxError>> + Send;
}

impl<F, Fut, E> Summarizer for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<String, E>> + Send,
    E: Into<BoxError>,
{
    async fn summarize(&self, content: &str) -> std::result::Result<String, BoxError> {
        self(content.to_owned()).await.map_err(Into::into)
    }
}

/// A summarizer backed by the language model.
#[derive(Clone)]
pub struct ModelSummarizer {
    client: ModelClient,
}

impl ModelSummarizer {
    /// Creates a summarizer sending requests through `client`.
    #[inline]
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }
}

impl Summarizer for ModelSummarizer {
    async fn summarize(&self, content: &str) -> std::result::Result<String, BoxError> {
        let req = ModelRequest {
            messages: vec![ModelMessage::User(prompt::summarize(content))],
            tools: vec![],
        };
        let reply = self.client.generate(req).await?;
        Ok(reply.content.trim().to_owned())
    }
}

/// One remembered point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Insight {
    /// Who made the point.
    pub agent: String,
    /// The point, as summarized.
    pub point: String,
}

/// Remembers the latest key points of a conversation.
///
/// Only summaries are stored, never the messages themselves. When full,
/// the oldest insight is dropped first.
pub struct ConversationMemory<S> {
    summarizer: S,
    config: MemoryConfig,
    insights: VecDeque<Insight>,
}

impl<S: Summarizer> ConversationMemory<S> {
    /// Creates an empty memory.
    pub fn new(summarizer: S, config: MemoryConfig) -> Self {
        Self {
            summarizer,
            insights: VecDeque::with_capacity(config.max_insights()),
            config,
        }
    }

    /// Summarizes `content` and remembers it as said by `agent`.
    ///
    /// Fails with [`Error::SummarizationFailed`] if the summarizer fails,
    /// takes too long or returns nothing. The memory is left unchanged in
    /// that case.
    pub async fn add_insight(&mut self, agent: &str, content: &str) -> Result<()> {
        let summarized =
            timeout(self.config.summarize_timeout(), self.summarizer.summarize(content))
                .await;
        let point = match summarized {
            Ok(Ok(point)) => point.trim().to_owned(),
            Ok(Err(err)) => {
                warn!("failed to summarize a message of `{agent}`: {err}");
                return Err(Error::SummarizationFailed(err.to_string()));
            }
            Err(_) => {
                warn!("summarizing a message of `{agent}` timed out");
                return Err(Error::SummarizationFailed(format!(
                    "no summary within {:?}",
                    self.config.summarize_timeout()
                )));
            }
        };
        if point.is_empty() {
            return Err(Error::SummarizationFailed("empty summary".to_owned()));
        }

        trace!("insight from `{agent}`: {point}");
        self.insights.push_back(Insight {
            agent: agent.to_owned(),
            point,
        });
        while self.insights.len() > self.config.max_insights() {
            self.insights.pop_front();
        }
        Ok(())
    }

    /// Renders the remembered insights, one `agent: point` line each,
    /// oldest first. Empty when nothing is remembered.
    pub fn get_context(&self) -> String {
        self.insights
            .iter()
            .map(|insight| format!("{}: {}", insight.agent, insight.point))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the remembered insights, oldest first.
    #[inline]
    pub fn insights(&self) -> impl Iterator<Item = &Insight> {
        self.insights.iter()
    }

    /// Returns the number of remembered insights.
    #[inline]
    pub fn len(&self) -> usize {
        self.insights.len()
    }

    /// Returns `true` if nothing is remembered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;
    use std::time::Duration;

    use baton_scripted_model::{PresetResponse, ScriptedModelProvider};

    use super::*;

    async fn first_words(content: String) -> std::result::Result<String, BoxError> {
        Ok(content.split_whitespace().take(3).collect::<Vec<_>>().join(" "))
    }

    #[tokio::test]
    async fn test_oldest_insights_are_evicted() {
        let mut memory = ConversationMemory::new(first_words, MemoryConfig::new(2));
        memory.add_insight("A", "alpha one two three").await.unwrap();
        memory.add_insight("B", "beta one two three").await.unwrap();
        memory.add_insight("C", "gamma one two three").await.unwrap();

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.get_context(), "B: beta one two\nC: gamma one two");
    }

    #[tokio::test]
    async fn test_context_is_idempotent() {
        let mut memory =
            ConversationMemory::new(first_words, MemoryConfig::default());
        assert_eq!(memory.get_context(), "");

        memory.add_insight("CEO", "Focus on retention").await.unwrap();
        let context = memory.get_context();
        assert_eq!(context, "CEO: Focus on retention");
        assert_eq!(memory.get_context(), context);
    }

    #[tokio::test]
    async fn test_summarizer_failures() {
        let failing = |_: String| async { Err::<String, _>("model is down") };
        let mut memory = ConversationMemory::new(failing, MemoryConfig::default());
        assert!(matches!(
            memory.add_insight("A", "anything").await,
            Err(Error::SummarizationFailed(_))
        ));

        let blank = |_: String| async { Ok::<_, BoxError>("  ".to_owned()) };
        let mut memory = ConversationMemory::new(blank, MemoryConfig::default());
        assert!(matches!(
            memory.add_insight("A", "anything").await,
            Err(Error::SummarizationFailed(_))
        ));
        assert!(memory.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarizer_timeout() {
        let stuck = |_: String| pending::<std::result::Result<String, BoxError>>();
        let config =
            MemoryConfig::new(3).with_summarize_timeout(Duration::from_secs(1));
        let mut memory = ConversationMemory::new(stuck, config);
        assert!(matches!(
            memory.add_insight("A", "anything").await,
            Err(Error::SummarizationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_model_summarizer() {
        let provider = ScriptedModelProvider::from_responses([PresetResponse::text(
            " Retention matters more than acquisition this quarter. ",
        )]);
        let summarizer = ModelSummarizer::new(ModelClient::new(provider.clone()));
        let mut memory = ConversationMemory::new(summarizer, MemoryConfig::default());
        memory
            .add_insight("CEO", "A long speech about customers.")
            .await
            .unwrap();

        assert_eq!(
            memory.get_context(),
            "CEO: Retention matters more than acquisition this quarter."
        );
        let ModelMessage::User(request) = &provider.requests()[0].messages[0] else {
            panic!("expected a user message");
        };
        assert!(request.contains("A long speech about customers."));
    }
}
