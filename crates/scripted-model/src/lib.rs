//! A scripted model that replays preset responses.
//!
//! Used by tests and by the replay CLI, where a conversation is written
//! down ahead of time instead of being sampled from a real LLM.

mod preset;

use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use baton_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Replays the events of one preset, pausing before each of them.
pub struct ScriptedResponse {
    events: VecDeque<ModelResponseEvent>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ScriptedResponse {
    fn from_preset(preset: &PresetResponse, delay: Duration) -> Self {
        let mut events: VecDeque<_> = preset
            .events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::ToolCall(req) => {
                    ModelResponseEvent::ToolCall(req.clone())
                }
            })
            .collect();
        let has_tool_call = preset
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        events.push_back(ModelResponseEvent::Completed(if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }));
        Self {
            events,
            delay,
            sleep: None,
        }
    }
}

impl ModelResponse for ScriptedResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.events.is_empty() {
            return Poll::Ready(Ok(None));
        }
        let delay = this.delay;
        let pause = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(pause.as_mut().poll(cx));
        this.sleep = None;
        Poll::Ready(Ok(this.events.pop_front()))
    }
}

/// A model that answers from a fixed script.
///
/// The response for a request is chosen by counting the assistant
/// messages already in its history: the first request gets the first
/// preset, the request after one assistant reply gets the second, and so
/// on. Resending a request after a failure picks the same preset again.
/// If the script runs out, an error is returned.
///
/// Clones share their attempt counters and request log.
///
/// # Note
///
/// Every request is recorded and cloned, so this type is meant for tests
/// and replays only.
#[derive(Clone, Default)]
pub struct ScriptedModelProvider {
    script: Vec<PresetResponse>,
    delay: Option<Duration>,
    attempts: Arc<Mutex<HashMap<usize, u64>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedModelProvider {
    /// Creates a provider that replays `responses` in order.
    #[inline]
    pub fn from_responses(
        responses: impl IntoIterator<Item = PresetResponse>,
    ) -> Self {
        Self {
            script: responses.into_iter().collect(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.script.push(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, including failed attempts.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns how many times the preset at `step` has been requested.
    pub fn attempts(&self, step: usize) -> u64 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&step)
            .copied()
            .unwrap_or(0)
    }

    fn next_response(
        &self,
        req: &ModelRequest,
    ) -> Result<ScriptedResponse, Error> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req.clone());

        let step = req.assistant_turns();
        let Some(preset) = self.script.get(step) else {
            return Err(Error::new(
                format!("script exhausted at step {step}"),
                ErrorKind::Other,
            ));
        };

        let attempt = {
            let mut attempts = self
                .attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let count = attempts.entry(step).or_insert(0);
            *count += 1;
            *count
        };
        let failing = match preset.failures {
            Some(0) => true,
            Some(failures) => attempt <= failures,
            None => false,
        };
        if failing {
            return Err(Error::new(
                format!("scripted failure {attempt} at step {step}"),
                ErrorKind::RateLimitExceeded,
            ));
        }

        Ok(ScriptedResponse::from_preset(
            preset,
            self.delay.unwrap_or(Duration::from_millis(1)),
        ))
    }
}

impl ModelProvider for ScriptedModelProvider {
    type Error = crate::Error;
    type Response = ScriptedResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        future::ready(self.next_response(req))
    }
}
