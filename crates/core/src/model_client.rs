use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use baton_model::{
    AssistantMessage, ErrorKind, ModelFinishReason, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use tracing::Instrument;

use crate::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRY_ELAPSED: Duration = Duration::from_secs(2 * 60);

type SendRequestResult = std::result::Result<ModelReply, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn = Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that collects streamed responses,
/// retries transient failures and provides a type-erased interface for
/// the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    timeout: Duration,
    max_retry_elapsed: Duration,
}

impl ModelClient {
    /// Wraps `provider`.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            timeout: DEFAULT_TIMEOUT,
            max_retry_elapsed: DEFAULT_MAX_RETRY_ELAPSED,
        }
    }

    /// Sets how long a single attempt may take.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how long transient failures are retried before giving up.
    #[inline]
    pub fn with_max_retry_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_retry_elapsed = max_elapsed;
        self
    }

    /// Sends a request and returns the fully received reply.
    ///
    /// Rate limits and timeouts are retried with exponential backoff.
    /// Other failures are returned right away as [`Error::Llm`].
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn generate(&self, req: ModelRequest) -> Result<ModelReply> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..ExponentialBackoff::default()
        };
        let handler_fn = Arc::clone(&self.handler_fn);
        let timeout = self.timeout;

        let result = backoff::future::retry(backoff, || {
            let fut = handler_fn(req.clone());
            async move {
                let err: Box<dyn ModelProviderError> =
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(Ok(reply)) => return Ok(reply),
                        Ok(Err(err)) => err,
                        Err(_) => Box::new(TimedOut(timeout)),
                    };
                if err.kind().is_transient() {
                    warn!("model request failed, will retry: {err}");
                    Err(backoff::Error::transient(err))
                } else {
                    Err(backoff::Error::permanent(err))
                }
            }
        })
        .await;

        result.map_err(|err| {
            error!("model request failed: {err}");
            Error::llm(err.kind(), err.to_string())
        })
    }
}

/// A completely received reply from the model client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelReply {
    /// The text of the reply.
    pub content: String,
    /// The structured tool call requested by the model, if any.
    pub tool_call: Option<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

impl ModelReply {
    /// Creates a text-only reply.
    #[inline]
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            tool_call: None,
            finish_reason: Some(ModelFinishReason::Stop),
        }
    }

    /// Converts the reply into a history entry.
    #[inline]
    pub fn to_message(&self) -> AssistantMessage {
        AssistantMessage {
            content: self.content.clone(),
            tool_call: self.tool_call.clone(),
        }
    }
}

#[derive(Debug)]
struct TimedOut(Duration);

impl Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no response within {:?}", self.0)
    }
}

impl StdError for TimedOut {}

impl ModelProviderError for TimedOut {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Timeout
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: std::result::Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            debug!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut reply = ModelReply::default();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                debug!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                reply.content.push_str(&msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                if reply.tool_call.is_some() {
                    // One invocation per turn; the rest are dropped.
                    warn!("ignoring extra tool call: {}", req.name);
                } else {
                    reply.tool_call = Some(req);
                }
            }
            ModelResponseEvent::Completed(reason) => {
                reply.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(reply)
}
