//! Errors raised while running delegated tasks.

use baton_model::ErrorKind as ModelErrorKind;
use thiserror::Error;

use crate::tree::TaskId;

/// Errors that can occur while routing turns or running tasks.
///
/// [`Error::MalformedTool`] is normally recovered inside the protocol by
/// re-prompting the agent. Every other variant ends the task that raised
/// it, and [`Error::UserCancelled`] / [`Error::UserTimeout`] end the whole
/// delegation branch above it.
#[derive(Debug, Error)]
pub enum Error {
    /// A tool-like payload could not be understood.
    #[error("malformed tool invocation: {0}")]
    MalformedTool(String),

    /// A task used up its turn budget without finishing.
    #[error("task `{task}` did not finish within {budget} turns")]
    TurnBudgetExceeded {
        /// Name of the agent owning the task.
        task: String,
        /// The configured maximum.
        budget: usize,
    },

    /// Attaching the child would make it its own ancestor.
    #[error("attaching {child} under {parent} would create a cycle")]
    CycleDetected {
        /// The would-be parent.
        parent: TaskId,
        /// The would-be child.
        child: TaskId,
    },

    /// The child already belongs to another parent.
    #[error("{0} is already attached to a parent")]
    AlreadyAttached(TaskId),

    /// No task with this id exists in the tree.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A parent chain was longer than the configured limit.
    #[error("delegation chain is deeper than {0} levels")]
    DelegationDepthExceeded(usize),

    /// The summarization capability failed or timed out.
    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    /// The language model could not produce a reply.
    #[error("model error ({kind}): {message}")]
    Llm {
        /// What went wrong, as reported by the provider.
        kind: ModelErrorKind,
        /// Human readable details.
        message: String,
    },

    /// The user did not answer in time.
    #[error("timed out waiting for user input")]
    UserTimeout,

    /// The user asked to stop.
    #[error("cancelled by user")]
    UserCancelled,
}

impl Error {
    /// Creates an [`Error::Llm`].
    #[inline]
    pub fn llm(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self::Llm {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` for errors raised by the user rather than by the
    /// agents, which stop every task up to the root.
    #[inline]
    pub fn is_user_abort(&self) -> bool {
        matches!(self, Error::UserCancelled | Error::UserTimeout)
    }
}

/// A specialized [`Result`](std::result::Result) type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
