//! The interactive surface tasks talk to the user through.

use std::fmt::{self, Display};

use async_trait::async_trait;
use thiserror::Error;

/// The id of an agent's last interaction step, used to nest the displays
/// of delegated tasks under the step that started them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Anchor(pub String);

impl Anchor {
    /// Creates an anchor.
    #[inline]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Returns the id.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why the user could not be asked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The user did not answer in time.
    #[error("timed out")]
    Timeout,
    /// The surface has gone away, for example because input reached EOF.
    #[error("closed")]
    Closed,
}

/// A place where the user can be shown replies and asked for input.
///
/// Implementations are shared by every task of a delegation branch, so
/// they must tolerate being called from different tasks one after another.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Shows `prompt` and waits for the user's reply. `anchor` is the step
    /// of the asking agent's parent the exchange is nested under, if any.
    async fn ask_user(
        &self,
        prompt: &str,
        anchor: Option<&Anchor>,
    ) -> Result<String, SurfaceError>;

    /// Shows a reply of `agent`, nested under `parent` if given. Returns an
    /// anchor for the step if the surface tracks them.
    fn show_response(
        &self,
        _agent: &str,
        _content: &str,
        _parent: Option<&Anchor>,
    ) -> Option<Anchor> {
        None
    }

    /// Shows the result of a tool called by `agent`, nested under `parent`
    /// if given.
    fn show_tool_result(
        &self,
        _agent: &str,
        _tool: &str,
        _result: &str,
        _parent: Option<&Anchor>,
    ) {
    }
}

/// Returns `true` if the user's reply asks to stop.
pub fn is_exit_command(reply: &str) -> bool {
    matches!(
        reply.trim().to_ascii_lowercase().as_str(),
        "x" | "q" | "exit" | "quit"
    )
}
