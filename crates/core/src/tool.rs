//! Tool invocations and the handlers that serve them.

mod error;
mod invocation;
mod object;
mod registry;

pub use error::{Error, ErrorKind};
pub use invocation::{
    Done, Forward, GetColumnDescriptions, GetTableNames, GetTableSchema,
    RunQuery, ToolInvocation, ToolKind,
};
pub(crate) use invocation::strip_json;
pub use object::BoxedToolFuture;
pub use registry::ToolRegistry;

/// What a tool hands back to the agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutput {
    /// Text fed back to the agent as the tool's result.
    Text(String),
    /// A follow-up invocation, routed as if the agent had emitted it.
    Invocation(ToolInvocation),
}

impl From<String> for ToolOutput {
    #[inline]
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    #[inline]
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_owned())
    }
}

impl From<ToolInvocation> for ToolOutput {
    #[inline]
    fn from(invocation: ToolInvocation) -> Self {
        ToolOutput::Invocation(invocation)
    }
}

/// The result of a tool call.
pub type ToolResult = Result<ToolOutput, Error>;

/// The typed payload of one [`ToolKind`].
pub trait Payload: Sized + Send + 'static {
    /// The kind this payload belongs to.
    const KIND: ToolKind;

    /// Extracts the payload, or returns `None` for other kinds.
    fn from_invocation(invocation: ToolInvocation) -> Option<Self>;
}

macro_rules! impl_payload {
    ($($kind:ident),* $(,)?) => {
        $(
            impl Payload for $kind {
                const KIND: ToolKind = ToolKind::$kind;

                #[inline]
                fn from_invocation(invocation: ToolInvocation) -> Option<Self> {
                    match invocation {
                        ToolInvocation::$kind(payload) => Some(payload),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_payload!(
    RunQuery,
    GetTableNames,
    GetTableSchema,
    GetColumnDescriptions,
    Done,
    Forward,
);

/// A handler for one kind of tool invocation.
///
/// Implementations should be stateless. Context a tool needs, like a
/// database handle or a schema catalog, should be an immutable part of the
/// tool set up at construction and cloned into each execution.
pub trait Tool: Send + Sync + 'static {
    /// The payload this tool accepts, which also decides its kind.
    type Input: Payload;

    /// Returns the description advertised to the model.
    fn description(&self) -> &str {
        <Self::Input as Payload>::KIND.description()
    }

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
