use std::future::ready;
use std::pin::Pin;

use tracing::Instrument;

use super::{Error, Payload, Tool, ToolInvocation, ToolKind, ToolResult};

/// The type-erased future of a tool call.
pub type BoxedToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn kind(&self) -> ToolKind;

    fn description(&self) -> &str;

    fn execute(&self, invocation: ToolInvocation) -> BoxedToolFuture;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn kind(&self) -> ToolKind {
        <T::Input as Payload>::KIND
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    fn execute(&self, invocation: ToolInvocation) -> BoxedToolFuture {
        let kind = self.kind();
        let Some(input) = T::Input::from_invocation(invocation) else {
            return Box::pin(ready(Err(Error::invalid_input()
                .with_reason(format!("expected a `{kind}` request")))));
        };
        Box::pin(
            self.0
                .execute(input)
                .instrument(debug_span!("tool execute", %kind)),
        )
    }
}
