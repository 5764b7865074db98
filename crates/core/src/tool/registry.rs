use std::collections::{BTreeSet, HashMap};

use baton_model::ModelTool;

use super::object::{BoxedToolFuture, ToolObject, ToolObjectImpl};
use super::{Error, Tool, ToolInvocation, ToolKind};

/// Handlers for the tool kinds a session can serve.
///
/// `done` and `forward` are handled by the task runner and never have a
/// handler here.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Box<dyn ToolObject>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool` as the handler of its kind, replacing any previous
    /// handler.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let object = ToolObjectImpl(tool);
        let kind = object.kind();
        if kind.is_orchestration() {
            warn!("ignoring a handler for `{kind}`, which the runner handles");
            return;
        }
        if self.tools.insert(kind, Box::new(object)).is_some() {
            debug!("replaced the handler for `{kind}`");
        }
    }

    /// Registers `tool` and returns the registry.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.add_tool(tool);
        self
    }

    /// Returns `true` if a handler serves `kind`.
    #[inline]
    pub fn has_handler(&self, kind: ToolKind) -> bool {
        self.tools.contains_key(&kind)
    }

    /// Returns the definitions advertised for `enabled` kinds, in a stable
    /// order.
    pub fn definitions(&self, enabled: &BTreeSet<ToolKind>) -> Vec<ModelTool> {
        enabled
            .iter()
            .map(|&kind| {
                let mut definition = kind.definition();
                if let Some(tool) = self.tools.get(&kind) {
                    tool.description().clone_into(&mut definition.description);
                }
                definition
            })
            .collect()
    }

    /// Sends `invocation` to the handler of its kind.
    pub fn dispatch(&self, invocation: ToolInvocation) -> BoxedToolFuture {
        let kind = invocation.kind();
        let Some(tool) = self.tools.get(&kind) else {
            warn!("no handler for `{kind}`");
            let err = Error::unavailable()
                .with_reason(format!("`{kind}` is not available in this session"));
            return Box::pin(std::future::ready(Err(err)));
        };
        trace!("dispatching: {invocation:?}");
        tool.execute(invocation)
    }
}
