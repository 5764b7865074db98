use baton_model::{ModelMessage, ModelRequest};

use crate::config::AgentConfig;
use crate::prompt;
use crate::router::{Mode, Router, TurnFlags};
use crate::tool::ToolRegistry;

/// One participant of a conversation: its identity, its history and the
/// flags of the turn in progress.
///
/// A turn starts with an input from the user or the calling task and spans
/// every model reply until the next input. `llm_responded` is set by each
/// model reply, `used_tool` by each tool call, and both are cleared when
/// the next input arrives.
#[derive(Clone, Debug)]
pub struct Agent {
    config: AgentConfig,
    router: Router,
    flags: TurnFlags,
    history: Vec<ModelMessage>,
}

impl Agent {
    /// Creates an agent with an empty history.
    pub fn new(config: AgentConfig) -> Self {
        let history = vec![ModelMessage::System(prompt::system_prompt(&config))];
        Self {
            router: Router::new(&config),
            config,
            flags: TurnFlags::default(),
            history,
        }
    }

    /// Returns the agent's name.
    #[inline]
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns the router for this agent's replies.
    #[inline]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the flags of the current turn.
    #[inline]
    pub fn flags(&self) -> TurnFlags {
        self.flags
    }

    /// Returns the routing mode for this agent.
    #[inline]
    pub fn mode(&self, interactive: bool) -> Mode {
        Mode {
            chat_mode: self.config.chat_mode(),
            interactive,
        }
    }

    /// Returns the conversation so far, oldest first.
    #[inline]
    pub fn history(&self) -> &[ModelMessage] {
        &self.history
    }

    /// Starts a new turn with an input from the user or the caller.
    pub fn begin_user_turn<S: Into<String>>(&mut self, input: S) {
        self.flags = TurnFlags::default();
        self.history.push(ModelMessage::User(input.into()));
    }

    /// Marks the reply about to be routed as produced by the model.
    #[inline]
    pub fn begin_llm_turn(&mut self) {
        self.flags.llm_responded = true;
    }

    /// Records that a tool ran during this turn.
    #[inline]
    pub fn mark_tool_used(&mut self) {
        self.flags.used_tool = true;
    }

    /// Appends a message without starting a new turn.
    #[inline]
    pub fn push(&mut self, message: ModelMessage) {
        self.history.push(message);
    }

    /// Builds the next model request.
    pub fn request(&self, tools: &ToolRegistry) -> ModelRequest {
        ModelRequest {
            messages: self.history.clone(),
            tools: tools.definitions(self.config.tools()),
        }
    }
}
