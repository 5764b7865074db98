//! Agent, task and memory configuration.

use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::time::Duration;

use crate::tool::ToolKind;

/// Prefix marking a chat message as addressed to a recipient, as in
/// `@User here is the total`.
pub const DEFAULT_ADDRESSING_PREFIX: &str = "@";

/// Model turns a task may take before it is failed.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Deepest parent chain the delegation tree will walk.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Insights kept by a conversation memory.
pub const DEFAULT_MAX_INSIGHTS: usize = 5;

const DEFAULT_USER_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`AgentConfig`].
#[derive(Clone)]
pub struct AgentConfigBuilder {
    name: String,
    chat_mode: bool,
    addressing_prefix: Option<String>,
    system_message: Option<String>,
    tools: BTreeSet<ToolKind>,
}

impl AgentConfigBuilder {
    /// Whether the agent chats with the user continuously instead of
    /// returning a single result to its caller.
    #[inline]
    pub fn chat_mode(mut self, chat_mode: bool) -> Self {
        self.chat_mode = chat_mode;
        self
    }

    /// Sets the addressing token used in chat mode.
    #[inline]
    pub fn addressing_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.addressing_prefix = Some(prefix.into());
        self
    }

    /// Sets the role description placed at the top of the system prompt.
    #[inline]
    pub fn system_message<S: Into<String>>(mut self, message: S) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Enables a tool.
    #[inline]
    pub fn with_tool(mut self, kind: ToolKind) -> Self {
        self.tools.insert(kind);
        self
    }

    /// Enables several tools.
    #[inline]
    pub fn with_tools(mut self, kinds: impl IntoIterator<Item = ToolKind>) -> Self {
        self.tools.extend(kinds);
        self
    }

    /// Builds the configuration.
    ///
    /// `forward` is always enabled. `done` is enabled unless the agent is
    /// in chat mode, where answers go to the user by addressing instead.
    pub fn build(self) -> AgentConfig {
        let mut tools = self.tools;
        tools.insert(ToolKind::Forward);
        if self.chat_mode {
            tools.remove(&ToolKind::Done);
        } else {
            tools.insert(ToolKind::Done);
        }
        AgentConfig {
            name: self.name,
            chat_mode: self.chat_mode,
            addressing_prefix: self
                .addressing_prefix
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or_else(|| DEFAULT_ADDRESSING_PREFIX.to_owned()),
            system_message: self.system_message.unwrap_or_default(),
            tools,
        }
    }
}

impl Debug for AgentConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfigBuilder")
            .field("name", &self.name)
            .field("chat_mode", &self.chat_mode)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

/// Identity and capabilities of one agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    name: String,
    chat_mode: bool,
    addressing_prefix: String,
    system_message: String,
    tools: BTreeSet<ToolKind>,
}

impl AgentConfig {
    /// Starts building a configuration for the agent called `name`.
    #[inline]
    pub fn builder<S: Into<String>>(name: S) -> AgentConfigBuilder {
        AgentConfigBuilder {
            name: name.into(),
            chat_mode: false,
            addressing_prefix: None,
            system_message: None,
            tools: BTreeSet::new(),
        }
    }

    /// Returns the agent's name, which is also how others address it.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the agent is in chat mode.
    #[inline]
    pub fn chat_mode(&self) -> bool {
        self.chat_mode
    }

    /// Returns the addressing token.
    #[inline]
    pub fn addressing_prefix(&self) -> &str {
        &self.addressing_prefix
    }

    /// Returns the role description.
    #[inline]
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    /// Returns the enabled tool kinds.
    #[inline]
    pub fn tools(&self) -> &BTreeSet<ToolKind> {
        &self.tools
    }

    /// Returns `true` if the agent may use tools of `kind`.
    #[inline]
    pub fn is_enabled(&self, kind: ToolKind) -> bool {
        self.tools.contains(&kind)
    }
}

/// Per-task run settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskConfig {
    /// Whether unaddressed replies are shown to the user, who answers
    /// them. Only effective when the task has a surface.
    pub interactive: bool,
    /// Model turns allowed in one run of the task.
    pub max_turns: usize,
    /// How long to wait for the user before giving up.
    pub user_timeout: Duration,
}

impl TaskConfig {
    /// Returns an interactive configuration with default limits.
    #[inline]
    pub fn interactive() -> Self {
        Self {
            interactive: true,
            ..Self::default()
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            max_turns: DEFAULT_MAX_TURNS,
            user_timeout: DEFAULT_USER_TIMEOUT,
        }
    }
}

/// Settings for [`DelegationTree`](crate::tree::DelegationTree).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeConfig {
    /// Deepest parent chain walked before giving up.
    pub max_depth: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Settings for [`ConversationMemory`](crate::memory::ConversationMemory).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    max_insights: usize,
    summarize_timeout: Duration,
}

impl MemoryConfig {
    /// Keeps at most `max_insights` insights; zero is raised to one.
    #[inline]
    pub fn new(max_insights: usize) -> Self {
        Self {
            max_insights: max_insights.max(1),
            summarize_timeout: DEFAULT_SUMMARIZE_TIMEOUT,
        }
    }

    /// Sets how long a single summarization may take.
    #[inline]
    pub fn with_summarize_timeout(mut self, timeout: Duration) -> Self {
        self.summarize_timeout = timeout;
        self
    }

    /// Returns the capacity.
    #[inline]
    pub fn max_insights(&self) -> usize {
        self.max_insights
    }

    /// Returns the summarization timeout.
    #[inline]
    pub fn summarize_timeout(&self) -> Duration {
        self.summarize_timeout
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INSIGHTS)
    }
}
