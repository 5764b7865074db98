//! Classification of agent replies into directives.
//!
//! Every reply an agent produces is either a tool invocation, a final
//! answer, a hand-off, or something the agent has to be asked to clarify.
//! The [`Router`] decides which, without touching the conversation history;
//! applying the resulting [`Directive`] is up to the task runner.

use crate::config::AgentConfig;
use crate::error::Error;
use crate::model_client::ModelReply;
use crate::prompt;
use crate::tool::{Done, Forward, ToolInvocation, strip_json};

/// The name the user is addressed by.
pub const USER: &str = "User";

/// Flags describing the turn being routed. Both are cleared by new input,
/// and `llm_responded` is set again by every model reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnFlags {
    /// The reply being routed was produced by the model.
    pub llm_responded: bool,
    /// The agent has run a tool since the last input.
    pub used_tool: bool,
}

/// How the agent is being run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mode {
    /// The agent chats with the user continuously.
    pub chat_mode: bool,
    /// Unaddressed replies go straight to the user.
    pub interactive: bool,
}

/// What kind of reply was routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    /// A recognized, enabled tool invocation.
    Tool,
    /// The agent concluded with `done`.
    FinalAnswer,
    /// The reply goes to the user.
    ForwardToUser,
    /// The reply goes to another agent.
    Addressed,
    /// A chat-mode reply that addressed nobody.
    AmbiguousChat,
    /// A task-mode reply that neither used a tool nor concluded.
    AmbiguousTask,
    /// A tool call that could not be used.
    MalformedTool,
}

/// What the task runner should do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Run the tool and feed its result back to the agent.
    Tool(ToolInvocation),
    /// Hand `content` over to `recipient`.
    Forward {
        /// Who receives the content, [`USER`] or an agent name.
        recipient: String,
        /// The message handed over.
        content: String,
    },
    /// Send the message back to the agent and let it try again.
    Retry(String),
    /// The task is finished with this answer.
    Answer(String),
}

/// A routing decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routed {
    /// How the reply was classified.
    pub classification: Classification,
    /// What to do about it.
    pub directive: Directive,
}

impl Routed {
    #[inline]
    fn new(classification: Classification, directive: Directive) -> Self {
        Self {
            classification,
            directive,
        }
    }
}

/// Routes the replies of one agent.
#[derive(Clone, Debug)]
pub struct Router {
    config: AgentConfig,
}

impl Router {
    /// Creates a router for the agent described by `config`.
    #[inline]
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Classifies a reply.
    ///
    /// Returns `None` unless the reply came from the model, since only
    /// model output needs routing.
    pub fn route(
        &self,
        reply: &ModelReply,
        mode: Mode,
        flags: TurnFlags,
    ) -> Option<Routed> {
        if !flags.llm_responded {
            return None;
        }

        let parsed = match &reply.tool_call {
            Some(call) => ToolInvocation::from_call(call).map(Some),
            None => ToolInvocation::from_text(&reply.content),
        };
        let routed = match parsed {
            Ok(Some(invocation)) => self.route_parsed(invocation, &reply.content),
            Ok(None) => self.route_text(&reply.content, mode, flags),
            Err(err) => self.malformed(&err),
        };
        debug!(
            "routed a reply from `{}` as {:?}",
            self.config.name(),
            routed.classification
        );
        Some(routed)
    }

    /// Routes an invocation returned by a tool handler, without a model
    /// call in between.
    pub fn route_invocation(&self, invocation: ToolInvocation) -> Routed {
        self.route_parsed(invocation, "")
    }

    fn route_parsed(&self, invocation: ToolInvocation, text: &str) -> Routed {
        let kind = invocation.kind();
        if !self.config.is_enabled(kind) {
            warn!("`{}` used a disabled tool: {kind}", self.config.name());
            return self.malformed(&Error::MalformedTool(format!(
                "the `{kind}` tool is not available to you"
            )));
        }
        match invocation {
            ToolInvocation::Done(Done { content }) if content.trim().is_empty() => {
                self.malformed(&Error::MalformedTool(
                    "`done` needs the answer in its `content`".to_owned(),
                ))
            }
            ToolInvocation::Done(Done { content }) => Routed::new(
                Classification::FinalAnswer,
                Directive::Answer(content),
            ),
            ToolInvocation::Forward(Forward { agent, content }) => {
                let content = content.unwrap_or_else(|| strip_json(text));
                self.forward(agent, content)
            }
            invocation => {
                Routed::new(Classification::Tool, Directive::Tool(invocation))
            }
        }
    }

    fn route_text(&self, text: &str, mode: Mode, flags: TurnFlags) -> Routed {
        if mode.chat_mode {
            if let Some((recipient, content)) = self.addressed(text) {
                return self.forward(recipient, content);
            }
        }
        if mode.interactive {
            return Routed::new(
                Classification::ForwardToUser,
                Directive::Forward {
                    recipient: USER.to_owned(),
                    content: text.trim().to_owned(),
                },
            );
        }
        if mode.chat_mode {
            return Routed::new(
                Classification::AmbiguousChat,
                Directive::Retry(prompt::ambiguous_chat(
                    self.config.addressing_prefix(),
                    self.config.tools(),
                )),
            );
        }
        Routed::new(
            Classification::AmbiguousTask,
            Directive::Retry(prompt::ambiguous_task(
                self.config.tools(),
                flags.used_tool,
            )),
        )
    }

    fn forward(&self, recipient: String, content: String) -> Routed {
        if recipient.eq_ignore_ascii_case(USER) {
            Routed::new(
                Classification::ForwardToUser,
                Directive::Forward {
                    recipient: USER.to_owned(),
                    content,
                },
            )
        } else {
            Routed::new(
                Classification::Addressed,
                Directive::Forward { recipient, content },
            )
        }
    }

    /// Splits `@Name rest` into the recipient and the rest.
    fn addressed(&self, text: &str) -> Option<(String, String)> {
        let rest = text.trim_start().strip_prefix(self.config.addressing_prefix())?;
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        let recipient = rest[..end].to_owned();
        let content = rest[end..]
            .trim_start_matches(|c: char| c == ':' || c == ',')
            .trim()
            .to_owned();
        Some((recipient, content))
    }

    fn malformed(&self, err: &Error) -> Routed {
        let reason = match err {
            Error::MalformedTool(reason) => reason.as_str(),
            _ => "unexpected error",
        };
        warn!("malformed tool from `{}`: {reason}", self.config.name());
        Routed::new(
            Classification::MalformedTool,
            Directive::Retry(prompt::malformed(reason, self.config.tools())),
        )
    }
}

#[cfg(test)]
mod tests {
    use baton_model::{ModelFinishReason, ToolCallRequest};
    use serde_json::json;

    use super::*;
    use crate::tool::{RunQuery, ToolKind};

    const MODEL_TURN: TurnFlags = TurnFlags {
        llm_responded: true,
        used_tool: false,
    };
    const TASK: Mode = Mode {
        chat_mode: false,
        interactive: false,
    };
    const CHAT: Mode = Mode {
        chat_mode: true,
        interactive: false,
    };
    const INTERACTIVE: Mode = Mode {
        chat_mode: false,
        interactive: true,
    };

    fn task_router() -> Router {
        Router::new(
            &AgentConfig::builder("sql")
                .with_tool(ToolKind::RunQuery)
                .build(),
        )
    }

    fn chat_router() -> Router {
        Router::new(
            &AgentConfig::builder("sql")
                .chat_mode(true)
                .with_tool(ToolKind::RunQuery)
                .build(),
        )
    }

    fn call(name: &str, arguments: serde_json::Value) -> ModelReply {
        ModelReply {
            content: String::new(),
            tool_call: Some(ToolCallRequest {
                id: "call:1".to_owned(),
                name: name.to_owned(),
                arguments,
            }),
            finish_reason: Some(ModelFinishReason::ToolCalls),
        }
    }

    #[test]
    fn test_not_routed_without_model_reply() {
        let routed = task_router().route(
            &ModelReply::text("anything"),
            TASK,
            TurnFlags::default(),
        );
        assert_eq!(routed, None);
    }

    #[test]
    fn test_structured_tool_call() {
        let routed = task_router()
            .route(&call("run_query", json!({ "query": "SELECT 1" })), TASK, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::Tool);
        assert_eq!(
            routed.directive,
            Directive::Tool(ToolInvocation::RunQuery(RunQuery {
                query: "SELECT 1".to_owned()
            }))
        );
    }

    #[test]
    fn test_tool_in_text() {
        let reply = ModelReply::text(
            r#"{"request": "done", "content": "There are 42 customers."}"#,
        );
        let routed = task_router().route(&reply, TASK, MODEL_TURN).unwrap();
        assert_eq!(routed.classification, Classification::FinalAnswer);
        assert_eq!(
            routed.directive,
            Directive::Answer("There are 42 customers.".to_owned())
        );
    }

    #[test]
    fn test_unparseable_tool_is_retried() {
        let reply = ModelReply::text(r#"{"request": "run_query", "query": SELECT 1}"#);
        let routed = task_router().route(&reply, TASK, MODEL_TURN).unwrap();
        assert_eq!(routed.classification, Classification::MalformedTool);
        let Directive::Retry(message) = routed.directive else {
            panic!("expected a retry");
        };
        assert!(message.contains("run_query"));
    }

    #[test]
    fn test_unknown_or_disabled_tool_is_malformed() {
        let router = task_router();
        let routed = router
            .route(&call("drop_table", json!({})), TASK, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::MalformedTool);

        let routed = router
            .route(&call("get_table_names", json!({})), TASK, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::MalformedTool);

        // `done` is not available in chat mode.
        let routed = chat_router()
            .route(&call("done", json!({ "content": "42" })), CHAT, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::MalformedTool);
    }

    #[test]
    fn test_interactive_text_goes_to_user() {
        let routed = task_router()
            .route(&ModelReply::text(" Which region? "), INTERACTIVE, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::ForwardToUser);
        assert_eq!(
            routed.directive,
            Directive::Forward {
                recipient: USER.to_owned(),
                content: "Which region?".to_owned(),
            }
        );
    }

    #[test]
    fn test_task_mode_gets_done_instruction() {
        let router = task_router();
        for used_tool in [false, true] {
            let flags = TurnFlags {
                llm_responded: true,
                used_tool,
            };
            let routed = router
                .route(&ModelReply::text("There are 42."), TASK, flags)
                .unwrap();
            assert_eq!(routed.classification, Classification::AmbiguousTask);
            let Directive::Retry(message) = routed.directive else {
                panic!("expected a retry");
            };
            assert!(message.contains("`done`"));
            assert!(!message.contains("@User"));
        }
    }

    #[test]
    fn test_chat_mode_gets_addressing_instruction() {
        let routed = chat_router()
            .route(&ModelReply::text("There are 42."), CHAT, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::AmbiguousChat);
        let Directive::Retry(message) = routed.directive else {
            panic!("expected a retry");
        };
        assert!(message.contains("@User"));
    }

    #[test]
    fn test_addressed_messages() {
        let router = chat_router();
        let routed = router
            .route(&ModelReply::text("@User: There are 42."), CHAT, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::ForwardToUser);
        assert_eq!(
            routed.directive,
            Directive::Forward {
                recipient: USER.to_owned(),
                content: "There are 42.".to_owned(),
            }
        );

        let routed = router
            .route(&ModelReply::text("@analyst check EMEA"), CHAT, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::Addressed);
        assert_eq!(
            routed.directive,
            Directive::Forward {
                recipient: "analyst".to_owned(),
                content: "check EMEA".to_owned(),
            }
        );

        // A bare prefix addresses nobody.
        let routed = router
            .route(&ModelReply::text("@ nobody"), CHAT, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::AmbiguousChat);
    }

    #[test]
    fn test_forward_without_content_uses_surrounding_text() {
        let reply = ModelReply::text(
            "Please pick a region.\n```json\n{\"request\": \"forward\", \"agent\": \"user\"}\n```",
        );
        let routed = task_router().route(&reply, TASK, MODEL_TURN).unwrap();
        assert_eq!(routed.classification, Classification::ForwardToUser);
        assert_eq!(
            routed.directive,
            Directive::Forward {
                recipient: USER.to_owned(),
                content: "Please pick a region.".to_owned(),
            }
        );
    }

    #[test]
    fn test_empty_done_is_retried() {
        let router = task_router();
        for content in ["", "  \n"] {
            let routed = router
                .route(&call("done", json!({ "content": content })), TASK, MODEL_TURN)
                .unwrap();
            assert_eq!(routed.classification, Classification::MalformedTool);
            let Directive::Retry(message) = routed.directive else {
                panic!("expected a retry");
            };
            assert!(message.contains("`done` needs the answer"));
        }
    }

    #[test]
    fn test_code_snippet_goes_to_user() {
        let text = "```python\nlimits = {\"emea\": 10}\n```\nUse this mapping.";
        let routed = task_router()
            .route(&ModelReply::text(text), INTERACTIVE, MODEL_TURN)
            .unwrap();
        assert_eq!(routed.classification, Classification::ForwardToUser);
        assert_eq!(
            routed.directive,
            Directive::Forward {
                recipient: USER.to_owned(),
                content: text.to_owned(),
            }
        );
    }

    #[test]
    fn test_route_invocation() {
        let routed = task_router().route_invocation(ToolInvocation::Done(Done {
            content: "42".to_owned(),
        }));
        assert_eq!(routed.directive, Directive::Answer("42".to_owned()));
    }
}
