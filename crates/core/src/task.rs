//! Running tasks: the loop that alternates model turns, tool calls and
//! hand-offs until an answer is reached.

#[cfg(test)]
mod tests;

use std::pin::Pin;
use std::sync::Arc;

use baton_model::{ModelMessage, ToolCallResult};
use tokio::time::timeout;
use tracing::Instrument;

use crate::agent::Agent;
use crate::config::{AgentConfig, TaskConfig};
use crate::error::{Error, Result};
use crate::model_client::ModelClient;
use crate::prompt;
use crate::router::{Directive, USER};
use crate::surface::{Anchor, Surface, SurfaceError, is_exit_command};
use crate::tool::{ToolInvocation, ToolOutput, ToolRegistry};
use crate::tree::{DelegationTree, TaskId};

type BoxedRunFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// What a task can reach outside of its own conversation.
#[derive(Clone)]
pub struct Capabilities {
    /// The model driving the agent.
    pub model: ModelClient,
    /// Handlers for the agent's tools.
    pub tools: Arc<ToolRegistry>,
    /// Where the user can be reached, if anywhere.
    pub surface: Option<Arc<dyn Surface>>,
}

/// A unit of conversation ownership: one agent and how it is run.
///
/// Sub-tasks are linked through a [`DelegationTree`].
pub struct Task {
    agent: Agent,
    config: TaskConfig,
    caps: Capabilities,
}

impl Task {
    /// Creates a non-interactive task without tools or surface.
    pub fn new(config: AgentConfig, model: ModelClient) -> Self {
        Self {
            agent: Agent::new(config),
            config: TaskConfig::default(),
            caps: Capabilities {
                model,
                tools: Arc::new(ToolRegistry::new()),
                surface: None,
            },
        }
    }

    /// Sets the run settings.
    #[inline]
    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the tool handlers.
    #[inline]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.caps.tools = tools;
        self
    }

    /// Sets the surface.
    #[inline]
    pub fn with_surface(mut self, surface: Arc<dyn Surface>) -> Self {
        self.caps.surface = Some(surface);
        self
    }

    /// Returns the name of the task's agent.
    #[inline]
    pub fn name(&self) -> &str {
        self.agent.name()
    }

    /// Returns the agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Returns the run settings.
    #[inline]
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Returns the capabilities.
    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Returns the surface, if any.
    #[inline]
    pub fn surface(&self) -> Option<&Arc<dyn Surface>> {
        self.caps.surface.as_ref()
    }

    /// Replaces the surface.
    #[inline]
    pub fn set_surface(&mut self, surface: Arc<dyn Surface>) {
        self.caps.surface = Some(surface);
    }
}

/// Runs tasks of a [`DelegationTree`].
pub struct Runner;

impl Runner {
    /// Runs the task `id` with `input` until it produces a result.
    ///
    /// The task's agent is asked for replies until one concludes the task,
    /// either with `done` or by handing the result back to its caller.
    /// Tools run in between, and forwards to sub-tasks run those tasks to
    /// completion before the agent continues. Every model reply and every
    /// chained tool invocation counts against the turn budget.
    ///
    /// Errors of sub-tasks propagate, so a user who cancels in a sub-task
    /// stops every task up to the root.
    pub fn run<'a, S: Into<String>>(
        tree: &'a mut DelegationTree,
        id: TaskId,
        input: S,
    ) -> BoxedRunFuture<'a> {
        let input = input.into();
        Box::pin(async move {
            let name = tree
                .task(id)
                .ok_or(Error::TaskNotFound(id))?
                .name()
                .to_owned();
            run_task(tree, id, input)
                .instrument(debug_span!("task run", agent = %name, %id))
                .await
        })
    }
}

async fn run_task(
    tree: &mut DelegationTree,
    id: TaskId,
    input: String,
) -> Result<String> {
    let task = tree.task_mut(id).ok_or(Error::TaskNotFound(id))?;
    task.agent.begin_user_turn(input);
    let name = task.name().to_owned();
    let config = task.config;
    let Capabilities {
        model,
        tools,
        surface,
    } = task.caps.clone();
    let interactive = config.interactive && surface.is_some();

    let mut turns = 0;
    let mut chained: Option<ToolInvocation> = None;
    loop {
        if turns >= config.max_turns {
            warn!("`{name}` ran out of turns");
            return Err(Error::TurnBudgetExceeded {
                task: name,
                budget: config.max_turns,
            });
        }
        turns += 1;

        let (routed, call_id) = match chained.take() {
            Some(invocation) => {
                let routed = agent_mut(tree, id)?.router().route_invocation(invocation);
                (routed, None)
            }
            None => {
                let req = {
                    let agent = agent_mut(tree, id)?;
                    agent.begin_llm_turn();
                    agent.request(&tools)
                };
                let reply = model.generate(req).await?;

                let routed = {
                    let agent = agent_mut(tree, id)?;
                    agent.push(ModelMessage::Assistant(reply.to_message()));
                    agent
                        .router()
                        .route(&reply, agent.mode(interactive), agent.flags())
                };
                if let Some(surface) = &surface {
                    if !reply.content.trim().is_empty() {
                        let parent = tree.resolve_anchor(id)?;
                        let step =
                            surface.show_response(&name, &reply.content, parent.as_ref());
                        if let Some(step) = step {
                            tree.set_anchor(id, step)?;
                        }
                    }
                }
                let Some(routed) = routed else {
                    continue;
                };
                (routed, reply.tool_call.map(|call| call.id))
            }
        };
        trace!("turn {turns} of `{name}`: {:?}", routed.classification);

        match routed.directive {
            Directive::Answer(content) => {
                debug!("`{name}` finished in {turns} turns");
                return Ok(content);
            }
            Directive::Retry(message) => {
                agent_mut(tree, id)?.push(feedback(call_id, message));
            }
            Directive::Tool(invocation) => {
                let kind = invocation.kind();
                agent_mut(tree, id)?.mark_tool_used();
                let content = match tools.dispatch(invocation).await {
                    Ok(ToolOutput::Text(text)) => text,
                    Ok(ToolOutput::Invocation(next)) => {
                        if let Some(call_id) = call_id {
                            let note = format!("continuing with `{}`", next.kind());
                            agent_mut(tree, id)?.push(feedback(Some(call_id), note));
                        }
                        chained = Some(next);
                        continue;
                    }
                    Err(err) => {
                        debug!("`{kind}` failed: {err}");
                        err.reason().into_owned()
                    }
                };
                if let Some(surface) = &surface {
                    let parent = tree.resolve_anchor(id)?;
                    surface.show_tool_result(&name, kind.name(), &content, parent.as_ref());
                }
                agent_mut(tree, id)?.push(feedback(call_id, content));
            }
            Directive::Forward { recipient, content } => {
                if recipient == USER {
                    acknowledge(tree, id, call_id, &recipient)?;
                    let Some(surface) = surface.as_ref().filter(|_| interactive)
                    else {
                        return Ok(content);
                    };
                    let anchor = tree.resolve_anchor(id)?;
                    let reply = ask_user(
                        &**surface,
                        &content,
                        anchor.as_ref(),
                        &config,
                    )
                    .await?;
                    agent_mut(tree, id)?.begin_user_turn(reply);
                    continue;
                }

                let parent = tree.parent(id);
                let parent_name = parent
                    .and_then(|parent| tree.task(parent))
                    .map(|task| task.name().to_owned());
                if parent_name
                    .as_deref()
                    .is_some_and(|parent| parent.eq_ignore_ascii_case(&recipient))
                {
                    acknowledge(tree, id, call_id, &recipient)?;
                    return Ok(content);
                }

                if let Some(child) = tree.find_child(id, &recipient) {
                    debug!("`{name}` delegates to `{recipient}`");
                    acknowledge(tree, id, call_id, &recipient)?;
                    let result = Runner::run(tree, child, content).await?;
                    agent_mut(tree, id)?.begin_user_turn(result);
                    continue;
                }

                warn!("`{name}` forwarded to unknown `{recipient}`");
                let mut known = vec![USER.to_owned()];
                known.extend(parent_name);
                known.extend(
                    tree.children(id)
                        .iter()
                        .filter_map(|&child| tree.task(child))
                        .map(|task| task.name().to_owned()),
                );
                let known: Vec<_> = known.iter().map(String::as_str).collect();
                let message = prompt::unknown_recipient(&recipient, &known);
                agent_mut(tree, id)?.push(feedback(call_id, message));
            }
        }
    }
}

async fn ask_user(
    surface: &dyn Surface,
    question: &str,
    anchor: Option<&Anchor>,
    config: &TaskConfig,
) -> Result<String> {
    let asked = surface.ask_user(question, anchor);
    let reply = match timeout(config.user_timeout, asked).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(SurfaceError::Timeout)) | Err(_) => {
            info!("gave up waiting for the user");
            return Err(Error::UserTimeout);
        }
        Ok(Err(SurfaceError::Closed)) => return Err(Error::UserCancelled),
    };
    if is_exit_command(&reply) {
        info!("user asked to stop");
        return Err(Error::UserCancelled);
    }
    Ok(reply)
}

/// Wraps text fed back to the agent, answering the structured tool call it
/// responds to if there was one.
fn feedback(call_id: Option<String>, content: String) -> ModelMessage {
    match call_id {
        Some(id) => ModelMessage::Tool(ToolCallResult { id, content }),
        None => ModelMessage::User(content),
    }
}

/// Confirms a forward once its recipient is known.
fn acknowledge(
    tree: &mut DelegationTree,
    id: TaskId,
    call_id: Option<String>,
    recipient: &str,
) -> Result<()> {
    if let Some(call_id) = call_id {
        let note = format!("delivered to {recipient}");
        agent_mut(tree, id)?.push(feedback(Some(call_id), note));
    }
    Ok(())
}

#[inline]
fn agent_mut(tree: &mut DelegationTree, id: TaskId) -> Result<&mut Agent> {
    tree.task_mut(id)
        .map(|task| &mut task.agent)
        .ok_or(Error::TaskNotFound(id))
}
