use std::sync::Arc;
use std::time::Duration;

use baton_core::memory::{BoxError, ConversationMemory, Summarizer};
use baton_core::roundtable::{Round, Roundtable};
use baton_core::surface::Surface;
use baton_core::{
    AgentConfig, DelegationTree, MemoryConfig, ModelClient, Result, Runner,
    Task, TaskConfig, TaskId, ToolRegistry,
};
use baton_scripted_model::{PresetResponse, ScriptedModelProvider};
use thiserror::Error;

use crate::script::{AgentScript, Script, ScriptError};
use crate::tools;

const MAX_POINT_WORDS: usize = 20;

/// A summarizer keeping the first sentence of a message, cut to twenty
/// words.
///
/// Replays have no model to summarize with, and the lead sentence is what
/// scripted answers put first.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeadSentence;

impl Summarizer for LeadSentence {
    async fn summarize(&self, content: &str) -> std::result::Result<String, BoxError> {
        let content = content.trim();
        let sentence = content
            .find(['.', '!', '?', '\n'])
            .map_or(content, |end| &content[..end]);
        let words: Vec<_> = sentence.split_whitespace().take(MAX_POINT_WORDS).collect();
        Ok(words.join(" "))
    }
}

/// Errors raised while building a session.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The script is not usable.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// The agents could not be arranged into a delegation tree.
    #[error(transparent)]
    Tree(#[from] baton_core::Error),
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    script: Script,
    surface: Option<Arc<dyn Surface>>,
    max_turns: Option<usize>,
    interactive: bool,
}

impl SessionBuilder {
    /// Creates a session builder replaying `script`.
    pub fn from_script(script: Script) -> Self {
        Self {
            script,
            surface: None,
            max_turns: None,
            interactive: true,
        }
    }

    /// Sets where the user is reached.
    #[inline]
    pub fn with_surface(mut self, surface: Arc<dyn Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Overrides the turn budget of every task.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Makes every task non-interactive, whatever the script says.
    #[inline]
    pub fn non_interactive(mut self) -> Self {
        self.interactive = false;
        self
    }

    /// Builds a new session.
    ///
    /// Fails if the script is not valid, or if its agents are nested
    /// deeper than the delegation tree allows.
    pub fn build(self) -> std::result::Result<Session, BuildError> {
        self.script.validate()?;
        let Script {
            delay_ms,
            agents,
            schema,
            queries,
            roundtable,
            ..
        } = self.script;
        let mut assembly = Assembly {
            tree: DelegationTree::new(),
            tools: Arc::new(tools::registry(schema, queries)),
            delay: delay_ms.map(Duration::from_millis),
            max_turns: self.max_turns,
            interactive: self.interactive,
        };

        let Some(roundtable) = roundtable else {
            if agents.len() > 1 {
                warn!("only the first agent is run outside of a roundtable");
            }
            let Some(root) = agents.into_iter().next() else {
                return Err(ScriptError::NoAgents.into());
            };
            let root = assembly.add(root)?;
            if let Some(surface) = self.surface {
                assembly.tree.inject_surface(root, surface)?;
            }
            return Ok(Session {
                tree: assembly.tree,
                kind: SessionKind::Delegation(root),
            });
        };

        let mut participants = Vec::with_capacity(agents.len());
        for agent in agents {
            let id = assembly.add(agent)?;
            if let Some(surface) = &self.surface {
                assembly.tree.inject_surface(id, Arc::clone(surface))?;
            }
            participants.push(id);
        }
        let memory_config = roundtable
            .max_insights
            .map(MemoryConfig::new)
            .unwrap_or_default();
        let moderator = ModelClient::new(assembly.provider(roundtable.moderator));
        let mut table = Roundtable::new(
            participants,
            ConversationMemory::new(LeadSentence, memory_config),
            moderator,
        );
        if let Some(rounds) = roundtable.rounds {
            table = table.with_rounds(rounds);
        }
        Ok(Session {
            tree: assembly.tree,
            kind: SessionKind::Roundtable(Box::new(table)),
        })
    }
}

struct Assembly {
    tree: DelegationTree,
    tools: Arc<ToolRegistry>,
    delay: Option<Duration>,
    max_turns: Option<usize>,
    interactive: bool,
}

impl Assembly {
    fn provider(&self, responses: Vec<PresetResponse>) -> ScriptedModelProvider {
        let mut provider = ScriptedModelProvider::from_responses(responses);
        if let Some(delay) = self.delay {
            provider.set_delay(delay);
        }
        provider
    }

    /// Inserts `agent` and its subtree, returning the agent's id.
    fn add(&mut self, agent: AgentScript) -> Result<TaskId> {
        let AgentScript {
            name,
            system_message,
            chat_mode,
            interactive,
            tools,
            max_turns,
            responses,
            children,
        } = agent;

        let config = AgentConfig::builder(name)
            .system_message(system_message)
            .chat_mode(chat_mode)
            .with_tools(tools)
            .build();
        let mut task_config = TaskConfig {
            interactive: interactive && self.interactive,
            ..TaskConfig::default()
        };
        if let Some(max_turns) = self.max_turns.or(max_turns) {
            task_config.max_turns = max_turns;
        }
        let model = ModelClient::new(self.provider(responses));
        let task = Task::new(config, model)
            .with_config(task_config)
            .with_tools(Arc::clone(&self.tools));

        let id = self.tree.insert(task);
        for child in children {
            let child = self.add(child)?;
            self.tree.attach(id, child)?;
        }
        Ok(id)
    }
}

enum SessionKind {
    Delegation(TaskId),
    Roundtable(Box<Roundtable<LeadSentence>>),
}

/// What a session produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The root task's answer.
    Answer(String),
    /// The record of every roundtable round.
    Rounds(Vec<Round>),
}

/// A replayed session, holding the agents of a script and their tools.
pub struct Session {
    tree: DelegationTree,
    kind: SessionKind,
}

impl Session {
    /// Returns the delegation tree.
    #[inline]
    pub fn tree(&self) -> &DelegationTree {
        &self.tree
    }

    /// Asks `question` and runs the session until it concludes.
    pub async fn run(&mut self, question: &str) -> Result<Outcome> {
        match &mut self.kind {
            SessionKind::Delegation(root) => {
                let answer = Runner::run(&mut self.tree, *root, question).await?;
                Ok(Outcome::Answer(answer))
            }
            SessionKind::Roundtable(table) => {
                let rounds = table.run(&mut self.tree, question).await?;
                Ok(Outcome::Rounds(rounds))
            }
        }
    }
}
