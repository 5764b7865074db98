//! Replay scripts: a whole session written down as JSON.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use baton_core::ToolKind;
use baton_scripted_model::PresetResponse;
use serde::Deserialize;
use thiserror::Error;

use crate::tools::{CannedQueries, SchemaCatalog};

/// Errors raised while loading a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The file could not be read.
    #[error("cannot read script: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not a valid script.
    #[error("invalid script: {0}")]
    Json(#[from] serde_json::Error),
    /// The script names no agent.
    #[error("the script has no agents")]
    NoAgents,
    /// Two agents share a name, so forwards to them would be ambiguous.
    #[error("more than one agent is called `{0}`")]
    DuplicateAgent(String),
}

/// One agent of a script, with the agents it delegates to.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentScript {
    /// The agent's name.
    pub name: String,
    /// Role description placed in the system prompt.
    #[serde(default)]
    pub system_message: String,
    /// Whether the agent chats with the user.
    #[serde(default)]
    pub chat_mode: bool,
    /// Whether unaddressed replies are shown to the user.
    #[serde(default)]
    pub interactive: bool,
    /// Data tools the agent may use. `done` and `forward` are implied.
    #[serde(default)]
    pub tools: Vec<ToolKind>,
    /// Turn budget of the agent's task.
    #[serde(default)]
    pub max_turns: Option<usize>,
    /// What the agent's model says, one preset per turn.
    pub responses: Vec<PresetResponse>,
    /// Agents this one can forward to.
    #[serde(default)]
    pub children: Vec<AgentScript>,
}

/// Settings of a roundtable session.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundtableScript {
    /// Number of rounds.
    #[serde(default)]
    pub rounds: Option<usize>,
    /// Insights kept in memory.
    #[serde(default)]
    pub max_insights: Option<usize>,
    /// What the moderator asks between rounds.
    #[serde(default)]
    pub moderator: Vec<PresetResponse>,
}

/// A recorded session.
///
/// Without a `roundtable` section the first agent is the root of a
/// delegation tree and every later top-level agent is ignored. With one,
/// the top-level agents are the participants, in speaking order.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// The question asked when none is given on the command line.
    #[serde(default)]
    pub question: Option<String>,
    /// Milliseconds between streamed model events.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// The agents.
    pub agents: Vec<AgentScript>,
    /// Tables the schema tools describe.
    #[serde(default)]
    pub schema: SchemaCatalog,
    /// Results `run_query` answers with.
    #[serde(default)]
    pub queries: CannedQueries,
    /// Present for a roundtable session.
    #[serde(default)]
    pub roundtable: Option<RoundtableScript>,
}

impl Script {
    /// Reads a script from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScriptError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parses a script.
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        let script: Script = serde_json::from_str(json)?;
        script.validate()?;
        Ok(script)
    }

    pub(crate) fn validate(&self) -> Result<(), ScriptError> {
        if self.agents.is_empty() {
            return Err(ScriptError::NoAgents);
        }
        let mut names = HashSet::new();
        let mut stack: Vec<&AgentScript> = self.agents.iter().collect();
        while let Some(agent) = stack.pop() {
            if !names.insert(agent.name.to_lowercase()) {
                return Err(ScriptError::DuplicateAgent(agent.name.clone()));
            }
            stack.extend(&agent.children);
        }
        Ok(())
    }
}
