//! Turn routing and delegation for cooperating chat agents.
//!
//! An [`Agent`] produces replies through a [`ModelClient`]. The
//! [`Router`](router::Router) decides what each reply means: a tool call, a
//! final answer, a hand-off to the user or another agent, or something the
//! agent must be asked to clarify. [`Runner`] applies those decisions to the
//! tasks of a [`DelegationTree`] until the root task has an answer.
//!
//! Conversations between several agents are held by a
//! [`Roundtable`](roundtable::Roundtable), which condenses what was said into
//! a bounded [`ConversationMemory`](memory::ConversationMemory).

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod config;
pub mod error;
pub mod memory;
mod model_client;
pub mod prompt;
pub mod roundtable;
pub mod router;
pub mod surface;
pub mod task;
pub mod tool;
pub mod tree;

pub use agent::Agent;
pub use config::{AgentConfig, MemoryConfig, TaskConfig, TreeConfig};
pub use error::{Error, Result};
pub use model_client::{ModelClient, ModelReply};
pub use task::{Capabilities, Runner, Task};
pub use tool::{Tool, ToolInvocation, ToolKind, ToolOutput, ToolRegistry, ToolResult};
pub use tree::{DelegationTree, TaskId};
