//! Replays of scripted agent sessions over a recorded database.
//!
//! A [`Script`] writes down what every agent's model says, the schema of the
//! database and the results of the queries the agents will run. A
//! [`Session`] built from it runs the agents through the real routing and
//! delegation machinery of [`core`], so the whole protocol can be watched
//! without a live model.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod script;
mod session;
pub mod tools;

pub use script::{AgentScript, RoundtableScript, Script, ScriptError};
pub use session::{BuildError, LeadSentence, Outcome, Session, SessionBuilder};

/// Re-exports of [`baton_core`] crate.
pub mod core {
    pub use baton_core::*;
}
