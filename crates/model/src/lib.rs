//! The contract between agents and the language models driving them.
//!
//! Agents never talk to a concrete LLM API. They build a [`ModelRequest`]
//! out of their history and the tools they are allowed to use, and consume
//! a stream of [`ModelResponseEvent`]s from whatever [`ModelProvider`] was
//! plugged in. A reply is either plain text or a structured
//! [`ToolCallRequest`], and deciding which of the two it means is left to
//! the caller.
//!
//! Types in this crate don't define any behavior. Providers live in their
//! own crates.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
