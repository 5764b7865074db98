//! Instructions injected into agent conversations.

use std::collections::BTreeSet;

use crate::config::AgentConfig;
use crate::tool::ToolKind;

/// Builds the system prompt of an agent.
///
/// Chat-mode agents are told to address their recipients explicitly. Task
/// agents are told to conclude with `done`.
pub fn system_prompt(config: &AgentConfig) -> String {
    let mut prompt = config.system_message().trim().to_owned();
    let instruction = if config.chat_mode() {
        addressing_instruction(config.addressing_prefix())
    } else {
        done_instruction()
    };
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str(&instruction);
    prompt
}

/// Tells a chat-mode agent how to address the user.
pub fn addressing_instruction(prefix: &str) -> String {
    format!(
        "Whenever you are not using a tool, start your message with \
         {prefix}User so it reaches the user. Use exactly `{prefix}` and no \
         other marker. Every message you write is either a tool call or \
         addressed with {prefix}<Name>."
    )
}

/// Tells a task agent how to finish.
pub fn done_instruction() -> String {
    let done = ToolKind::Done;
    format!(
        "Once you are sure you have the correct answer, use the `{done}` tool \
         with `content` set to the answer. Until then, do not use `{done}`; \
         keep refining your queries with the available tools."
    )
}

/// Sent back when a chat-mode reply neither used a tool nor addressed
/// anyone.
pub fn ambiguous_chat(prefix: &str, tools: &BTreeSet<ToolKind>) -> String {
    format!(
        "Your message was not addressed to anyone, so it is unclear whether \
         it is your final response or you forgot to use a tool.\n\
         - If it is meant for the user, send it again starting with \
         {prefix}User, or use the `{forward}` tool.\n\
         - Otherwise, use one of the available tools to make progress.{hint}",
        forward = ToolKind::Forward,
        hint = tools_hint(tools),
    )
}

/// Sent back when a task-mode reply neither used a tool nor concluded.
pub fn ambiguous_task(tools: &BTreeSet<ToolKind>, used_tool: bool) -> String {
    let lead = if used_tool {
        "You used a tool, but your message does not say what the result means."
    } else {
        "The intent of your message is not clear."
    };
    format!(
        "{lead}\n\
         - If this is the final answer, use the `{done}` tool with `content` \
         set to the answer.\n\
         - Otherwise, use one of the available tools to make progress toward \
         the answer.{hint}",
        done = ToolKind::Done,
        hint = tools_hint(tools),
    )
}

/// Sent back when a reply looked like a tool call but could not be used.
pub fn malformed(reason: &str, tools: &BTreeSet<ToolKind>) -> String {
    let names: Vec<_> = tools.iter().map(|kind| kind.name()).collect();
    format!(
        "Your tool call could not be understood: {reason}\n\
         Send a single JSON object whose `request` field is one of: {}. \
         Fix the syntax and try again.",
        names.join(", ")
    )
}

/// Sent back when a forward names nobody the agent can reach.
pub fn unknown_recipient(name: &str, known: &[&str]) -> String {
    format!(
        "There is no one called `{name}` to forward to. You can reach: {}.",
        known.join(", ")
    )
}

/// Asks the summarizer for the gist of `content`.
pub fn summarize(content: &str) -> String {
    format!(
        "State the single most important point of the following text in \
         15-20 words. Reply with the point only.\n\n{content}"
    )
}

/// Frames the question for the first speaker of a roundtable round.
pub fn opening(context: &str, question: &str) -> String {
    format!(
        "Previous insights:\n{context}\n\nQuestion: {question}\n\n\
         Give a concise, focused answer that builds on the previous insights."
    )
}

/// Frames what the previous speaker said for the next one.
pub fn reaction(context: &str, speaker: &str, said: &str) -> String {
    format!(
        "Previous insights:\n{context}\n\n{speaker} just said: {said}\n\n\
         Add new insights that build on and extend what {speaker} said."
    )
}

/// Asks the model for the next question of a roundtable.
pub fn follow_up(context: &str, responses: &[String]) -> String {
    format!(
        "Insights so far:\n{context}\n\nLatest responses:\n{}\n\n\
         Ask one specific follow-up question that explores a key point of \
         this exchange and refers to the insights so far. Reply with the \
         question only.",
        responses.join("\n")
    )
}

fn tools_hint(tools: &BTreeSet<ToolKind>) -> String {
    let mut hint = String::new();
    if tools.contains(&ToolKind::RunQuery) {
        hint.push_str(&format!(
            "\n  For example, use `{}` to explore the data.",
            ToolKind::RunQuery
        ));
    }
    if tools.iter().any(|kind| kind.is_schema()) {
        hint.push_str("\n  The schema tools can describe the tables first.");
    }
    hint
}
