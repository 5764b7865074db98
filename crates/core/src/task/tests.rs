use std::collections::VecDeque;
use std::future::{pending, ready};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use baton_model::ModelMessage;
use baton_scripted_model::{PresetResponse, ScriptedModelProvider};
use serde_json::json;

use super::*;
use crate::tool::{Done, RunQuery, Tool, ToolKind, ToolResult};

struct CountQuery;

impl Tool for CountQuery {
    type Input = RunQuery;

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(if input.query.contains("customers") {
            Ok(ToolOutput::Text("count: 42".to_owned()))
        } else {
            Err(crate::tool::Error::execution_error()
                .with_reason("no such table"))
        })
    }
}

/// Concludes right away by handing `done` back to the runner.
struct ShortCircuit;

impl Tool for ShortCircuit {
    type Input = RunQuery;

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Ok(ToolOutput::Invocation(ToolInvocation::Done(Done {
            content: format!("cached: {}", input.query),
        }))))
    }
}

#[derive(Default)]
struct ScriptedSurface {
    replies: Mutex<VecDeque<String>>,
    questions: Mutex<Vec<(String, Option<Anchor>)>>,
    shown: Mutex<Vec<(String, Option<Anchor>)>>,
}

impl ScriptedSurface {
    fn with_replies<const N: usize>(replies: [&str; N]) -> Arc<Self> {
        let surface = Self::default();
        surface
            .replies
            .lock()
            .unwrap()
            .extend(replies.map(str::to_owned));
        Arc::new(surface)
    }
}

#[async_trait]
impl Surface for ScriptedSurface {
    async fn ask_user(
        &self,
        question: &str,
        anchor: Option<&Anchor>,
    ) -> std::result::Result<String, SurfaceError> {
        self.questions
            .lock()
            .unwrap()
            .push((question.to_owned(), anchor.cloned()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(SurfaceError::Closed)
    }

    fn show_response(
        &self,
        agent: &str,
        _content: &str,
        parent: Option<&Anchor>,
    ) -> Option<Anchor> {
        let mut shown = self.shown.lock().unwrap();
        shown.push((agent.to_owned(), parent.cloned()));
        Some(Anchor::new(format!("{agent}-{}", shown.len())))
    }
}

struct SilentSurface;

#[async_trait]
impl Surface for SilentSurface {
    async fn ask_user(
        &self,
        _question: &str,
        _anchor: Option<&Anchor>,
    ) -> std::result::Result<String, SurfaceError> {
        pending().await
    }
}

fn provider<const N: usize>(responses: [PresetResponse; N]) -> ScriptedModelProvider {
    ScriptedModelProvider::from_responses(responses)
}

fn done(content: &str) -> PresetResponse {
    PresetResponse::text(json!({ "request": "done", "content": content }).to_string())
}

fn forward(agent: &str, content: &str) -> PresetResponse {
    PresetResponse::tool_call(
        "call:fwd",
        "forward",
        json!({ "agent": agent, "content": content }),
    )
}

fn sql_task(provider: &ScriptedModelProvider) -> Task {
    Task::new(
        AgentConfig::builder("sql")
            .with_tool(ToolKind::RunQuery)
            .build(),
        ModelClient::new(provider.clone()),
    )
    .with_tools(Arc::new(ToolRegistry::new().with_tool(CountQuery)))
}

/// Returns the text of a message fed back to the agent.
fn feedback_text(message: ModelMessage) -> String {
    match message {
        ModelMessage::User(text) => text,
        ModelMessage::Tool(result) => result.content,
        other => panic!("expected feedback, got {other:?}"),
    }
}

fn last_message(provider: &ScriptedModelProvider) -> ModelMessage {
    provider
        .requests()
        .last()
        .and_then(|req| req.messages.last().cloned())
        .unwrap()
}

#[tokio::test]
async fn test_tool_result_is_fed_back() {
    let provider = provider([
        PresetResponse::tool_call(
            "call:1",
            "run_query",
            json!({ "query": "SELECT COUNT(*) FROM customers" }),
        ),
        done("There are 42 customers."),
    ]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(sql_task(&provider));

    let answer = Runner::run(&mut tree, root, "How many customers?")
        .await
        .unwrap();
    assert_eq!(answer, "There are 42 customers.");
    assert_eq!(
        last_message(&provider),
        ModelMessage::Tool(ToolCallResult {
            id: "call:1".to_owned(),
            content: "count: 42".to_owned(),
        })
    );
    assert!(tree.task(root).unwrap().agent().flags().used_tool);
}

#[tokio::test]
async fn test_tool_error_is_fed_back() {
    let provider = provider([
        PresetResponse::text(
            json!({ "request": "run_query", "query": "SELECT * FROM nope" }).to_string(),
        ),
        done("Nothing found."),
    ]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(sql_task(&provider));

    let answer = Runner::run(&mut tree, root, "What is in nope?").await.unwrap();
    assert_eq!(answer, "Nothing found.");
    assert_eq!(
        last_message(&provider),
        ModelMessage::User("no such table".to_owned())
    );
}

#[tokio::test]
async fn test_malformed_tool_consumes_one_turn() {
    let provider = provider([
        PresetResponse::text(r#"{"request": "run_query", "query": SELECT 1}"#),
        done("42"),
    ]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(sql_task(&provider).with_config(TaskConfig {
        max_turns: 2,
        ..TaskConfig::default()
    }));

    let answer = Runner::run(&mut tree, root, "How many?").await.unwrap();
    assert_eq!(answer, "42");
    let ModelMessage::User(retry) = last_message(&provider) else {
        panic!("expected a retry message");
    };
    assert!(retry.contains("could not be understood"));
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test]
async fn test_ambiguous_task_reply_gets_done_instruction() {
    let provider = provider([PresetResponse::text("There are 42."), done("42")]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(sql_task(&provider));

    Runner::run(&mut tree, root, "How many?").await.unwrap();
    let ModelMessage::User(retry) = last_message(&provider) else {
        panic!("expected a retry message");
    };
    assert!(retry.contains("`done`"));
    assert!(!retry.contains("@User"));
}

#[tokio::test]
async fn test_turn_budget() {
    let provider = provider([
        PresetResponse::text("Thinking."),
        PresetResponse::text("Still thinking."),
        PresetResponse::text("Almost there."),
        done("never reached"),
    ]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(sql_task(&provider).with_config(TaskConfig {
        max_turns: 3,
        ..TaskConfig::default()
    }));

    let err = Runner::run(&mut tree, root, "How many?").await.unwrap_err();
    assert!(matches!(
        err,
        Error::TurnBudgetExceeded { ref task, budget: 3 } if task == "sql"
    ));
    assert_eq!(provider.requests().len(), 3);
}

#[tokio::test]
async fn test_chained_invocation() {
    let provider = provider([PresetResponse::tool_call(
        "call:1",
        "run_query",
        json!({ "query": "SELECT 1" }),
    )]);
    let mut tree = DelegationTree::new();
    let task = sql_task(&provider)
        .with_tools(Arc::new(ToolRegistry::new().with_tool(ShortCircuit)));
    let root = tree.insert(task);

    let answer = Runner::run(&mut tree, root, "Anything").await.unwrap();
    assert_eq!(answer, "cached: SELECT 1");
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_model_failure() {
    let mut tree = DelegationTree::new();
    let root = tree.insert(sql_task(&ScriptedModelProvider::default()));

    let err = Runner::run(&mut tree, root, "Hi").await.unwrap_err();
    assert!(matches!(err, Error::Llm { .. }));
}

#[tokio::test]
async fn test_delegation_to_child() {
    let lead = provider([
        forward("sql", "Count the customers."),
        done("We have 42 customers."),
    ]);
    let analyst = provider([done("42")]);

    let mut tree = DelegationTree::new();
    let root = tree.insert(Task::new(
        AgentConfig::builder("lead").build(),
        ModelClient::new(lead.clone()),
    ));
    let child = tree.insert(sql_task(&analyst));
    tree.attach(root, child).unwrap();

    let answer = Runner::run(&mut tree, root, "How many customers?")
        .await
        .unwrap();
    assert_eq!(answer, "We have 42 customers.");
    assert_eq!(last_message(&lead), ModelMessage::User("42".to_owned()));
    assert_eq!(
        analyst.requests()[0].messages.last(),
        Some(&ModelMessage::User("Count the customers.".to_owned()))
    );
}

#[tokio::test]
async fn test_forward_to_parent_concludes() {
    let lead = provider([forward("sql", "Count."), done("done")]);
    let analyst = provider([forward("Lead", "It is 42.")]);

    let mut tree = DelegationTree::new();
    let root = tree.insert(Task::new(
        AgentConfig::builder("lead").build(),
        ModelClient::new(lead.clone()),
    ));
    let child = tree.insert(sql_task(&analyst));
    tree.attach(root, child).unwrap();

    Runner::run(&mut tree, root, "How many?").await.unwrap();
    assert_eq!(last_message(&lead), ModelMessage::User("It is 42.".to_owned()));
}

#[tokio::test]
async fn test_unknown_recipient_is_retried() {
    let provider = provider([forward("finance", "Help"), done("42")]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(sql_task(&provider));

    Runner::run(&mut tree, root, "How many?").await.unwrap();
    let messages = &provider.requests()[1].messages;
    let results: Vec<_> = messages
        .iter()
        .filter_map(|message| match message {
            ModelMessage::Tool(result) => Some(result.content.as_str()),
            _ => None,
        })
        .collect();
    // The forward is answered once, with the retry and no delivery note.
    assert_eq!(results.len(), 1);
    assert!(!results[0].contains("delivered"));
    let retry = feedback_text(last_message(&provider));
    assert!(retry.contains("`finance`"));
    assert!(retry.contains("User"));
}

#[tokio::test]
async fn test_known_recipient_is_acknowledged() {
    let lead = provider([forward("sql", "Count."), done("42 it is")]);
    let analyst = provider([done("42")]);

    let mut tree = DelegationTree::new();
    let root = tree.insert(Task::new(
        AgentConfig::builder("lead").build(),
        ModelClient::new(lead.clone()),
    ));
    let child = tree.insert(sql_task(&analyst));
    tree.attach(root, child).unwrap();

    Runner::run(&mut tree, root, "How many?").await.unwrap();
    let messages = &lead.requests()[1].messages;
    assert_eq!(
        messages[messages.len() - 2..],
        [
            ModelMessage::Tool(ToolCallResult {
                id: "call:fwd".to_owned(),
                content: "delivered to sql".to_owned(),
            }),
            ModelMessage::User("42".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_non_interactive_forward_to_user_concludes() {
    let provider = provider([forward("User", "Which region?")]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(sql_task(&provider));

    let answer = Runner::run(&mut tree, root, "Sales?").await.unwrap();
    assert_eq!(answer, "Which region?");
}

#[tokio::test]
async fn test_interactive_conversation() {
    let provider = provider([PresetResponse::text("Which region?"), done("EMEA: 7")]);
    let surface = ScriptedSurface::with_replies(["EMEA"]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(
        sql_task(&provider)
            .with_config(TaskConfig::interactive())
            .with_surface(surface.clone()),
    );

    let answer = Runner::run(&mut tree, root, "Sales?").await.unwrap();
    assert_eq!(answer, "EMEA: 7");
    // A root task has no parent step to nest under.
    assert_eq!(
        *surface.questions.lock().unwrap(),
        [("Which region?".to_owned(), None)]
    );
    assert_eq!(tree.anchor(root), Some(&Anchor::new("sql-1")));
    assert_eq!(last_message(&provider), ModelMessage::User("EMEA".to_owned()));
}

#[tokio::test]
async fn test_child_question_is_nested_under_parent() {
    let lead = provider([forward("sql", "Count.")]);
    let analyst = provider([PresetResponse::tool_call(
        "call:ask",
        "forward",
        json!({ "agent": "User", "content": "Which year?" }),
    )]);
    let surface = ScriptedSurface::with_replies([]);

    let mut tree = DelegationTree::new();
    let root = tree.insert(Task::new(
        AgentConfig::builder("lead").build(),
        ModelClient::new(lead),
    ));
    let child = tree.insert(
        sql_task(&analyst).with_config(TaskConfig::interactive()),
    );
    tree.attach(root, child).unwrap();
    tree.inject_surface(root, surface.clone()).unwrap();
    tree.set_anchor(root, Anchor::new("lead-step")).unwrap();

    let err = Runner::run(&mut tree, root, "How many?").await.unwrap_err();
    // The surface had no reply left, which reads as a closed input.
    assert!(matches!(err, Error::UserCancelled));
    assert_eq!(
        *surface.questions.lock().unwrap(),
        [("Which year?".to_owned(), Some(Anchor::new("lead-step")))]
    );
}

#[tokio::test]
async fn test_child_steps_nest_under_parent_step() {
    let lead = provider([PresetResponse::text(
        "Let me ask the SQL expert.\n```json\n{\"request\": \"forward\", \"agent\": \"sql\", \"content\": \"Count.\"}\n```",
    )]);
    let analyst = provider([PresetResponse::text("Which year?")]);
    let surface = ScriptedSurface::with_replies([]);

    let mut tree = DelegationTree::new();
    let root = tree.insert(Task::new(
        AgentConfig::builder("lead").build(),
        ModelClient::new(lead),
    ));
    let child = tree.insert(
        sql_task(&analyst).with_config(TaskConfig::interactive()),
    );
    tree.attach(root, child).unwrap();
    tree.inject_surface(root, surface.clone()).unwrap();

    let err = Runner::run(&mut tree, root, "How many?").await.unwrap_err();
    assert!(matches!(err, Error::UserCancelled));
    let lead_step = Anchor::new("lead-1");
    assert_eq!(
        *surface.shown.lock().unwrap(),
        [
            ("lead".to_owned(), None),
            ("sql".to_owned(), Some(lead_step.clone())),
        ]
    );
    assert_eq!(
        *surface.questions.lock().unwrap(),
        [("Which year?".to_owned(), Some(lead_step))]
    );
    assert_eq!(tree.anchor(child), Some(&Anchor::new("sql-2")));
}

#[tokio::test]
async fn test_user_exit_cancels_whole_branch() {
    let lead = provider([forward("sql", "Count."), done("unreachable")]);
    let analyst = provider([PresetResponse::text("Which year?")]);
    let surface = ScriptedSurface::with_replies(["q"]);

    let mut tree = DelegationTree::new();
    let root = tree.insert(Task::new(
        AgentConfig::builder("lead").build(),
        ModelClient::new(lead.clone()),
    ));
    let child = tree.insert(
        sql_task(&analyst).with_config(TaskConfig::interactive()),
    );
    tree.attach(root, child).unwrap();
    tree.inject_surface(root, surface).unwrap();

    let err = Runner::run(&mut tree, root, "How many?").await.unwrap_err();
    assert!(matches!(err, Error::UserCancelled));
    assert!(err.is_user_abort());
    assert_eq!(lead.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_timeout() {
    let provider = provider([PresetResponse::text("Which region?")]);
    let mut tree = DelegationTree::new();
    let root = tree.insert(
        sql_task(&provider)
            .with_config(TaskConfig {
                user_timeout: Duration::from_secs(5),
                ..TaskConfig::interactive()
            })
            .with_surface(Arc::new(SilentSurface)),
    );

    let err = Runner::run(&mut tree, root, "Sales?").await.unwrap_err();
    assert!(matches!(err, Error::UserTimeout));
}
