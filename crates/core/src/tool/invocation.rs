use std::fmt::{self, Display};

use baton_model::{ModelTool, ToolCallRequest};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Every kind of tool an agent can invoke.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Runs a query against the data backend.
    RunQuery,
    /// Lists the tables of the data backend.
    GetTableNames,
    /// Describes some tables.
    GetTableSchema,
    /// Describes some columns of a table.
    GetColumnDescriptions,
    /// Concludes the task with a final answer.
    Done,
    /// Hands the conversation to the user or another agent.
    Forward,
}

impl ToolKind {
    /// All kinds, in declaration order.
    pub const ALL: [ToolKind; 6] = [
        ToolKind::RunQuery,
        ToolKind::GetTableNames,
        ToolKind::GetTableSchema,
        ToolKind::GetColumnDescriptions,
        ToolKind::Done,
        ToolKind::Forward,
    ];

    /// Returns the name used in the `request` field.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::RunQuery => "run_query",
            ToolKind::GetTableNames => "get_table_names",
            ToolKind::GetTableSchema => "get_table_schema",
            ToolKind::GetColumnDescriptions => "get_column_descriptions",
            ToolKind::Done => "done",
            ToolKind::Forward => "forward",
        }
    }

    /// Looks a kind up by its request name.
    #[inline]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Returns `true` for `done` and `forward`, which steer the
    /// conversation and are handled by the task runner itself.
    #[inline]
    pub fn is_orchestration(self) -> bool {
        matches!(self, ToolKind::Done | ToolKind::Forward)
    }

    /// Returns `true` for the tools describing the database layout.
    #[inline]
    pub fn is_schema(self) -> bool {
        matches!(
            self,
            ToolKind::GetTableNames
                | ToolKind::GetTableSchema
                | ToolKind::GetColumnDescriptions
        )
    }

    /// Returns the default description shown to the model.
    pub fn description(self) -> &'static str {
        match self {
            ToolKind::RunQuery => {
                "Run a SQL query against the database and get the resulting rows."
            }
            ToolKind::GetTableNames => "List the names of all tables.",
            ToolKind::GetTableSchema => {
                "Get the columns and descriptions of the given tables."
            }
            ToolKind::GetColumnDescriptions => {
                "Get descriptions of some comma-separated columns of a table."
            }
            ToolKind::Done => {
                "Finish the task, with `content` set to the final answer."
            }
            ToolKind::Forward => {
                "Pass the conversation to another agent, or to `User`."
            }
        }
    }

    /// Returns the JSON schema of the kind's payload.
    pub fn parameter_schema(self) -> Value {
        let schema = match self {
            ToolKind::RunQuery => schema_for!(RunQuery),
            ToolKind::GetTableNames => schema_for!(GetTableNames),
            ToolKind::GetTableSchema => schema_for!(GetTableSchema),
            ToolKind::GetColumnDescriptions => {
                schema_for!(GetColumnDescriptions)
            }
            ToolKind::Done => schema_for!(Done),
            ToolKind::Forward => schema_for!(Forward),
        };
        schema.to_value()
    }

    /// Returns the definition advertised to the model.
    #[inline]
    pub fn definition(self) -> ModelTool {
        ModelTool {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameter_schema(),
        }
    }
}

impl Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of `run_query`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunQuery {
    /// The SQL to run.
    #[schemars(description = "The SQL query to run.")]
    pub query: String,
}

/// Payload of `get_table_names`.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct GetTableNames {}

/// Payload of `get_table_schema`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GetTableSchema {
    /// Tables to describe.
    #[schemars(description = "Names of the tables to describe.")]
    pub tables: Vec<String>,
}

/// Payload of `get_column_descriptions`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GetColumnDescriptions {
    /// The table the columns belong to.
    #[schemars(description = "The table the columns belong to.")]
    pub table: String,
    /// Comma-separated column names.
    #[schemars(description = "Comma-separated column names.")]
    pub columns: String,
}

/// Payload of `done`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Done {
    /// The final answer.
    #[schemars(description = "The final answer or result.")]
    pub content: String,
}

/// Payload of `forward`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Forward {
    /// The recipient: `User` or the name of another agent.
    #[schemars(description = "Who to pass the conversation to, e.g. `User`.")]
    pub agent: String,
    /// What to send. The surrounding reply text is used when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "The message to pass along.")]
    pub content: Option<String>,
}

/// A structured action request emitted by an agent instead of free text.
///
/// On the wire this is a JSON object whose `request` field names the
/// kind, e.g. `{"request": "run_query", "query": "SELECT 1"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ToolInvocation {
    /// See [`RunQuery`].
    RunQuery(RunQuery),
    /// See [`GetTableNames`].
    GetTableNames(GetTableNames),
    /// See [`GetTableSchema`].
    GetTableSchema(GetTableSchema),
    /// See [`GetColumnDescriptions`].
    GetColumnDescriptions(GetColumnDescriptions),
    /// See [`Done`].
    Done(Done),
    /// See [`Forward`].
    Forward(Forward),
}

impl ToolInvocation {
    /// Returns the kind of this invocation.
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolInvocation::RunQuery(_) => ToolKind::RunQuery,
            ToolInvocation::GetTableNames(_) => ToolKind::GetTableNames,
            ToolInvocation::GetTableSchema(_) => ToolKind::GetTableSchema,
            ToolInvocation::GetColumnDescriptions(_) => {
                ToolKind::GetColumnDescriptions
            }
            ToolInvocation::Done(_) => ToolKind::Done,
            ToolInvocation::Forward(_) => ToolKind::Forward,
        }
    }

    /// Looks for an invocation embedded in a text reply.
    ///
    /// Returns `Ok(None)` for plain prose, including code snippets. A
    /// payload mentioning `"request"` that doesn't parse or names an unknown
    /// kind, or a ```` ```json ```` block holding an object without a
    /// `request` field, is reported as [`Error::MalformedTool`].
    pub fn from_text(text: &str) -> Result<Option<Self>> {
        let trimmed = text.trim();
        let Some((start, end)) = json_span(trimmed) else {
            return Ok(None);
        };
        let candidate = &trimmed[start..end];
        let mentions_request = candidate.contains("\"request\"");
        let json_fenced = trimmed[..start].trim_end().ends_with("```json");

        let value: Value = match serde_json::from_str(candidate) {
            Ok(value) => value,
            Err(err) if mentions_request => {
                return Err(Error::MalformedTool(format!(
                    "the JSON could not be parsed: {err}"
                )));
            }
            Err(_) => return Ok(None),
        };
        match &value {
            Value::Object(object) if object.contains_key("request") => {
                Self::from_value(value).map(Some)
            }
            Value::Object(_) if mentions_request || json_fenced => {
                Err(Error::MalformedTool(
                    "the JSON object has no `request` field".to_owned(),
                ))
            }
            _ => Ok(None),
        }
    }

    /// Converts a structured tool call emitted by the model.
    pub fn from_call(call: &ToolCallRequest) -> Result<Self> {
        let mut object = match &call.arguments {
            Value::Object(object) => object.clone(),
            Value::Null => Map::new(),
            // Some providers deliver the arguments as a JSON string.
            Value::String(raw) => match serde_json::from_str(raw) {
                Ok(Value::Object(object)) => object,
                _ => {
                    return Err(Error::MalformedTool(format!(
                        "arguments of `{}` are not a JSON object",
                        call.name
                    )));
                }
            },
            _ => {
                return Err(Error::MalformedTool(format!(
                    "arguments of `{}` are not a JSON object",
                    call.name
                )));
            }
        };
        object.insert("request".to_owned(), Value::String(call.name.clone()));
        Self::from_value(Value::Object(object))
    }

    fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|err| Error::MalformedTool(err.to_string()))
    }
}

/// Returns `text` with its embedded JSON object (and any code fence around
/// it) removed.
pub(crate) fn strip_json(text: &str) -> String {
    let trimmed = text.trim();
    let Some((start, end)) = json_span(trimmed) else {
        return trimmed.to_owned();
    };
    let before = trimmed[..start].trim_end();
    let before = before
        .strip_suffix("```json")
        .or_else(|| before.strip_suffix("```"))
        .unwrap_or(before);
    let after = trimmed[end..].trim_start();
    let after = after.strip_prefix("```").unwrap_or(after);
    format!("{} {}", before.trim(), after.trim())
        .trim()
        .to_owned()
}

fn json_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then_some((start, end + 1))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_plain_text_is_not_a_tool() {
        assert_eq!(
            ToolInvocation::from_text("There are 42 customers.").unwrap(),
            None
        );
        assert_eq!(
            ToolInvocation::from_text("The set {a, b} has two items.").unwrap(),
            None
        );
    }

    #[test]
    fn test_code_snippets_are_not_tools() {
        for text in [
            "```python\nlimits = {\"emea\": 10}\n```\nUse this mapping.",
            "```\nfn main() { println!(\"hi\"); }\n```",
            r#"{"emea": 10, "apac": 4}"#,
        ] {
            assert_eq!(ToolInvocation::from_text(text).unwrap(), None, "{text}");
        }
    }

    #[test]
    fn test_embedded_invocation() {
        let text = r#"I'll count them.
```json
{"request": "run_query", "query": "SELECT COUNT(*) FROM customers"}
```"#;
        let invocation = ToolInvocation::from_text(text).unwrap().unwrap();
        assert_eq!(
            invocation,
            ToolInvocation::RunQuery(RunQuery {
                query: "SELECT COUNT(*) FROM customers".to_owned()
            })
        );
        assert_eq!(strip_json(text), "I'll count them.");
    }

    #[test]
    fn test_malformed_payloads() {
        for text in [
            r#"{"request": "run_query", "query": }"#,
            "```json\n{\"query\": \"SELECT 1\"}\n```",
            r#"{"request": "drop_everything"}"#,
            r#"{"request": "get_table_schema", "tables": "sales"}"#,
            r#"Sure: {"request": "run_query"}"#,
        ] {
            let err = ToolInvocation::from_text(text).unwrap_err();
            assert!(matches!(err, Error::MalformedTool(_)), "{text}");
        }
    }

    #[test]
    fn test_empty_payload_kind() {
        let invocation =
            ToolInvocation::from_text(r#"{"request": "get_table_names"}"#)
                .unwrap()
                .unwrap();
        assert_eq!(invocation.kind(), ToolKind::GetTableNames);
    }

    #[test]
    fn test_from_call() {
        let call = ToolCallRequest {
            id: "call:1".to_owned(),
            name: "forward".to_owned(),
            arguments: json!({ "agent": "User" }),
        };
        assert_eq!(
            ToolInvocation::from_call(&call).unwrap(),
            ToolInvocation::Forward(Forward {
                agent: "User".to_owned(),
                content: None,
            })
        );

        let call = ToolCallRequest {
            id: "call:2".to_owned(),
            name: "done".to_owned(),
            arguments: Value::String(r#"{"content": "42"}"#.to_owned()),
        };
        assert_eq!(ToolInvocation::from_call(&call).unwrap().kind(), ToolKind::Done);

        let call = ToolCallRequest {
            id: "call:3".to_owned(),
            name: "run_query".to_owned(),
            arguments: json!(["SELECT 1"]),
        };
        assert!(ToolInvocation::from_call(&call).is_err());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                Value::String(kind.name().to_owned())
            );
            assert!(kind.parameter_schema().is_object());
        }
        assert_eq!(ToolKind::from_name("shell"), None);
    }
}
