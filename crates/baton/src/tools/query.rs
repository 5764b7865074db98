use std::collections::HashMap;
use std::sync::Arc;

use baton_core::tool::{Error as ToolError, RunQuery, Tool, ToolResult};
use serde::Deserialize;

/// Leading line of the message sent back for a query that failed.
pub const SQL_ERROR_MSG: &str = "There was an error in your SQL Query";

/// Query results recorded ahead of time.
///
/// Queries are matched with whitespace collapsed, case folded and a
/// trailing `;` ignored, so `select  count(*) from sales;` finds the result
/// recorded for `SELECT COUNT(*) FROM sales`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "HashMap<String, String>")]
pub struct CannedQueries {
    results: HashMap<String, String>,
}

impl CannedQueries {
    /// Creates an empty set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of `query`.
    #[inline]
    pub fn with_result<Q, R>(mut self, query: Q, result: R) -> Self
    where
        Q: AsRef<str>,
        R: Into<String>,
    {
        self.insert(query, result);
        self
    }

    /// Records the result of `query`, replacing any earlier one.
    pub fn insert<Q, R>(&mut self, query: Q, result: R)
    where
        Q: AsRef<str>,
        R: Into<String>,
    {
        self.results.insert(normalize(query.as_ref()), result.into());
    }

    /// Returns the recorded result of `query`.
    #[inline]
    pub fn lookup(&self, query: &str) -> Option<&str> {
        self.results.get(&normalize(query)).map(String::as_str)
    }

    /// Returns the number of recorded queries.
    #[inline]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if nothing is recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<Q: AsRef<str>, R: Into<String>> FromIterator<(Q, R)> for CannedQueries {
    fn from_iter<I: IntoIterator<Item = (Q, R)>>(iter: I) -> Self {
        let mut queries = Self::new();
        for (query, result) in iter {
            queries.insert(query, result);
        }
        queries
    }
}

impl From<HashMap<String, String>> for CannedQueries {
    #[inline]
    fn from(results: HashMap<String, String>) -> Self {
        results.into_iter().collect()
    }
}

fn normalize(query: &str) -> String {
    query
        .trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A tool answering `run_query` from [`CannedQueries`].
pub struct RunQueryTool {
    queries: Arc<CannedQueries>,
}

impl RunQueryTool {
    /// Creates the tool.
    #[inline]
    pub fn new(queries: Arc<CannedQueries>) -> Self {
        Self { queries }
    }
}

impl Tool for RunQueryTool {
    type Input = RunQuery;

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: RunQuery,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let queries = Arc::clone(&self.queries);
        async move {
            info!("executing SQL query: {}", input.query);
            match queries.lookup(&input.query) {
                Some("") => Ok("Query executed successfully.".into()),
                Some(rows) => Ok(rows.into()),
                None => {
                    error!("SQL query failed: {}", input.query);
                    Err(ToolError::execution_error().with_reason(format!(
                        "{SQL_ERROR_MSG}: '{}'\n\
                         no table or column matches this query\n\
                         Run a new query, correcting the errors.",
                        input.query
                    )))
                }
            }
        }
    }
}
