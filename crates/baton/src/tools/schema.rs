use std::collections::BTreeMap;
use std::sync::Arc;

use baton_core::tool::{
    Error as ToolError, GetColumnDescriptions, GetTableNames, GetTableSchema,
    Tool, ToolResult,
};
use serde::{Deserialize, Serialize};

/// What is known about one table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// What the table holds.
    #[serde(default)]
    pub description: String,
    /// Column names mapped to their descriptions.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

impl TableInfo {
    /// Creates a table without columns.
    #[inline]
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            description: description.into(),
            columns: BTreeMap::new(),
        }
    }

    /// Adds a column.
    #[inline]
    pub fn with_column<K, V>(mut self, name: K, description: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.columns.insert(name.into(), description.into());
        self
    }
}

/// Descriptions of the tables of a database, keyed by table name.
///
/// In scripts this is a JSON object such as
/// `{"sales": {"description": "...", "columns": {"amount": "..."}}}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaCatalog {
    tables: BTreeMap<String, TableInfo>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    #[inline]
    pub fn with_table<S: Into<String>>(mut self, name: S, info: TableInfo) -> Self {
        self.tables.insert(name.into(), info);
        self
    }

    /// Returns the table called `name`.
    #[inline]
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name.trim())
    }

    /// Returns the table names in alphabetical order.
    #[inline]
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Returns `true` if no table is described.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn describe(name: &str, info: &TableInfo) -> String {
        let columns: Vec<_> = info
            .columns
            .iter()
            .map(|(column, description)| format!("{column} ({description})"))
            .collect();
        let mut line = name.to_owned();
        if !info.description.is_empty() {
            line.push_str(": ");
            line.push_str(&info.description);
        }
        if !columns.is_empty() {
            line.push_str(" | columns: ");
            line.push_str(&columns.join(", "));
        }
        line
    }
}

fn invalid_table(name: &str) -> String {
    format!("`{}` is not a valid table name", name.trim())
}

/// A tool listing the tables of a [`SchemaCatalog`].
pub struct TableNamesTool {
    catalog: Arc<SchemaCatalog>,
}

impl TableNamesTool {
    /// Creates the tool.
    #[inline]
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }
}

impl Tool for TableNamesTool {
    type Input = GetTableNames;

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        _input: GetTableNames,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let catalog = Arc::clone(&self.catalog);
        async move {
            if catalog.is_empty() {
                return Ok("The database has no tables.".into());
            }
            Ok(catalog.table_names().collect::<Vec<_>>().join(", ").into())
        }
    }
}

/// A tool describing whole tables of a [`SchemaCatalog`].
pub struct TableSchemaTool {
    catalog: Arc<SchemaCatalog>,
}

impl TableSchemaTool {
    /// Creates the tool.
    #[inline]
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }
}

impl Tool for TableSchemaTool {
    type Input = GetTableSchema;

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: GetTableSchema,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let catalog = Arc::clone(&self.catalog);
        async move {
            if input.tables.is_empty() {
                return Err(ToolError::invalid_input()
                    .with_reason("`tables` must name at least one table"));
            }
            // Unknown tables are reported inline so the known ones still get
            // described.
            let lines: Vec<_> = input
                .tables
                .iter()
                .map(|name| match catalog.table(name) {
                    Some(info) => SchemaCatalog::describe(name.trim(), info),
                    None => invalid_table(name),
                })
                .collect();
            Ok(lines.join("\n").into())
        }
    }
}

/// A tool describing some columns of one table of a [`SchemaCatalog`].
pub struct ColumnDescriptionsTool {
    catalog: Arc<SchemaCatalog>,
}

impl ColumnDescriptionsTool {
    /// Creates the tool.
    #[inline]
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }
}

impl Tool for ColumnDescriptionsTool {
    type Input = GetColumnDescriptions;

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: GetColumnDescriptions,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let catalog = Arc::clone(&self.catalog);
        async move {
            let table = input.table.trim();
            let Some(info) = catalog.table(table) else {
                return Err(ToolError::invalid_input().with_reason(invalid_table(table)));
            };

            let mut result = format!("TABLE: {table}");
            let mut described = 0;
            for column in input.columns.split(',').map(str::trim) {
                if column.is_empty() {
                    continue;
                }
                let Some(description) = info.columns.get(column) else {
                    return Err(ToolError::invalid_input().with_reason(format!(
                        "`{column}` is not a column of `{table}`"
                    )));
                };
                result.push_str(&format!("\n{column} => {description}"));
                described += 1;
            }
            if described == 0 {
                return Err(ToolError::invalid_input()
                    .with_reason("`columns` must name at least one column"));
            }
            Ok(result.into())
        }
    }
}
