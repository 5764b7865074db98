//! Tools answering from a recorded database: a schema catalog and canned
//! query results.

mod query;
mod schema;

use std::sync::Arc;

use baton_core::ToolRegistry;

pub use query::{CannedQueries, RunQueryTool, SQL_ERROR_MSG};
pub use schema::{
    ColumnDescriptionsTool, SchemaCatalog, TableInfo, TableNamesTool,
    TableSchemaTool,
};

/// Creates a registry serving every data tool from `catalog` and `queries`.
pub fn registry(catalog: SchemaCatalog, queries: CannedQueries) -> ToolRegistry {
    let catalog = Arc::new(catalog);
    ToolRegistry::new()
        .with_tool(RunQueryTool::new(Arc::new(queries)))
        .with_tool(TableNamesTool::new(Arc::clone(&catalog)))
        .with_tool(TableSchemaTool::new(Arc::clone(&catalog)))
        .with_tool(ColumnDescriptionsTool::new(catalog))
}
