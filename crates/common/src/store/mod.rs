//! Graph store boundary
//!
//! The reasoning core only ever sends read-only Cypher text and reads back
//! rows keyed by column alias.

mod neo4j;

pub use neo4j::Neo4jStore;

use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One result row, column alias -> scalar or list-of-maps value
pub type Row = serde_json::Map<String, Value>;

/// Read-only access to a populated graph store
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run one query and return all rows
    async fn execute(&self, query: &str) -> Result<Vec<Row>>;

    /// Cheap liveness check
    async fn ping(&self) -> Result<()> {
        self.execute("RETURN 1 AS ok").await.map(|_| ())
    }

    /// Backend name for logs and metrics
    fn backend(&self) -> &str;
}

/// String value of a column, if present and a string
pub fn row_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}
