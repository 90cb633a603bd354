//! Wire protocol messages
//!
//! The client speaks a line-delimited JSON protocol: one serde-tagged
//! request per line, one response per line, strictly request/response with
//! a single outstanding request per connection. The engine itself stays a
//! black box; these types are only the client's side of the conversation.

use serde::{Deserialize, Serialize};
use sqlflite_core::{ColumnMeta, QueryPlan, SqlfliteError, TableSchema, Value};

/// Client-to-engine message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Open the session; must be the first message on a connection
    Hello { username: String, password: String },
    /// Ask for the catalog's table names
    ListTables,
    /// Ask for one table's schema
    GetSchema { table: String },
    /// Run a logical plan and return the full result
    Execute { plan: QueryPlan },
    /// Close the session; best-effort
    Goodbye,
}

/// Engine-to-client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Handshake accepted
    HelloAck { server_version: String },
    /// Catalog table names
    Tables { names: Vec<String> },
    /// One table's schema
    Schema { schema: TableSchema },
    /// A fully materialized query result
    Result {
        columns: Vec<ColumnMeta>,
        rows: Vec<Vec<Value>>,
        execution_time_ms: u64,
        warnings: Vec<String>,
    },
    /// Any failure; `kind` maps onto the client error taxonomy
    Error { kind: ErrorKind, message: String },
}

/// Remote failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected during the handshake
    Auth,
    /// Unknown table
    NotFound,
    /// Unknown column in a shipped plan
    Reference,
    /// The engine failed while evaluating the plan
    Execution,
    /// The engine could not understand the request
    Protocol,
}

impl ErrorKind {
    /// Map a remote error onto the client taxonomy
    pub fn into_error(self, message: String) -> SqlfliteError {
        match self {
            ErrorKind::Auth => {
                SqlfliteError::Connection(format!("authentication failed: {}", message))
            }
            ErrorKind::NotFound => SqlfliteError::NotFound(message),
            ErrorKind::Reference => SqlfliteError::Reference(message),
            ErrorKind::Execution => SqlfliteError::Execution(message),
            ErrorKind::Protocol => SqlfliteError::Connection(message),
        }
    }
}
