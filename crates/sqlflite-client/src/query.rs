//! Query handles
//!
//! A [`TableHandle`] references a remote table without holding any of its
//! data; [`Query`] binds an immutable plan to a session. Every builder step
//! returns a new value and validates eagerly against the table schema;
//! only [`Query::execute`] talks to the engine.

use crate::session::Session;
use sqlflite_core::{Aggregate, Expr, QueryPlan, Result, ResultSet, TableSchema};

/// Reference to a named remote table
#[derive(Clone)]
pub struct TableHandle {
    session: Session,
    schema: TableSchema,
}

impl TableHandle {
    pub(crate) fn new(session: Session, schema: TableSchema) -> Self {
        Self { session, schema }
    }

    /// The table name
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// The table's schema as reported by the catalog
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Start a query over this table
    pub fn query(&self) -> Query {
        Query {
            session: self.session.clone(),
            plan: QueryPlan::scan(&self.schema),
        }
    }

    /// Shorthand for `query().filter(predicate)`
    pub fn filter(&self, predicate: Expr) -> Result<Query> {
        self.query().filter(predicate)
    }
}

impl std::fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableHandle")
            .field("schema", &self.schema)
            .finish()
    }
}

/// An immutable query bound to a session
///
/// Cloning is cheap; a partial query can be extended along independent
/// branches without the branches affecting one another.
#[derive(Clone)]
pub struct Query {
    session: Session,
    plan: QueryPlan,
}

impl Query {
    /// Restrict rows to those matching a boolean predicate
    pub fn filter(self, predicate: Expr) -> Result<Self> {
        Ok(Self {
            plan: self.plan.filter(predicate)?,
            session: self.session,
        })
    }

    /// Add a derived column computed from existing columns
    ///
    /// Later calls may reference columns defined by earlier ones; a
    /// reference to an undefined name fails here, not on the engine.
    pub fn mutate(self, name: impl Into<String>, expr: Expr) -> Result<Self> {
        Ok(Self {
            plan: self.plan.mutate(name, expr)?,
            session: self.session,
        })
    }

    /// Set the grouping keys for the aggregate step
    pub fn group_by<I, S>(self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            plan: self.plan.group_by(keys)?,
            session: self.session,
        })
    }

    /// Add an aggregate output column
    pub fn aggregate(self, name: impl Into<String>, agg: Aggregate) -> Result<Self> {
        Ok(Self {
            plan: self.plan.aggregate(name, agg)?,
            session: self.session,
        })
    }

    /// Sort the output ascending and stably by the given keys
    pub fn order_by<I, S>(self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            plan: self.plan.order_by(keys)?,
            session: self.session,
        })
    }

    /// The logical plan built so far
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Submit the plan and block until the engine returns the full result
    ///
    /// This is the only step that touches the network. Remote failures map
    /// onto the client taxonomy by kind; connection loss mid-query is an
    /// execution error.
    pub async fn execute(&self) -> Result<ResultSet> {
        self.session.transport().execute(&self.plan).await
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("plan", &self.plan).finish()
    }
}
