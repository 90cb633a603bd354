//! Declarative query plans
//!
//! A [`QueryPlan`] is an immutable description of one aggregation pipeline
//! over a named table: filter, derive columns, group, aggregate, sort. Each
//! builder step consumes the plan and returns a new one, validating column
//! references and operator typing against the working schema as it goes, so
//! every error the client can catch is caught before the plan leaves the
//! process. No step performs I/O; only the session's execute does.

use crate::{Aggregate, ColumnMeta, DataType, Expr, Result, SqlfliteError, TableSchema};
use serde::{Deserialize, Serialize};

/// A derived column added by `mutate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    /// Output column name
    pub name: String,
    /// Defining expression, resolved in declaration order
    pub expr: Expr,
}

/// An aggregate output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateColumn {
    /// Output column name
    pub name: String,
    /// Reducer applied per group
    pub agg: Aggregate,
}

/// An immutable logical plan over one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Source table name
    pub table: String,
    /// Row filter, applied before derivation and grouping
    pub filter: Option<Expr>,
    /// Derived columns, in declaration order
    pub derived: Vec<DerivedColumn>,
    /// Grouping keys, in the order given
    pub group_by: Vec<String>,
    /// Aggregate outputs, in declaration order
    pub aggregates: Vec<AggregateColumn>,
    /// Sort keys over the output, ascending and stable
    pub order_by: Vec<String>,
    // Working schema for build-time validation; re-derived by whoever
    // deserializes the plan, so it never travels on the wire.
    #[serde(skip)]
    working: Vec<ColumnMeta>,
}

impl PartialEq for QueryPlan {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
            && self.filter == other.filter
            && self.derived == other.derived
            && self.group_by == other.group_by
            && self.aggregates == other.aggregates
            && self.order_by == other.order_by
    }
}

impl QueryPlan {
    /// Start a plan that scans the given table
    pub fn scan(schema: &TableSchema) -> Self {
        Self {
            table: schema.name.clone(),
            filter: None,
            derived: Vec::new(),
            group_by: Vec::new(),
            aggregates: Vec::new(),
            order_by: Vec::new(),
            working: schema.columns.clone(),
        }
    }

    /// Restrict rows to those matching a boolean predicate
    ///
    /// Successive filters are conjoined. The predicate may reference derived
    /// columns added by earlier `mutate` steps.
    pub fn filter(mut self, predicate: Expr) -> Result<Self> {
        self.ensure_not_aggregated("filter")?;
        let ty = predicate.infer_type(&self.working)?;
        if ty != DataType::Boolean {
            return Err(SqlfliteError::TypeMismatch(format!(
                "filter predicate must be boolean, got {}",
                ty
            )));
        }
        self.filter = Some(match self.filter.take() {
            Some(prior) => prior.and(predicate),
            None => predicate,
        });
        Ok(self)
    }

    /// Add a derived column computed from existing columns
    ///
    /// Definitions resolve in declaration order: a later `mutate` may
    /// reference a column defined by an earlier one, and a reference to a
    /// name that is not yet defined fails here, at build time.
    pub fn mutate(mut self, name: impl Into<String>, expr: Expr) -> Result<Self> {
        self.ensure_not_aggregated("mutate")?;
        let name = name.into();
        if self.working.iter().any(|c| c.name == name) {
            return Err(SqlfliteError::Reference(format!(
                "duplicate column '{}'",
                name
            )));
        }
        let ty = expr.infer_type(&self.working)?;
        self.working.push(ColumnMeta::new(name.clone(), ty));
        self.derived.push(DerivedColumn { name, expr });
        Ok(self)
    }

    /// Set the grouping keys for the aggregate step
    ///
    /// Key order carries through to the output column order; it does not
    /// affect which groups exist.
    pub fn group_by<I, S>(mut self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_not_aggregated("group_by")?;
        for key in keys {
            let key = key.into();
            if !self.working.iter().any(|c| c.name == key) {
                return Err(SqlfliteError::Reference(key));
            }
            if self.group_by.contains(&key) {
                return Err(SqlfliteError::Reference(format!(
                    "duplicate grouping key '{}'",
                    key
                )));
            }
            self.group_by.push(key);
        }
        Ok(self)
    }

    /// Add an aggregate output column
    ///
    /// Requires a prior `group_by`. The output schema becomes the grouping
    /// keys followed by the aggregates in declaration order.
    pub fn aggregate(mut self, name: impl Into<String>, agg: Aggregate) -> Result<Self> {
        if self.group_by.is_empty() {
            return Err(SqlfliteError::Unsupported(
                "aggregate requires a prior group_by".into(),
            ));
        }
        let name = name.into();
        if self.group_by.contains(&name) || self.aggregates.iter().any(|a| a.name == name) {
            return Err(SqlfliteError::Reference(format!(
                "duplicate column '{}'",
                name
            )));
        }
        agg.infer_type(&self.working)?;
        self.aggregates.push(AggregateColumn { name, agg });
        Ok(self)
    }

    /// Sort the output ascending by the given keys
    ///
    /// The sort is stable: rows with equal keys keep the order the
    /// aggregation step produced them in. Keys must exist in the plan's
    /// output schema; a repeated key is rejected.
    pub fn order_by<I, S>(mut self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let output = self.output_schema();
        for key in keys {
            let key = key.into();
            if !output.iter().any(|c| c.name == key) {
                return Err(SqlfliteError::Reference(key));
            }
            if self.order_by.contains(&key) {
                return Err(SqlfliteError::Reference(format!(
                    "duplicate sort key '{}'",
                    key
                )));
            }
            self.order_by.push(key);
        }
        Ok(self)
    }

    /// The shape of the plan's result
    ///
    /// Before an aggregate step this is the working schema (table columns
    /// plus derived columns); afterwards it is the grouping keys followed by
    /// the aggregate columns.
    pub fn output_schema(&self) -> Vec<ColumnMeta> {
        if self.aggregates.is_empty() {
            return self.working.clone();
        }
        let mut out = Vec::with_capacity(self.group_by.len() + self.aggregates.len());
        for key in &self.group_by {
            let ty = self
                .working
                .iter()
                .find(|c| c.name == *key)
                .map(|c| c.data_type)
                .unwrap_or(DataType::Text);
            out.push(ColumnMeta::new(key.clone(), ty));
        }
        for agg in &self.aggregates {
            // Validated when the aggregate was added.
            let ty = agg.agg.infer_type(&self.working).unwrap_or(DataType::Float64);
            out.push(ColumnMeta::new(agg.name.clone(), ty));
        }
        out
    }

    fn ensure_not_aggregated(&self, step: &str) -> Result<()> {
        if self.aggregates.is_empty() {
            Ok(())
        } else {
            Err(SqlfliteError::Unsupported(format!(
                "{} cannot follow aggregate",
                step
            )))
        }
    }
}
