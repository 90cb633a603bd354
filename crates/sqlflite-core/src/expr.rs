//! Typed column expressions
//!
//! The expression IR replaces a stringly-typed column reference with a small
//! tree that can be type-checked against a table schema before anything is
//! sent to the engine. Expressions are plain values: cheap to clone, safe to
//! share between plans, serializable for plan shipping.

use crate::{ColumnMeta, DataType, Result, SqlfliteError, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Binary operator over scalar expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Returns true for the comparison operators
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Returns true for the arithmetic operators
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }
}

/// A scalar expression over the columns of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Reference to a column by name
    Column(String),
    /// Constant value
    Literal(Value),
    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Type conversion
    Cast { expr: Box<Expr>, to: DataType },
    /// Date plus a fixed day interval
    AddDays { expr: Box<Expr>, days: i64 },
}

/// Reference a column by name
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Wrap a constant value in an expression
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

impl Expr {
    /// A date literal
    pub fn date(date: NaiveDate) -> Expr {
        Expr::Literal(Value::Date(date))
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `self + rhs`
    pub fn add(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Add, self, rhs)
    }

    /// `self - rhs`
    pub fn sub(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Sub, self, rhs)
    }

    /// `self * rhs`
    pub fn mul(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Mul, self, rhs)
    }

    /// `self / rhs`
    pub fn div(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Div, self, rhs)
    }

    /// `self = rhs`
    pub fn eq(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, self, rhs)
    }

    /// `self <> rhs`
    pub fn ne(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Ne, self, rhs)
    }

    /// `self < rhs`
    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Lt, self, rhs)
    }

    /// `self <= rhs`
    pub fn le(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Le, self, rhs)
    }

    /// `self > rhs`
    pub fn gt(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Gt, self, rhs)
    }

    /// `self >= rhs`
    pub fn ge(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Ge, self, rhs)
    }

    /// Logical conjunction
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::And, self, rhs)
    }

    /// Logical disjunction
    pub fn or(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Or, self, rhs)
    }

    /// Convert to another type
    pub fn cast(self, to: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            to,
        }
    }

    /// Offset a date expression by a fixed number of days
    pub fn add_days(self, days: i64) -> Expr {
        Expr::AddDays {
            expr: Box::new(self),
            days,
        }
    }

    /// Sum of this expression over a group
    pub fn sum(self) -> Aggregate {
        Aggregate::Sum(self)
    }

    /// Arithmetic mean of this expression over a group, ignoring nulls
    pub fn mean(self) -> Aggregate {
        Aggregate::Mean(self)
    }

    /// Resolve column references and operator typing against a schema
    ///
    /// Fails with [`SqlfliteError::Reference`] for an unknown column and
    /// [`SqlfliteError::TypeMismatch`] for an ill-typed operator
    /// application. This runs at plan-build time; execution never sees an
    /// unresolved expression.
    pub fn infer_type(&self, columns: &[ColumnMeta]) -> Result<DataType> {
        match self {
            Expr::Column(name) => columns
                .iter()
                .find(|c| c.name == *name)
                .map(|c| c.data_type)
                .ok_or_else(|| SqlfliteError::Reference(name.clone())),
            Expr::Literal(value) => value.data_type().ok_or_else(|| {
                SqlfliteError::TypeMismatch("NULL literal has no type".to_string())
            }),
            Expr::Binary { op, lhs, rhs } => {
                let lt = lhs.infer_type(columns)?;
                let rt = rhs.infer_type(columns)?;
                infer_binary(*op, lt, rt)
            }
            Expr::Cast { expr, to } => {
                let from = expr.infer_type(columns)?;
                if cast_allowed(from, *to) {
                    Ok(*to)
                } else {
                    Err(SqlfliteError::TypeMismatch(format!(
                        "cannot cast {} to {}",
                        from, to
                    )))
                }
            }
            Expr::AddDays { expr, .. } => {
                let inner = expr.infer_type(columns)?;
                if inner == DataType::Date {
                    Ok(DataType::Date)
                } else {
                    Err(SqlfliteError::TypeMismatch(format!(
                        "day interval applies to date expressions, not {}",
                        inner
                    )))
                }
            }
        }
    }

    /// Collect the column names referenced by this expression
    pub fn referenced_columns(&self) -> Vec<&str> {
        fn walk<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
            match expr {
                Expr::Column(name) => out.push(name),
                Expr::Literal(_) => {}
                Expr::Binary { lhs, rhs, .. } => {
                    walk(lhs, out);
                    walk(rhs, out);
                }
                Expr::Cast { expr, .. } | Expr::AddDays { expr, .. } => walk(expr, out),
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

fn infer_binary(op: BinaryOp, lt: DataType, rt: DataType) -> Result<DataType> {
    if op.is_arithmetic() {
        if !lt.is_numeric() || !rt.is_numeric() {
            return Err(SqlfliteError::TypeMismatch(format!(
                "operator {:?} requires numeric operands, got {} and {}",
                op, lt, rt
            )));
        }
        // Integer arithmetic stays integral except division; anything
        // involving floats or decimals widens to float64.
        return Ok(match (op, lt, rt) {
            (BinaryOp::Div, _, _) => DataType::Float64,
            (_, DataType::Int64, DataType::Int64) => DataType::Int64,
            _ => DataType::Float64,
        });
    }

    if op.is_comparison() {
        let comparable = lt == rt
            || (lt.is_numeric() && rt.is_numeric())
            || (lt == DataType::Date && rt == DataType::Date);
        if !comparable {
            return Err(SqlfliteError::TypeMismatch(format!(
                "cannot compare {} with {}",
                lt, rt
            )));
        }
        return Ok(DataType::Boolean);
    }

    // And / Or
    if lt == DataType::Boolean && rt == DataType::Boolean {
        Ok(DataType::Boolean)
    } else {
        Err(SqlfliteError::TypeMismatch(format!(
            "operator {:?} requires boolean operands, got {} and {}",
            op, lt, rt
        )))
    }
}

fn cast_allowed(from: DataType, to: DataType) -> bool {
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (DataType::Text, DataType::Date)
            | (DataType::Text, DataType::Int64)
            | (DataType::Text, DataType::Float64)
            | (DataType::Date, DataType::Text)
            | (DataType::Int64, DataType::Float64)
            | (DataType::Float64, DataType::Int64)
            | (DataType::Decimal, DataType::Float64)
            | (DataType::Int64, DataType::Text)
            | (DataType::Float64, DataType::Text)
    )
}

/// Aggregate function applied per group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Sum over non-null inputs
    Sum(Expr),
    /// Arithmetic mean over non-null inputs
    Mean(Expr),
    /// Row count, nulls included
    Count,
}

impl Aggregate {
    /// Row count aggregate
    pub fn count() -> Aggregate {
        Aggregate::Count
    }

    /// Result type of the aggregate against a schema
    pub fn infer_type(&self, columns: &[ColumnMeta]) -> Result<DataType> {
        match self {
            Aggregate::Sum(expr) => {
                let inner = numeric_input(expr, columns, "sum")?;
                Ok(match inner {
                    DataType::Int64 => DataType::Int64,
                    _ => DataType::Float64,
                })
            }
            Aggregate::Mean(expr) => {
                numeric_input(expr, columns, "mean")?;
                Ok(DataType::Float64)
            }
            Aggregate::Count => Ok(DataType::Int64),
        }
    }
}

fn numeric_input(expr: &Expr, columns: &[ColumnMeta], reducer: &str) -> Result<DataType> {
    let inner = expr.infer_type(columns)?;
    if inner.is_numeric() {
        Ok(inner)
    } else {
        Err(SqlfliteError::TypeMismatch(format!(
            "{} requires a numeric input, got {}",
            reducer, inner
        )))
    }
}
