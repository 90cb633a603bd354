//! Shared test support: an in-memory engine behind the `Transport` seam
//!
//! The evaluator here exists so end-to-end pipeline behavior can be checked
//! without a live engine. It is test scaffolding, not a query engine: plans
//! are assumed pre-validated by the plan builder.

// Not every test binary uses every helper here.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlflite_client::{ColumnMeta, DataType, QueryPlan, ResultSet, Row, Session, TableSchema,
    Transport, Value};
use sqlflite_core::{Aggregate, BinaryOp, Expr, Result, SqlfliteError};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

pub struct InMemoryEngine {
    tables: Vec<(TableSchema, Vec<Vec<Value>>)>,
    pub list_calls: AtomicUsize,
    pub execute_calls: AtomicUsize,
    closed: AtomicBool,
}

impl InMemoryEngine {
    pub fn new(tables: Vec<(TableSchema, Vec<Vec<Value>>)>) -> Self {
        Self {
            tables,
            list_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(SqlfliteError::Connection("connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryEngine {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.ensure_not_closed()?;
        self.list_calls.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.tables.iter().map(|(s, _)| s.name.clone()).collect())
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        self.ensure_not_closed()?;
        self.tables
            .iter()
            .find(|(s, _)| s.name == table)
            .map(|(s, _)| s.clone())
            .ok_or_else(|| SqlfliteError::NotFound(table.to_string()))
    }

    async fn execute(&self, plan: &QueryPlan) -> Result<ResultSet> {
        self.ensure_not_closed()?;
        self.execute_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let (schema, rows) = self
            .tables
            .iter()
            .find(|(s, _)| s.name == plan.table)
            .ok_or_else(|| SqlfliteError::NotFound(plan.table.clone()))?;
        let (columns, rows) = evaluate(plan, schema, rows)?;
        Ok(ResultSet::new(
            columns,
            rows.into_iter().map(Row::new).collect(),
        ))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }
}

/// Session over a fresh engine holding the given tables
pub fn session_with(tables: Vec<(TableSchema, Vec<Vec<Value>>)>) -> Session {
    Session::with_transport(std::sync::Arc::new(InMemoryEngine::new(tables)), Vec::new())
}

pub fn lineitem_schema() -> TableSchema {
    TableSchema::new(
        "lineitem",
        vec![
            ColumnMeta::new("l_shipdate", DataType::Text),
            ColumnMeta::new("l_extendedprice", DataType::Float64),
            ColumnMeta::new("l_discount", DataType::Float64),
            ColumnMeta::new("l_tax", DataType::Float64),
            ColumnMeta::new("l_quantity", DataType::Int64),
            ColumnMeta::new("l_returnflag", DataType::Text),
            ColumnMeta::new("l_linestatus", DataType::Text),
        ],
    )
}

fn li(
    shipdate: &str,
    price: f64,
    discount: f64,
    tax: f64,
    qty: i64,
    flag: &str,
    status: &str,
) -> Vec<Value> {
    vec![
        Value::Text(shipdate.into()),
        Value::Float64(price),
        Value::Float64(discount),
        Value::Float64(tax),
        Value::Int64(qty),
        Value::Text(flag.into()),
        Value::Text(status.into()),
    ]
}

/// Fixture rows; the filter cutoff 1998-12-01 + 90 days keeps the first
/// five and drops the last two.
pub fn lineitem_rows() -> Vec<Vec<Value>> {
    vec![
        li("1998-01-10", 1000.0, 0.10, 0.05, 10, "A", "F"),
        li("1998-06-15", 2000.0, 0.00, 0.10, 20, "A", "F"),
        li("1998-11-30", 500.0, 0.20, 0.00, 5, "N", "O"),
        li("1999-02-28", 1500.0, 0.10, 0.10, 15, "N", "O"),
        li("1999-03-01", 800.0, 0.05, 0.05, 8, "R", "F"),
        li("1999-03-02", 900.0, 0.00, 0.00, 9, "R", "F"),
        li("1999-06-01", 700.0, 0.10, 0.10, 7, "A", "F"),
    ]
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ---- plan evaluation ----

fn evaluate(
    plan: &QueryPlan,
    schema: &TableSchema,
    rows: &[Vec<Value>],
) -> Result<(Vec<ColumnMeta>, Vec<Vec<Value>>)> {
    let mut columns = schema.columns.clone();
    let mut working: Vec<Vec<Value>> = Vec::new();

    for row in rows {
        let keep = match &plan.filter {
            Some(predicate) => {
                matches!(eval_expr(&columns, row, predicate)?, Value::Boolean(true))
            }
            None => true,
        };
        if keep {
            working.push(row.clone());
        }
    }

    for derived in &plan.derived {
        let ty = derived.expr.infer_type(&columns)?;
        for row in &mut working {
            let value = eval_expr(&columns, row, &derived.expr)?;
            row.push(value);
        }
        columns.push(ColumnMeta::new(derived.name.clone(), ty));
    }

    if plan.aggregates.is_empty() {
        sort_rows(&columns, &mut working, &plan.order_by);
        return Ok((columns, working));
    }

    let key_indices: Vec<usize> = plan
        .group_by
        .iter()
        .map(|k| column_index(&columns, k))
        .collect::<Result<_>>()?;

    // Groups in first-seen order, so order_by stability is observable.
    let mut groups: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();
    for (idx, row) in working.iter().enumerate() {
        let key: Vec<Value> = key_indices.iter().map(|i| row[*i].clone()).collect();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(idx),
            None => groups.push((key, vec![idx])),
        }
    }

    let mut out_columns: Vec<ColumnMeta> = Vec::new();
    for (key, idx) in plan.group_by.iter().zip(&key_indices) {
        out_columns.push(ColumnMeta::new(key.clone(), columns[*idx].data_type));
    }
    for agg in &plan.aggregates {
        out_columns.push(ColumnMeta::new(agg.name.clone(), agg.agg.infer_type(&columns)?));
    }

    let mut out_rows: Vec<Vec<Value>> = Vec::new();
    for (key, members) in &groups {
        let mut row = key.clone();
        for agg in &plan.aggregates {
            row.push(eval_aggregate(&columns, &working, members, &agg.agg)?);
        }
        out_rows.push(row);
    }

    sort_rows(&out_columns, &mut out_rows, &plan.order_by);
    Ok((out_columns, out_rows))
}

fn column_index(columns: &[ColumnMeta], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| SqlfliteError::Reference(name.to_string()))
}

fn sort_rows(columns: &[ColumnMeta], rows: &mut [Vec<Value>], order_by: &[String]) {
    if order_by.is_empty() {
        return;
    }
    let indices: Vec<usize> = order_by
        .iter()
        .filter_map(|k| columns.iter().position(|c| c.name == *k))
        .collect();
    rows.sort_by(|a, b| {
        for i in &indices {
            let ord = cmp_values(&a[*i], &b[*i]);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn eval_aggregate(
    columns: &[ColumnMeta],
    rows: &[Vec<Value>],
    members: &[usize],
    agg: &Aggregate,
) -> Result<Value> {
    match agg {
        Aggregate::Count => Ok(Value::Int64(members.len() as i64)),
        Aggregate::Sum(expr) => {
            let mut int_sum: i64 = 0;
            let mut float_sum: f64 = 0.0;
            let mut all_int = true;
            let mut seen = false;
            for idx in members {
                let value = eval_expr(columns, &rows[*idx], expr)?;
                match value {
                    Value::Null => {}
                    Value::Int64(v) => {
                        int_sum += v;
                        float_sum += v as f64;
                        seen = true;
                    }
                    other => {
                        let v = other.as_f64().ok_or_else(|| {
                            SqlfliteError::Execution("sum over non-numeric value".into())
                        })?;
                        float_sum += v;
                        all_int = false;
                        seen = true;
                    }
                }
            }
            if !seen {
                Ok(Value::Null)
            } else if all_int {
                Ok(Value::Int64(int_sum))
            } else {
                Ok(Value::Float64(float_sum))
            }
        }
        Aggregate::Mean(expr) => {
            let mut sum = 0.0;
            let mut count = 0usize;
            for idx in members {
                let value = eval_expr(columns, &rows[*idx], expr)?;
                if value.is_null() {
                    continue;
                }
                sum += value.as_f64().ok_or_else(|| {
                    SqlfliteError::Execution("mean over non-numeric value".into())
                })?;
                count += 1;
            }
            if count == 0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float64(sum / count as f64))
            }
        }
    }
}

fn eval_expr(columns: &[ColumnMeta], row: &[Value], expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Column(name) => Ok(row[column_index(columns, name)?].clone()),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_expr(columns, row, lhs)?;
            let r = eval_expr(columns, row, rhs)?;
            eval_binary(*op, l, r)
        }
        Expr::Cast { expr, to } => {
            let value = eval_expr(columns, row, expr)?;
            eval_cast(value, *to)
        }
        Expr::AddDays { expr, days } => {
            let value = eval_expr(columns, row, expr)?;
            match value {
                Value::Null => Ok(Value::Null),
                Value::Date(d) => Ok(Value::Date(d + chrono::Duration::days(*days))),
                other => Err(SqlfliteError::Execution(format!(
                    "day interval over non-date value {}",
                    other
                ))),
            }
        }
    }
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }

    if op.is_arithmetic() {
        if let (Value::Int64(a), Value::Int64(b)) = (&l, &r) {
            return Ok(match op {
                BinaryOp::Add => Value::Int64(a + b),
                BinaryOp::Sub => Value::Int64(a - b),
                BinaryOp::Mul => Value::Int64(a * b),
                _ => Value::Float64(*a as f64 / *b as f64),
            });
        }
        let a = l.as_f64().ok_or_else(|| bad_operand(&l))?;
        let b = r.as_f64().ok_or_else(|| bad_operand(&r))?;
        return Ok(Value::Float64(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            _ => a / b,
        }));
    }

    if op.is_comparison() {
        let ord = cmp_values(&l, &r);
        return Ok(Value::Boolean(match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::Ne => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Le => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        }));
    }

    match (op, l.as_bool(), r.as_bool()) {
        (BinaryOp::And, Some(a), Some(b)) => Ok(Value::Boolean(a && b)),
        (BinaryOp::Or, Some(a), Some(b)) => Ok(Value::Boolean(a || b)),
        _ => Err(SqlfliteError::Execution(
            "logical operator over non-boolean values".into(),
        )),
    }
}

fn bad_operand(value: &Value) -> SqlfliteError {
    SqlfliteError::Execution(format!("arithmetic over non-numeric value {}", value))
}

fn eval_cast(value: Value, to: DataType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.data_type() == Some(to) {
        return Ok(value);
    }
    match (&value, to) {
        (Value::Text(s), DataType::Date) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| SqlfliteError::Execution(format!("cannot cast '{}' to date: {}", s, e))),
        (Value::Text(s), DataType::Int64) => s
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| SqlfliteError::Execution(format!("cannot cast '{}' to int64: {}", s, e))),
        (Value::Text(s), DataType::Float64) => s.parse::<f64>().map(Value::Float64).map_err(|e| {
            SqlfliteError::Execution(format!("cannot cast '{}' to float64: {}", s, e))
        }),
        (Value::Date(d), DataType::Text) => Ok(Value::Text(d.to_string())),
        (Value::Int64(v), DataType::Float64) => Ok(Value::Float64(*v as f64)),
        (Value::Int64(v), DataType::Text) => Ok(Value::Text(v.to_string())),
        (Value::Float64(v), DataType::Int64) => Ok(Value::Int64(*v as i64)),
        (Value::Float64(v), DataType::Text) => Ok(Value::Text(v.to_string())),
        (Value::Decimal(s), DataType::Float64) => s.parse::<f64>().map(Value::Float64).map_err(|e| {
            SqlfliteError::Execution(format!("cannot cast '{}' to float64: {}", s, e))
        }),
        _ => Err(SqlfliteError::Execution(format!(
            "unsupported cast to {}",
            to
        ))),
    }
}
