//! Summary calculator.
//!
//! Totals are described by a small declarative aggregation language stored
//! as JSON with the report definition:
//!
//! ```json
//! {
//!   "totals": [
//!     { "name": "sum_total", "op": "sum", "field": "total" },
//!     { "name": "paid", "op": "count", "where": { "field": "status", "eq": "paid" } },
//!     { "name": "by_seller", "op": "group_by", "by": "seller",
//!       "aggregate": { "op": "sum", "field": "total" } }
//!   ]
//! }
//! ```
//!
//! A script only sees the rows it is given; every evaluation starts from a
//! fresh state. [`summarize`] is fail-soft: a broken script is logged and
//! yields empty totals, so the rows can still be exported.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashSet},
};

use serde::Deserialize;
use serde_json::{Number, Value};

use crate::{
    EngineError, ResultEngine, definitions::ReportDefinition, executor::Row, render::as_number,
};

/// Totals produced by a summary script.
pub type Totals = serde_json::Map<String, Value>;

const MAX_TOTALS: usize = 64;
const MAX_DEPTH: usize = 16;
const MAX_ROUND_DIGITS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Op {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    CountDistinct,
    GroupBy,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAggregate {
    op: Op,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    by: Option<String>,
    #[serde(default)]
    aggregate: Option<Box<RawAggregate>>,
    #[serde(default, rename = "where")]
    filter: Option<Predicate>,
    #[serde(default)]
    round: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTotal {
    name: String,
    #[serde(flatten)]
    body: RawAggregate,
}

#[derive(Debug, Deserialize)]
struct Script {
    totals: Vec<RawTotal>,
}

/// Row predicate of a `where` clause.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare { field: String, test: Comparison },
}

#[derive(Debug, Clone, PartialEq)]
enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    IsNull,
    NotNull,
}

impl TryFrom<Value> for Predicate {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut map) = value else {
            return Err("predicate must be an object".to_string());
        };

        if let Some(all) = map.remove("all") {
            return Ok(Predicate::All(predicate_list("all", all)?));
        }
        if let Some(any) = map.remove("any") {
            return Ok(Predicate::Any(predicate_list("any", any)?));
        }
        if let Some(not) = map.remove("not") {
            return Ok(Predicate::Not(Box::new(Predicate::try_from(not)?)));
        }

        let field = match map.remove("field") {
            Some(Value::String(field)) => field,
            _ => return Err("predicate requires a string `field`".to_string()),
        };
        let mut tests = map.into_iter();
        let (Some((op, operand)), None) = (tests.next(), tests.next()) else {
            return Err(format!(
                "predicate on `{field}` requires exactly one comparison"
            ));
        };

        let test = match op.as_str() {
            "eq" => Comparison::Eq(operand),
            "ne" => Comparison::Ne(operand),
            "gt" => Comparison::Gt(operand),
            "gte" => Comparison::Gte(operand),
            "lt" => Comparison::Lt(operand),
            "lte" => Comparison::Lte(operand),
            "in" => match operand {
                Value::Array(items) => Comparison::In(items),
                _ => return Err(format!("`in` on `{field}` requires an array")),
            },
            "is_null" => Comparison::IsNull,
            "not_null" => Comparison::NotNull,
            other => return Err(format!("unknown comparison `{other}` on `{field}`")),
        };
        Ok(Predicate::Compare { field, test })
    }
}

fn predicate_list(name: &str, value: Value) -> Result<Vec<Predicate>, String> {
    match value {
        Value::Array(items) => items.into_iter().map(Predicate::try_from).collect(),
        _ => Err(format!("`{name}` requires an array of predicates")),
    }
}

impl Predicate {
    fn depth(&self) -> usize {
        match self {
            Predicate::All(items) | Predicate::Any(items) => {
                1 + items.iter().map(Predicate::depth).max().unwrap_or(0)
            }
            Predicate::Not(inner) => 1 + inner.depth(),
            Predicate::Compare { .. } => 1,
        }
    }

    fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::All(items) => items.iter().all(|p| p.matches(row)),
            Predicate::Any(items) => items.iter().any(|p| p.matches(row)),
            Predicate::Not(inner) => !inner.matches(row),
            Predicate::Compare { field, test } => {
                let value = field_value(row, field);
                match test {
                    Comparison::Eq(expected) => loose_eq(value, expected),
                    Comparison::Ne(expected) => !loose_eq(value, expected),
                    Comparison::Gt(bound) => loose_cmp(value, bound) == Some(Ordering::Greater),
                    Comparison::Gte(bound) => matches!(
                        loose_cmp(value, bound),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    Comparison::Lt(bound) => loose_cmp(value, bound) == Some(Ordering::Less),
                    Comparison::Lte(bound) => matches!(
                        loose_cmp(value, bound),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    Comparison::In(items) => items.iter().any(|item| loose_eq(value, item)),
                    Comparison::IsNull => value.is_null(),
                    Comparison::NotNull => !value.is_null(),
                }
            }
        }
    }
}

/// One validated aggregation.
#[derive(Debug, Clone, PartialEq)]
enum Aggregate {
    Sum(String),
    Count(Option<String>),
    Avg(String),
    Min(String),
    Max(String),
    CountDistinct(String),
    GroupBy { by: String, inner: Box<Aggregation> },
}

#[derive(Debug, Clone, PartialEq)]
struct Aggregation {
    aggregate: Aggregate,
    filter: Option<Predicate>,
    round: Option<u32>,
}

impl Aggregation {
    fn compile(name: &str, raw: RawAggregate, depth: usize) -> ResultEngine<Self> {
        let invalid = |msg: &str| EngineError::Calculation(format!("total `{name}`: {msg}"));
        if depth > MAX_DEPTH {
            return Err(invalid("nesting too deep"));
        }

        let field = |field: Option<String>| field.ok_or_else(|| invalid("missing `field`"));
        let aggregate = match raw.op {
            Op::Sum => Aggregate::Sum(field(raw.field)?),
            Op::Count => Aggregate::Count(raw.field),
            Op::Avg => Aggregate::Avg(field(raw.field)?),
            Op::Min => Aggregate::Min(field(raw.field)?),
            Op::Max => Aggregate::Max(field(raw.field)?),
            Op::CountDistinct => Aggregate::CountDistinct(field(raw.field)?),
            Op::GroupBy => {
                let by = raw.by.ok_or_else(|| invalid("group_by requires `by`"))?;
                let inner = raw
                    .aggregate
                    .ok_or_else(|| invalid("group_by requires `aggregate`"))?;
                Aggregate::GroupBy {
                    by,
                    inner: Box::new(Self::compile(name, *inner, depth + 1)?),
                }
            }
        };

        if let Some(filter) = &raw.filter
            && depth + filter.depth() > MAX_DEPTH
        {
            return Err(invalid("predicate nesting too deep"));
        }
        if raw.round.is_some_and(|digits| digits > MAX_ROUND_DIGITS) {
            return Err(invalid("`round` must be between 0 and 10"));
        }

        Ok(Self {
            aggregate,
            filter: raw.filter,
            round: raw.round,
        })
    }

    fn evaluate(&self, rows: &[&Row]) -> ResultEngine<Value> {
        let selected: Vec<&Row> = match &self.filter {
            Some(filter) => rows.iter().copied().filter(|row| filter.matches(row)).collect(),
            None => rows.to_vec(),
        };

        let value = match &self.aggregate {
            Aggregate::Sum(field) => number(numbers(&selected, field)?.iter().sum())?,
            Aggregate::Count(None) => Value::from(selected.len()),
            Aggregate::Count(Some(field)) => Value::from(
                selected
                    .iter()
                    .filter(|row| !field_value(row, field).is_null())
                    .count(),
            ),
            Aggregate::Avg(field) => {
                let values = numbers(&selected, field)?;
                if values.is_empty() {
                    Value::Null
                } else {
                    number(values.iter().sum::<f64>() / values.len() as f64)?
                }
            }
            Aggregate::Min(field) => extreme(&selected, field, Ordering::Less),
            Aggregate::Max(field) => extreme(&selected, field, Ordering::Greater),
            Aggregate::CountDistinct(field) => {
                let distinct: HashSet<String> = selected
                    .iter()
                    .map(|row| field_value(row, field))
                    .filter(|value| !value.is_null())
                    .map(group_key)
                    .collect();
                Value::from(distinct.len())
            }
            Aggregate::GroupBy { by, inner } => {
                let mut groups: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
                for row in selected.iter().copied() {
                    groups
                        .entry(group_key(field_value(row, by)))
                        .or_default()
                        .push(row);
                }
                let mut out = serde_json::Map::new();
                for (key, members) in groups {
                    out.insert(key, inner.evaluate(&members)?);
                }
                Value::Object(out)
            }
        };

        Ok(match (self.round, value) {
            (Some(digits), Value::Number(n)) => match n.as_f64() {
                Some(v) => number(round_to(v, digits))?,
                None => Value::Number(n),
            },
            (_, value) => value,
        })
    }
}

/// A compiled summary script.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    totals: Vec<(String, Aggregation)>,
}

impl Summary {
    /// Parses and validates a summary script.
    pub fn parse(script: &str) -> ResultEngine<Self> {
        let script: Script = serde_json::from_str(script)
            .map_err(|err| EngineError::Calculation(format!("invalid script: {err}")))?;
        if script.totals.len() > MAX_TOTALS {
            return Err(EngineError::Calculation(format!(
                "too many totals: {} (max {MAX_TOTALS})",
                script.totals.len()
            )));
        }

        let mut seen = BTreeSet::new();
        let mut totals = Vec::with_capacity(script.totals.len());
        for total in script.totals {
            if !seen.insert(total.name.clone()) {
                return Err(EngineError::Calculation(format!(
                    "duplicate total `{}`",
                    total.name
                )));
            }
            let aggregation = Aggregation::compile(&total.name, total.body, 0)?;
            totals.push((total.name, aggregation));
        }
        Ok(Self { totals })
    }

    /// Evaluates the script against `rows`.
    pub fn evaluate(&self, rows: &[Row]) -> ResultEngine<Totals> {
        let rows: Vec<&Row> = rows.iter().collect();
        let mut totals = Totals::new();
        for (name, aggregation) in &self.totals {
            let value = aggregation.evaluate(&rows).map_err(|err| match err {
                EngineError::Calculation(msg) => {
                    EngineError::Calculation(format!("total `{name}`: {msg}"))
                }
                other => other,
            })?;
            totals.insert(name.clone(), value);
        }
        Ok(totals)
    }
}

/// Computes the totals of a report.
///
/// Never fails: without a script the totals are empty, and a script that
/// cannot be parsed or evaluated is logged and also yields empty totals.
pub fn summarize(definition: &ReportDefinition, rows: &[Row]) -> Totals {
    let Some(script) = definition
        .calculation
        .as_deref()
        .filter(|script| !script.trim().is_empty())
    else {
        return Totals::new();
    };

    match Summary::parse(script).and_then(|summary| summary.evaluate(rows)) {
        Ok(totals) => totals,
        Err(err) => {
            tracing::warn!(
                report = %definition.code,
                "summary calculation failed, continuing without totals: {err}"
            );
            Totals::new()
        }
    }
}

fn field_value<'a>(row: &'a Row, field: &str) -> &'a Value {
    row.get(field).unwrap_or(&Value::Null)
}

/// Numeric values of `field`, skipping nulls.
fn numbers(rows: &[&Row], field: &str) -> ResultEngine<Vec<f64>> {
    rows.iter()
        .map(|row| field_value(row, field))
        .filter(|value| !value.is_null())
        .map(|value| {
            as_number(value).ok_or_else(|| {
                EngineError::Calculation(format!("`{field}` is not numeric: {value}"))
            })
        })
        .collect()
}

fn extreme(rows: &[&Row], field: &str, wanted: Ordering) -> Value {
    rows.iter()
        .map(|row| field_value(row, field))
        .filter(|value| !value.is_null())
        .fold(None::<&Value>, |best, value| match best {
            Some(current) if loose_cmp(value, current) != Some(wanted) => Some(current),
            _ => Some(value),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => loose_cmp(a, b) == Some(Ordering::Equal),
    }
}

/// Compares numerically when both sides are numeric, textually otherwise.
fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => Some(group_key(a).cmp(&group_key(b))),
    }
}

fn group_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Whole results are emitted as integers, the rest as floats.
fn number(value: f64) -> ResultEngine<Value> {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(value as i64));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| EngineError::Calculation(format!("non-finite result: {value}")))
}
