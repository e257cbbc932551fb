//! Filter compiler.
//!
//! Turns caller-supplied filter values into the final SQL of a report plus
//! the positional parameters it binds. Values are never interpolated into
//! the SQL text.
//!
//! Applied filters are collected as an ordered list of [`FilterClause`]s in
//! the definition's filter order, and the SQL and the parameter list are
//! produced from that list in a single pass. Placeholders are bound by
//! position, so the two must never be built separately.

use std::collections::BTreeMap;

use sea_orm::{DbBackend, Statement, Value};

use crate::definitions::{FilterType, ReportDefinition, ReportFilter};

/// Caller-supplied filter values, keyed by filter field name.
pub type FilterValues = BTreeMap<String, String>;

/// Value meaning "do not filter" for any filter.
pub const ALL_SENTINEL: &str = "all";

/// One applied filter: its condition and the values it binds, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterClause {
    pub field_name: String,
    pub condition: String,
    pub params: Vec<String>,
}

/// A report query ready to be executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledQuery {
    sql: String,
    params: Vec<String>,
    applied: Vec<String>,
}

impl CompiledQuery {
    /// A query executed as-is, without parameters.
    pub fn unfiltered(sql: &str) -> Self {
        Self {
            sql: strip_terminator(sql).to_string(),
            params: Vec::new(),
            applied: Vec::new(),
        }
    }

    fn assemble(base_query: &str, clauses: Vec<FilterClause>) -> Self {
        let mut query = Self::unfiltered(base_query);
        let mut has_where = has_top_level_where(&query.sql);

        for clause in clauses {
            query.sql.push_str(if has_where { " AND (" } else { " WHERE (" });
            query.sql.push_str(clause.condition.trim());
            query.sql.push(')');
            has_where = true;

            query.params.extend(clause.params);
            query.applied.push(clause.field_name);
        }

        query
    }

    /// Final SQL with `?` placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Positional parameters, in placeholder order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Field names of the filters that were applied, in order.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    /// Builds the statement for the given backend.
    ///
    /// PostgreSQL needs numbered placeholders, so `?` outside string literals
    /// are rewritten to `$1..$n` there.
    pub fn to_statement(&self, backend: DbBackend) -> Statement {
        let sql = match backend {
            DbBackend::Postgres => numbered_placeholders(&self.sql),
            _ => self.sql.clone(),
        };
        Statement::from_sql_and_values(
            backend,
            sql,
            self.params.iter().map(|param| Value::from(param.clone())),
        )
    }
}

/// Compiles a report definition and the caller's filter values.
///
/// Filters whose value is missing, blank or `"all"` are skipped. A
/// `daterange` filter is applied only when both bounds are present; a
/// partial range is treated as no value at all.
pub fn compile(definition: &ReportDefinition, values: &FilterValues) -> CompiledQuery {
    let clauses = definition
        .filters
        .iter()
        .filter_map(|filter| clause_for(filter, values))
        .collect();
    CompiledQuery::assemble(&definition.base_query, clauses)
}

fn clause_for(filter: &ReportFilter, values: &FilterValues) -> Option<FilterClause> {
    let params = match filter.filter_type {
        FilterType::DateRange => {
            let (from, to) = range_bounds(&filter.field_name, values)?;
            vec![from.to_string(), to.to_string()]
        }
        _ => vec![lookup(values, &filter.field_name)?.to_string()],
    };

    Some(FilterClause {
        field_name: filter.field_name.clone(),
        condition: filter.condition.clone(),
        params,
    })
}

/// The caller's value for `key`, unchanged, unless it is blank or `"all"`.
fn lookup<'a>(values: &'a FilterValues, key: &str) -> Option<&'a str> {
    values.get(key).map(String::as_str).filter(|value| {
        let value = value.trim();
        !value.is_empty() && value != ALL_SENTINEL
    })
}

/// Bounds of a date range: `field = "from,to"`, or `field_from` and
/// `field_to` when the combined form is absent.
fn range_bounds<'a>(field_name: &str, values: &'a FilterValues) -> Option<(&'a str, &'a str)> {
    let (from, to) = match lookup(values, field_name) {
        Some(combined) => {
            let (from, to) = combined.split_once(',')?;
            (from.trim(), to.trim())
        }
        None => (
            lookup(values, &format!("{field_name}_from"))?.trim(),
            lookup(values, &format!("{field_name}_to"))?.trim(),
        ),
    };
    (!from.is_empty() && !to.is_empty()).then_some((from, to))
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// Characters of `sql`, with everything inside quoted literals (quotes
/// included) replaced by `None`.
fn unquoted(sql: &str) -> Vec<Option<char>> {
    let mut quote: Option<char> = None;
    sql.chars()
        .map(|c| match quote {
            Some(open) => {
                if c == open {
                    quote = None;
                }
                None
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                None
            }
            None => Some(c),
        })
        .collect()
}

/// Number of `?` placeholders outside quoted literals.
pub fn count_placeholders(sql: &str) -> usize {
    unquoted(sql).into_iter().filter(|c| *c == Some('?')).count()
}

fn has_top_level_where(sql: &str) -> bool {
    let mut depth = 0usize;
    let masked: String = unquoted(sql)
        .into_iter()
        .map(|c| match c {
            Some('(') => {
                depth += 1;
                ' '
            }
            Some(')') => {
                depth = depth.saturating_sub(1);
                ' '
            }
            Some(c) if depth == 0 => c.to_ascii_lowercase(),
            _ => ' ',
        })
        .collect();
    masked
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word == "where")
}

fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    for (c, visible) in sql.chars().zip(unquoted(sql)) {
        if visible == Some('?') {
            index += 1;
            out.push('$');
            out.push_str(&index.to_string());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::OptionsSource;

    fn filter(field_name: &str, filter_type: FilterType, condition: &str) -> ReportFilter {
        ReportFilter {
            field_name: field_name.to_string(),
            label: field_name.to_string(),
            filter_type,
            condition: condition.to_string(),
            options: OptionsSource::None,
            sort_order: 0,
        }
    }

    fn definition(base_query: &str) -> ReportDefinition {
        ReportDefinition {
            code: "sales".to_string(),
            name: "Sales".to_string(),
            description: None,
            base_query: base_query.to_string(),
            calculation: None,
            sheet_name: None,
            category: None,
            sort_order: 0,
            is_public: true,
            required_permission: None,
            columns: Vec::new(),
            filters: vec![
                filter("status", FilterType::Select, "s.status = ?"),
                filter("date", FilterType::DateRange, "s.sold_at BETWEEN ? AND ?"),
                filter("seller", FilterType::Equals, "s.seller_id = ?"),
            ],
        }
    }

    fn values(pairs: &[(&str, &str)]) -> FilterValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn no_values_returns_base_query() {
        let def = definition("SELECT * FROM sales s WHERE 1=1;");
        let query = compile(&def, &FilterValues::new());
        assert_eq!(query.sql(), "SELECT * FROM sales s WHERE 1=1");
        assert!(query.params().is_empty());
        assert!(query.applied().is_empty());
    }

    #[test]
    fn skips_missing_blank_and_all() {
        let def = definition("SELECT * FROM sales s WHERE 1=1");
        let query = compile(
            &def,
            &values(&[("status", "all"), ("seller", "   "), ("unknown", "x")]),
        );
        assert_eq!(query, compile(&def, &FilterValues::new()));
    }

    #[test]
    fn appends_in_definition_order() {
        let def = definition("SELECT * FROM sales s WHERE 1=1");
        let query = compile(
            &def,
            &values(&[
                ("seller", "7"),
                ("date", "2024-01-01,2024-01-31"),
                ("status", "paid"),
            ]),
        );
        assert_eq!(
            query.sql(),
            "SELECT * FROM sales s WHERE 1=1 AND (s.status = ?) \
             AND (s.sold_at BETWEEN ? AND ?) AND (s.seller_id = ?)"
        );
        assert_eq!(query.params(), ["paid", "2024-01-01", "2024-01-31", "7"]);
        assert_eq!(query.applied(), ["status", "date", "seller"]);
        assert_eq!(count_placeholders(query.sql()), query.params().len());
    }

    #[test]
    fn introduces_where_when_missing() {
        let def = definition("SELECT * FROM sales s");
        let query = compile(&def, &values(&[("status", "paid"), ("seller", "3")]));
        assert_eq!(
            query.sql(),
            "SELECT * FROM sales s WHERE (s.status = ?) AND (s.seller_id = ?)"
        );
    }

    #[test]
    fn where_inside_subquery_does_not_count() {
        let def = definition("SELECT * FROM (SELECT * FROM sales WHERE total > 0) s");
        let query = compile(&def, &values(&[("status", "paid")]));
        assert!(query.sql().ends_with(") s WHERE (s.status = ?)"));
    }

    #[test]
    fn partial_range_is_a_no_op() {
        let def = definition("SELECT * FROM sales s WHERE 1=1");
        let empty = compile(&def, &FilterValues::new());

        assert_eq!(compile(&def, &values(&[("date", "2024-01-01,")])), empty);
        assert_eq!(compile(&def, &values(&[("date", ",2024-01-31")])), empty);
        assert_eq!(compile(&def, &values(&[("date", "2024-01-01")])), empty);
        assert_eq!(
            compile(&def, &values(&[("date_from", "2024-01-01"), ("date_to", "")])),
            empty
        );
    }

    #[test]
    fn split_range_keys_are_accepted() {
        let def = definition("SELECT * FROM sales s WHERE 1=1");
        let query = compile(
            &def,
            &values(&[("date_from", "2024-01-01"), ("date_to", "2024-02-01")]),
        );
        assert_eq!(query.params(), ["2024-01-01", "2024-02-01"]);
        assert_eq!(query.applied(), ["date"]);
    }

    #[test]
    fn compilation_is_deterministic() {
        let def = definition("SELECT * FROM sales s WHERE 1=1");
        let input = values(&[("status", "open"), ("date", "2024-01-01,2024-12-31")]);
        let first = compile(&def, &input);
        for _ in 0..10 {
            assert_eq!(compile(&def, &input), first);
        }
    }

    #[test]
    fn param_count_matches_placeholders() {
        let def = definition("SELECT * FROM sales s WHERE 1=1");
        let cases = [
            values(&[]),
            values(&[("status", "paid")]),
            values(&[("date", "a,b")]),
            values(&[("status", "paid"), ("date", "a,b"), ("seller", "1")]),
            values(&[("status", "all"), ("date", "a,"), ("seller", "1")]),
        ];
        for case in cases {
            let query = compile(&def, &case);
            let expected: usize = query
                .applied()
                .iter()
                .map(|name| def.filter(name).unwrap().filter_type.placeholders())
                .sum();
            assert_eq!(query.params().len(), expected);
            assert_eq!(count_placeholders(query.sql()), expected);
        }
    }

    #[test]
    fn binds_values_as_given() {
        let def = definition("SELECT * FROM sales s WHERE 1=1");
        let query = compile(
            &def,
            &values(&[
                ("status", " paid "),
                ("seller", " all "),
                ("date", " 2024-01-01 , 2024-01-31 "),
            ]),
        );
        assert_eq!(query.applied(), ["status", "date"]);
        assert_eq!(query.params(), [" paid ", "2024-01-01", "2024-01-31"]);
    }

    #[test]
    fn values_are_never_interpolated() {
        let def = definition("SELECT * FROM sales s WHERE 1=1");
        let query = compile(&def, &values(&[("status", "x'); DROP TABLE sales; --")]));
        assert!(!query.sql().contains("DROP"));
        assert_eq!(query.params(), ["x'); DROP TABLE sales; --"]);
    }

    #[test]
    fn postgres_placeholders_are_numbered() {
        let def = definition("SELECT * FROM sales s WHERE s.note <> '?'");
        let query = compile(&def, &values(&[("status", "paid"), ("date", "a,b")]));
        let statement = query.to_statement(DbBackend::Postgres);
        assert_eq!(
            statement.sql,
            "SELECT * FROM sales s WHERE s.note <> '?' AND (s.status = $1) \
             AND (s.sold_at BETWEEN $2 AND $3)"
        );

        let sqlite = query.to_statement(DbBackend::Sqlite);
        assert_eq!(sqlite.sql, query.sql());
        assert_eq!(sqlite.values.map(|v| v.0.len()), Some(3));
    }
}
