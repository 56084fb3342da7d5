//! Dialect-aware SQL statement builders
//!
//! Builders take identifiers and [`SqlValue`]s. Identifiers are quoted by the
//! dialect. Every builder renders two ways: [`build`](SelectBuilder::build)
//! splices the formatted literals in and gives the statement text reported to
//! callers, `build_bound` swaps every bindable value for a dialect placeholder
//! and collects the values in order for execution.

use super::formatter::FormattedValue;
use super::value::DatabaseValue;
use crate::dialect::SqlDialect;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// ORDER BY direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    /// Ascending order
    #[default]
    Asc,
    /// Descending order
    Desc,
}

impl OrderDirection {
    /// SQL keyword
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

impl FromStr for OrderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(OrderDirection::Asc),
            "DESC" => Ok(OrderDirection::Desc),
            _ => Err(format!("{s} is not a valid sort direction.")),
        }
    }
}

/// One value of a statement
#[derive(Debug, Clone, PartialEq)]
pub struct SqlValue {
    /// Literal used in the rendered statement
    pub literal: String,
    /// Value bound in place of the literal; `None` keeps the literal inline
    pub param: Option<DatabaseValue>,
}

impl SqlValue {
    /// Value that is always written inline, such as `NULL` or an engine
    /// expression like `CURRENT_TIMESTAMP`
    pub fn inline(literal: impl Into<String>) -> Self {
        Self {
            literal: literal.into(),
            param: None,
        }
    }

    /// Value rendered as `literal` and bound as `param`
    pub fn bound(literal: impl Into<String>, param: DatabaseValue) -> Self {
        Self {
            literal: literal.into(),
            param: Some(param),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(literal: &str) -> Self {
        SqlValue::inline(literal)
    }
}

impl From<String> for SqlValue {
    fn from(literal: String) -> Self {
        SqlValue::inline(literal)
    }
}

impl From<FormattedValue> for SqlValue {
    fn from(formatted: FormattedValue) -> Self {
        SqlValue {
            literal: formatted.literal,
            param: formatted.param,
        }
    }
}

/// Statement text with placeholders and the values bound to them, in order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundStatement {
    /// Statement text
    pub sql: String,
    /// Parameter values
    pub params: Vec<DatabaseValue>,
}

impl BoundStatement {
    /// Statement without parameters
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// True when the statement carries parameters
    pub fn is_bound(&self) -> bool {
        !self.params.is_empty()
    }
}

/// Renders values either as literals or as numbered placeholders
struct ValueWriter {
    dialect: &'static dyn SqlDialect,
    params: Option<Vec<DatabaseValue>>,
}

impl ValueWriter {
    fn literal(dialect: &'static dyn SqlDialect) -> Self {
        Self {
            dialect,
            params: None,
        }
    }

    fn binding(dialect: &'static dyn SqlDialect) -> Self {
        Self {
            dialect,
            params: Some(Vec::new()),
        }
    }

    fn write(&mut self, value: &SqlValue) -> String {
        match (&mut self.params, &value.param) {
            (Some(params), Some(param)) => {
                params.push(param.clone());
                self.dialect.placeholder(params.len())
            }
            _ => value.literal.clone(),
        }
    }

    fn finish(self, sql: String) -> BoundStatement {
        BoundStatement {
            sql,
            params: self.params.unwrap_or_default(),
        }
    }
}

/// `column = value` pair of a WHERE clause or SET list
#[derive(Debug, Clone)]
struct Condition {
    column: String,
    value: SqlValue,
}

impl Condition {
    fn new(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

fn render_conditions(
    out: &mut ValueWriter,
    table: &str,
    conditions: &[Condition],
    qualified: bool,
) -> String {
    conditions
        .iter()
        .map(|cond| {
            let column = if qualified {
                out.dialect.column_ref(table, &cond.column)
            } else {
                out.dialect.quote_ident(&cond.column)
            };
            format!("{} = {}", column, out.write(&cond.value))
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Strip an optional leading `WHERE` keyword from a caller-supplied fragment
fn bare_where(fragment: &str) -> &str {
    let trimmed = fragment.trim();
    match trimmed.get(..5) {
        Some(head) if head.eq_ignore_ascii_case("where") => {
            let rest = &trimmed[5..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest.trim_start()
            } else {
                trimmed
            }
        }
        _ => trimmed,
    }
}

/// SELECT query builder
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    dialect: &'static dyn SqlDialect,
    table: String,
    columns: Vec<String>,
    where_conditions: Vec<Condition>,
    raw_where: Option<String>,
    order_by: Option<(String, OrderDirection)>,
}

impl SelectBuilder {
    /// Create a new SELECT query builder
    ///
    /// # Example
    ///
    /// ```
    /// use rust_record_access::core::{query_builder::SelectBuilder, DatabaseType};
    ///
    /// let query = SelectBuilder::new(DatabaseType::Mysql.dialect(), "users")
    ///     .columns(&["id", "name"])
    ///     .where_eq("id", "42")
    ///     .build();
    /// assert_eq!(query, "SELECT `id`, `name` FROM `users` WHERE `id` = 42");
    /// ```
    pub fn new(dialect: &'static dyn SqlDialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            columns: Vec::new(),
            where_conditions: Vec::new(),
            raw_where: None,
            order_by: None,
        }
    }

    /// Select specific columns; an empty list selects `*`
    #[must_use]
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Add a `column = value` condition
    #[must_use]
    pub fn where_eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.where_conditions.push(Condition::new(column, value));
        self
    }

    /// Use a caller-written condition; a leading `WHERE` is optional
    #[must_use]
    pub fn where_raw(mut self, fragment: &str) -> Self {
        let bare = bare_where(fragment);
        self.raw_where = (!bare.is_empty()).then(|| bare.to_string());
        self
    }

    /// Sort by a single column
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by = Some((column.to_string(), direction));
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        self.render(&mut ValueWriter::literal(self.dialect))
    }

    /// Build the statement with placeholders
    pub fn build_bound(&self) -> BoundStatement {
        let mut out = ValueWriter::binding(self.dialect);
        let sql = self.render(&mut out);
        out.finish(sql)
    }

    fn render(&self, out: &mut ValueWriter) -> String {
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| self.dialect.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!(
            "SELECT {} FROM {}",
            projection,
            self.dialect.quote_ident(&self.table)
        );

        let mut clauses = Vec::new();
        if !self.where_conditions.is_empty() {
            clauses.push(render_conditions(out, &self.table, &self.where_conditions, false));
        }
        if let Some(raw) = &self.raw_where {
            clauses.push(raw.clone());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if let Some((column, direction)) = &self.order_by {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                self.dialect.quote_ident(column),
                direction.as_sql()
            ));
        }

        sql
    }
}

/// INSERT query builder
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    dialect: &'static dyn SqlDialect,
    table: String,
    columns: Vec<String>,
    values: Vec<SqlValue>,
    returning: Option<String>,
}

impl InsertBuilder {
    /// Create a new INSERT query builder
    pub fn new(dialect: &'static dyn SqlDialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            returning: None,
        }
    }

    /// Add a column-value pair
    #[must_use]
    pub fn value(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.columns.push(column.to_string());
        self.values.push(value.into());
        self
    }

    /// Add several column-value pairs in order
    #[must_use]
    pub fn values<I, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, V)>,
        V: Into<SqlValue>,
    {
        for (column, value) in pairs {
            self.columns.push(column);
            self.values.push(value.into());
        }
        self
    }

    /// Append `RETURNING column`
    #[must_use]
    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        self.render(&mut ValueWriter::literal(self.dialect))
    }

    /// Build the statement with placeholders
    pub fn build_bound(&self) -> BoundStatement {
        let mut out = ValueWriter::binding(self.dialect);
        let sql = self.render(&mut out);
        out.finish(sql)
    }

    fn render(&self, out: &mut ValueWriter) -> String {
        let mut sql = if self.columns.is_empty() {
            self.dialect.empty_insert(&self.table)
        } else {
            let columns: Vec<String> = self
                .columns
                .iter()
                .map(|c| self.dialect.column_ref(&self.table, c))
                .collect();
            let values: Vec<String> = self.values.iter().map(|v| out.write(v)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.dialect.quote_ident(&self.table),
                columns.join(", "),
                values.join(", ")
            )
        };

        if let Some(column) = &self.returning {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.dialect.quote_ident(column));
        }
        sql
    }
}

/// UPDATE query builder
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    dialect: &'static dyn SqlDialect,
    table: String,
    assignments: Vec<Condition>,
    where_conditions: Vec<Condition>,
}

impl UpdateBuilder {
    /// Create a new UPDATE query builder
    pub fn new(dialect: &'static dyn SqlDialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            assignments: Vec::new(),
            where_conditions: Vec::new(),
        }
    }

    /// Set a column to a value
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.assignments.push(Condition::new(column, value));
        self
    }

    /// Set several columns in order
    #[must_use]
    pub fn set_all<I, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, V)>,
        V: Into<SqlValue>,
    {
        self.assignments.extend(
            pairs
                .into_iter()
                .map(|(column, value)| Condition::new(column, value)),
        );
        self
    }

    /// Add a `column = value` condition
    #[must_use]
    pub fn where_eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.where_conditions.push(Condition::new(column, value));
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        self.render(&mut ValueWriter::literal(self.dialect))
    }

    /// Build the statement with placeholders
    pub fn build_bound(&self) -> BoundStatement {
        let mut out = ValueWriter::binding(self.dialect);
        let sql = self.render(&mut out);
        out.finish(sql)
    }

    fn render(&self, out: &mut ValueWriter) -> String {
        let set_clauses: Vec<String> = self
            .assignments
            .iter()
            .map(|a| {
                format!(
                    "{} = {}",
                    self.dialect.column_ref(&self.table, &a.column),
                    out.write(&a.value)
                )
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote_ident(&self.table),
            set_clauses.join(", ")
        );

        if !self.where_conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(out, &self.table, &self.where_conditions, true));
        }

        sql
    }
}

/// DELETE query builder
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    dialect: &'static dyn SqlDialect,
    table: String,
    where_conditions: Vec<Condition>,
}

impl DeleteBuilder {
    /// Create a new DELETE query builder
    pub fn new(dialect: &'static dyn SqlDialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            where_conditions: Vec::new(),
        }
    }

    /// Add a `column = value` condition
    #[must_use]
    pub fn where_eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.where_conditions.push(Condition::new(column, value));
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        self.render(&mut ValueWriter::literal(self.dialect))
    }

    /// Build the statement with placeholders
    pub fn build_bound(&self) -> BoundStatement {
        let mut out = ValueWriter::binding(self.dialect);
        let sql = self.render(&mut out);
        out.finish(sql)
    }

    fn render(&self, out: &mut ValueWriter) -> String {
        let mut sql = format!("DELETE FROM {}", self.dialect.quote_ident(&self.table));

        if !self.where_conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(out, &self.table, &self.where_conditions, true));
        }

        sql
    }
}
