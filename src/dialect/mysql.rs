//! MySQL / MariaDB dialect

use super::{flag, text, unquote_default, wrap_ident, IdentityRetrieval, SqlDialect};
use crate::core::schema::ColumnSpec;
use crate::core::value::DatabaseRow;

const QUOTED_TYPES: &[&str] = &["date", "datetime", "time", "varchar", "char", "text"];

/// MySQL syntax: backtick identifiers, backslash escaping, `SHOW COLUMNS`
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl SqlDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, ident: &str) -> String {
        wrap_ident(ident, '`', '`')
    }

    /// Same character set `mysql_real_escape_string` escapes
    fn escape_literal(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len() + 8);
        for ch in raw.chars() {
            match ch {
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\x1a' => out.push_str("\\Z"),
                other => out.push(other),
            }
        }
        out
    }

    fn quoted_types(&self) -> &'static [&'static str] {
        QUOTED_TYPES
    }

    fn column_info_query(&self, table: &str) -> String {
        format!("SHOW COLUMNS FROM {}", self.quote_ident(table))
    }

    fn parse_columns(&self, rows: &[DatabaseRow]) -> Vec<ColumnSpec> {
        rows.iter()
            .filter_map(|row| {
                let name = text(row, "Field")?;
                let declared = text(row, "Type").unwrap_or_default();
                let extra = text(row, "Extra").unwrap_or_default().to_lowercase();
                let key = text(row, "Key").unwrap_or_default();

                Some(
                    ColumnSpec::new(name, &declared)
                        .nullable(flag(row, "Null"))
                        .identity(extra.contains("auto_increment"))
                        .primary_key(key.eq_ignore_ascii_case("PRI"))
                        .default_value(text(row, "Default").and_then(|d| unquote_default(&d))),
                )
            })
            .collect()
    }

    fn identity_retrieval(&self) -> IdentityRetrieval {
        IdentityRetrieval::LastInsertId
    }

    fn qualifies_columns(&self) -> bool {
        true
    }

    fn empty_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", self.quote_ident(table))
    }
}
