//! SQLite dialect

use super::{flag, text, unquote_default, wrap_ident, IdentityRetrieval, SqlDialect};
use crate::core::schema::ColumnSpec;
use crate::core::value::DatabaseRow;

const QUOTED_TYPES: &[&str] = &[
    "date", "datetime", "timestamp", "time", "varchar", "char", "text", "clob",
];

/// SQLite syntax: double-quoted identifiers and `PRAGMA table_info`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_ident(&self, ident: &str) -> String {
        wrap_ident(ident, '"', '"')
    }

    fn escape_literal(&self, raw: &str) -> String {
        raw.replace('\'', "''")
    }

    fn quoted_types(&self) -> &'static [&'static str] {
        QUOTED_TYPES
    }

    fn column_info_query(&self, table: &str) -> String {
        format!("PRAGMA table_info({})", self.quote_ident(table))
    }

    /// Only a lone `INTEGER PRIMARY KEY` column aliases the rowid and is
    /// assigned by the engine
    fn parse_columns(&self, rows: &[DatabaseRow]) -> Vec<ColumnSpec> {
        let pk_count = rows.iter().filter(|row| flag(row, "pk")).count();

        rows.iter()
            .filter_map(|row| {
                let name = text(row, "name")?;
                let declared = text(row, "type").unwrap_or_default();
                let is_pk = flag(row, "pk");
                let rowid_alias = is_pk && pk_count == 1 && declared.eq_ignore_ascii_case("integer");

                Some(
                    ColumnSpec::new(name, &declared)
                        .nullable(!flag(row, "notnull") && !rowid_alias)
                        .identity(rowid_alias)
                        .primary_key(is_pk)
                        .default_value(text(row, "dflt_value").and_then(|d| unquote_default(&d))),
                )
            })
            .collect()
    }

    fn identity_retrieval(&self) -> IdentityRetrieval {
        IdentityRetrieval::LastInsertId
    }

    fn qualifies_columns(&self) -> bool {
        false
    }
}
