//! Microsoft SQL Server dialect

use super::{flag, text, unquote_default, wrap_ident, IdentityRetrieval, SqlDialect};
use crate::core::schema::ColumnSpec;
use crate::core::value::DatabaseRow;
use once_cell::sync::Lazy;
use regex::Regex;

const QUOTED_TYPES: &[&str] = &[
    "date",
    "datetime",
    "datetime2",
    "smalldatetime",
    "time",
    "varchar",
    "nvarchar",
    "char",
    "nchar",
    "text",
    "ntext",
    "uniqueidentifier",
];

static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("valid numeric pattern")
});

static NON_DISPLAYABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%0[0-8bcefBCEF]|%1[0-9a-fA-F]|[\x00-\x08\x0b\x0c\x0e-\x1f]")
        .expect("valid control character pattern")
});

/// SQL Server syntax: bracketed identifiers, quote doubling, `SCOPE_IDENTITY()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_ident(&self, ident: &str) -> String {
        wrap_ident(ident, '[', ']')
    }

    /// Numbers pass through untouched; everything else loses control
    /// characters (raw or url-encoded) and has `'` doubled
    fn escape_literal(&self, raw: &str) -> String {
        if raw.is_empty() || NUMERIC.is_match(raw) {
            return raw.to_string();
        }
        NON_DISPLAYABLE.replace_all(raw, "").replace('\'', "''")
    }

    fn quoted_types(&self) -> &'static [&'static str] {
        QUOTED_TYPES
    }

    fn column_info_query(&self, table: &str) -> String {
        let table = table.replace('\'', "''");
        format!(
            "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.IS_NULLABLE, c.COLUMN_DEFAULT, \
             COLUMNPROPERTY(OBJECT_ID(c.TABLE_SCHEMA + '.' + c.TABLE_NAME), c.COLUMN_NAME, 'IsIdentity') AS IDENTITY_COLUMN, \
             CASE WHEN EXISTS (SELECT 1 FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k ON tc.CONSTRAINT_NAME = k.CONSTRAINT_NAME AND tc.TABLE_SCHEMA = k.TABLE_SCHEMA \
             WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' AND k.TABLE_SCHEMA = c.TABLE_SCHEMA AND k.TABLE_NAME = c.TABLE_NAME AND k.COLUMN_NAME = c.COLUMN_NAME) \
             THEN 1 ELSE 0 END AS PRIMARY_KEY \
             FROM INFORMATION_SCHEMA.COLUMNS c WHERE c.TABLE_NAME = '{table}' AND c.TABLE_SCHEMA = SCHEMA_NAME() ORDER BY c.ORDINAL_POSITION"
        )
    }

    fn parse_columns(&self, rows: &[DatabaseRow]) -> Vec<ColumnSpec> {
        rows.iter()
            .filter_map(|row| {
                let name = text(row, "COLUMN_NAME")?;
                let declared = text(row, "DATA_TYPE").unwrap_or_default();

                Some(
                    ColumnSpec::new(name, &declared)
                        .nullable(flag(row, "IS_NULLABLE"))
                        .identity(flag(row, "IDENTITY_COLUMN"))
                        .primary_key(flag(row, "PRIMARY_KEY"))
                        .default_value(
                            text(row, "COLUMN_DEFAULT").and_then(|d| unquote_default(&d)),
                        ),
                )
            })
            .collect()
    }

    fn identity_retrieval(&self) -> IdentityRetrieval {
        IdentityRetrieval::TrailingSelect(
            "SELECT SCOPE_IDENTITY() AS AddedIdentity, @@ROWCOUNT AS AffectedRows",
        )
    }

    fn qualifies_columns(&self) -> bool {
        true
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{index}")
    }
}
