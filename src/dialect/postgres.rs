//! PostgreSQL dialect

use super::{flag, text, unquote_default, wrap_ident, IdentityRetrieval, SqlDialect};
use crate::core::schema::ColumnSpec;
use crate::core::value::DatabaseRow;

const QUOTED_TYPES: &[&str] = &[
    "date",
    "timestamp",
    "timestamptz",
    "time",
    "varchar",
    "bpchar",
    "char",
    "text",
    "uuid",
    "json",
    "jsonb",
];

/// PostgreSQL syntax: double-quoted identifiers, `information_schema`,
/// `RETURNING` for identities
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
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
        let table = table.replace('\'', "''");
        format!(
            "SELECT c.column_name::text AS column_name, c.udt_name::text AS data_type, \
             c.is_nullable::text AS is_nullable, c.column_default::text AS column_default, \
             c.is_identity::text AS is_identity, \
             EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage k ON tc.constraint_name = k.constraint_name AND tc.table_schema = k.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' AND k.table_schema = c.table_schema AND k.table_name = c.table_name AND k.column_name = c.column_name) AS is_primary_key \
             FROM information_schema.columns c \
             WHERE c.table_schema = current_schema() AND c.table_name = '{table}' \
             ORDER BY c.ordinal_position"
        )
    }

    fn parse_columns(&self, rows: &[DatabaseRow]) -> Vec<ColumnSpec> {
        rows.iter()
            .filter_map(|row| {
                let name = text(row, "column_name")?;
                let declared = text(row, "data_type").unwrap_or_default();
                let raw_default = text(row, "column_default");
                let serial = raw_default
                    .as_deref()
                    .is_some_and(|d| d.trim_start().starts_with("nextval("));

                Some(
                    ColumnSpec::new(name, &declared)
                        .nullable(flag(row, "is_nullable"))
                        .identity(flag(row, "is_identity") || serial)
                        .primary_key(flag(row, "is_primary_key"))
                        .default_value(if serial {
                            None
                        } else {
                            raw_default.and_then(|d| unquote_default(&d))
                        }),
                )
            })
            .collect()
    }

    fn identity_retrieval(&self) -> IdentityRetrieval {
        IdentityRetrieval::Returning
    }

    fn qualifies_columns(&self) -> bool {
        false
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn isolates_statement_failures(&self) -> bool {
        true
    }
}
