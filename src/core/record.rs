//! Payload to column-literal assembly
//!
//! Walks a [`TableSchema`] and the caller's [`RecordPayload`] together and
//! decides, column by column, what value an INSERT or UPDATE should carry.
//! Validated values are bound; `NULL` and defaults that are engine
//! expressions stay inline.

use super::error::{DatabaseError, Result};
use super::formatter::{TypeClass, ValueFormatter};
use super::query_builder::SqlValue;
use super::schema::{ColumnSpec, TableSchema};
use super::value::{DatabaseValue, RecordPayload};

/// Ordered `(column, value)` pairs ready for statement building
pub type ColumnLiterals = Vec<(String, SqlValue)>;

/// Builds validated literal sets from schema and payload
#[derive(Debug, Clone, Copy)]
pub struct RecordBuilder<'a> {
    formatter: &'a ValueFormatter,
}

impl<'a> RecordBuilder<'a> {
    /// Create a builder around a formatter
    pub fn new(formatter: &'a ValueFormatter) -> Self {
        Self { formatter }
    }

    /// Literals for an INSERT, in schema order
    ///
    /// Payload keys that are not columns are ignored. Identity columns
    /// without a value are left out; other columns without a value fall back
    /// to their default, then to `NULL` if nullable. Every problem is
    /// collected into one [`DatabaseError::ValidationError`].
    pub fn build_insert(&self, schema: &TableSchema, data: &RecordPayload) -> Result<ColumnLiterals> {
        let mut literals = ColumnLiterals::new();
        let mut errors = Vec::new();

        for column in &schema.columns {
            let raw = data.get(&column.name).and_then(DatabaseValue::to_raw_text);
            match raw.filter(|text| !text.is_empty()) {
                Some(text) => {
                    let formatted = self.formatter.format(&column.name, &column.declared_type, &text);
                    if let Some(error) = formatted.error.clone() {
                        errors.push(error);
                    }
                    literals.push((column.name.clone(), formatted.into()));
                }
                None if column.is_identity => {}
                None => match self.fallback(column) {
                    Some(literal) => literals.push((column.name.clone(), literal)),
                    None if data.contains_key(&column.name) => errors.push(format!(
                        "The data passed for field {} was blank, but the field requires a value.",
                        column.name
                    )),
                    None => errors.push(format!(
                        "There was no data passed for field {}, but the field requires a value.",
                        column.name
                    )),
                },
            }
        }

        if errors.is_empty() {
            Ok(literals)
        } else {
            Err(DatabaseError::validation(errors))
        }
    }

    /// Literals for the SET list of an UPDATE, in schema order
    ///
    /// Only columns present in `data` are touched. Blank values and the text
    /// `NULL` clear the column.
    pub fn build_update(&self, schema: &TableSchema, data: &RecordPayload) -> Result<ColumnLiterals> {
        let mut literals = ColumnLiterals::new();
        let mut errors = Vec::new();

        for column in &schema.columns {
            let Some(value) = data.get(&column.name) else {
                continue;
            };
            match value.to_raw_text().filter(|t| !t.is_empty() && t != "NULL") {
                None => literals.push((column.name.clone(), SqlValue::inline("NULL"))),
                Some(text) => {
                    let formatted = self.formatter.format(&column.name, &column.declared_type, &text);
                    if let Some(error) = formatted.error.clone() {
                        errors.push(error);
                    }
                    literals.push((column.name.clone(), formatted.into()));
                }
            }
        }

        if !errors.is_empty() {
            return Err(DatabaseError::validation(errors));
        }
        if literals.is_empty() {
            return Err(DatabaseError::validation(vec![format!(
                "None of the data passed matches a field of table {}.",
                schema.table
            )]));
        }
        Ok(literals)
    }

    /// Default literal, or `NULL` for nullable columns without one
    ///
    /// A default that fails validation is written inline as given, so engine
    /// expressions such as `CURRENT_TIMESTAMP` stay unquoted. An empty default
    /// only counts for text columns.
    fn fallback(&self, column: &ColumnSpec) -> Option<SqlValue> {
        let default = column.default_value.as_deref().filter(|default| {
            !default.is_empty() || TypeClass::of(&column.declared_type) == TypeClass::Text
        });
        match default {
            Some(default) => {
                let formatted = self.formatter.format(&column.name, &column.declared_type, default);
                if formatted.is_valid() {
                    Some(formatted.into())
                } else {
                    Some(SqlValue::inline(formatted.literal))
                }
            }
            None if column.nullable => Some(SqlValue::inline("NULL")),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DatabaseType;

    fn schema() -> TableSchema {
        TableSchema::new(
            "listing",
            vec![
                ColumnSpec::new("id", "int").nullable(false).identity(true).primary_key(true),
                ColumnSpec::new("mls", "varchar(20)").nullable(false),
                ColumnSpec::new("status", "varchar(10)")
                    .nullable(false)
                    .default_value(Some("active".into())),
                ColumnSpec::new("created", "datetime")
                    .nullable(false)
                    .default_value(Some("CURRENT_TIMESTAMP".into())),
                ColumnSpec::new("remarks", "text"),
                ColumnSpec::new("listed", "date"),
            ],
        )
    }

    fn formatter() -> ValueFormatter {
        ValueFormatter::new(DatabaseType::Mysql.dialect(), true)
    }

    fn rendered(values: &ColumnLiterals) -> Vec<(&str, &str)> {
        values
            .iter()
            .map(|(column, value)| (column.as_str(), value.literal.as_str()))
            .collect()
    }

    fn payload(pairs: &[(&str, DatabaseValue)]) -> RecordPayload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insert_defaults_matrix() {
        let f = formatter();
        let literals = RecordBuilder::new(&f)
            .build_insert(&schema(), &payload(&[("mls", "A1".into()), ("bogus", 1.into())]))
            .unwrap();

        assert_eq!(
            rendered(&literals),
            vec![
                ("mls", "'A1'"),
                ("status", "'active'"),
                ("created", "CURRENT_TIMESTAMP"),
                ("remarks", "NULL"),
                ("listed", "NULL"),
            ]
        );
        let params: Vec<_> = literals.iter().map(|(_, v)| v.param.clone()).collect();
        assert_eq!(
            params,
            vec![
                Some(DatabaseValue::from("A1")),
                Some(DatabaseValue::from("active")),
                None,
                None,
                None,
            ]
        );
    }

    #[test]
    fn test_explicit_identity_value_is_kept() {
        let f = formatter();
        let literals = RecordBuilder::new(&f)
            .build_insert(&schema(), &payload(&[("id", 7.into()), ("mls", "B2".into())]))
            .unwrap();
        assert_eq!(literals[0].0, "id");
        assert_eq!(literals[0].1, SqlValue::bound("7", DatabaseValue::Long(7)));
    }

    #[test]
    fn test_blank_and_absent_required_fields() {
        let f = formatter();
        let err = RecordBuilder::new(&f)
            .build_insert(&schema(), &payload(&[("listed", "2020-13-40".into())]))
            .unwrap_err();
        assert_eq!(
            err.messages(),
            vec![
                "There was no data passed for field mls, but the field requires a value.",
                "You have entered an improper value, 2020-13-40, for field listed, which is of type date. Proper Format: YYYY-MM-DD",
            ]
        );

        let err = RecordBuilder::new(&f)
            .build_insert(&schema(), &payload(&[("mls", "".into())]))
            .unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["The data passed for field mls was blank, but the field requires a value."]
        );
    }

    #[test]
    fn test_empty_default_only_counts_for_text() {
        let schema = TableSchema::new(
            "listing",
            vec![
                ColumnSpec::new("beds", "int").default_value(Some(String::new())),
                ColumnSpec::new("baths", "int")
                    .nullable(false)
                    .default_value(Some(String::new())),
                ColumnSpec::new("note", "varchar(20)")
                    .nullable(false)
                    .default_value(Some(String::new())),
            ],
        );
        let f = formatter();
        let builder = RecordBuilder::new(&f);

        let err = builder.build_insert(&schema, &RecordPayload::new()).unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["There was no data passed for field baths, but the field requires a value."]
        );

        let literals = builder
            .build_insert(&schema, &payload(&[("baths", 2.into())]))
            .unwrap();
        assert_eq!(
            rendered(&literals),
            vec![("beds", "NULL"), ("baths", "2"), ("note", "''")]
        );
        assert_eq!(literals[2].1.param, Some(DatabaseValue::from("")));
    }

    #[test]
    fn test_update_clears_and_ignores_unknown_fields() {
        let f = formatter();
        let literals = RecordBuilder::new(&f)
            .build_update(
                &schema(),
                &payload(&[
                    ("remarks", "NULL".into()),
                    ("listed", "01/02/2021".into()),
                    ("nope", "x".into()),
                    ("mls", DatabaseValue::Null),
                ]),
            )
            .unwrap();

        assert_eq!(
            rendered(&literals),
            vec![("mls", "NULL"), ("remarks", "NULL"), ("listed", "'2021-01-02'")]
        );
        assert_eq!(literals[0].1.param, None);
        assert_eq!(literals[2].1.param, Some(DatabaseValue::from("2021-01-02")));
    }

    #[test]
    fn test_update_without_matching_fields() {
        let f = formatter();
        let err = RecordBuilder::new(&f)
            .build_update(&schema(), &payload(&[("nope", "x".into())]))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::ValidationError(_)));
    }
}
