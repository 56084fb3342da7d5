//! Type-directed value formatting
//!
//! Every value that ends up inside generated SQL passes through
//! [`ValueFormatter::format`]. The declared column type picks a rule; the rule
//! either produces the literal to splice into the statement, together with the
//! typed value bound in its place at execution time, or an error message
//! naming the field. Formatting never fails hard, so callers can collect
//! every problem of a payload before deciding what to do.

use super::value::DatabaseValue;
use crate::dialect::{normalize_type, SqlDialect};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?\d+$").expect("valid pattern"));
static FLOAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?[0-9]*\.?[0-9]+$").expect("valid pattern"));
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid pattern"));
static US_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("valid pattern"));
static DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").expect("valid pattern"));
static TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}$").expect("valid pattern"));

const DATETIME_TYPES: &[&str] = &[
    "datetime",
    "datetime2",
    "smalldatetime",
    "timestamp",
    "timestamptz",
];

/// Validation rule selected by a declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// Any type containing `int`
    Integer,
    /// Any type containing `float`
    Float,
    /// `date`
    Date,
    /// `datetime`, `timestamp` and their engine variants
    DateTime,
    /// `time`
    Time,
    /// Any type containing `char` or `text`
    Text,
    /// Everything else
    Other,
}

impl TypeClass {
    /// Classify a declared type; qualifiers and case are ignored
    pub fn of(declared_type: &str) -> Self {
        let ty = normalize_type(declared_type);
        if ty.contains("int") {
            TypeClass::Integer
        } else if ty.contains("float") {
            TypeClass::Float
        } else if ty == "date" {
            TypeClass::Date
        } else if DATETIME_TYPES.contains(&ty.as_str()) {
            TypeClass::DateTime
        } else if ty == "time" {
            TypeClass::Time
        } else if ty.contains("char") || ty.contains("text") {
            TypeClass::Text
        } else {
            TypeClass::Other
        }
    }

    fn proper_format(&self) -> Option<&'static str> {
        match self {
            TypeClass::Date => Some("YYYY-MM-DD"),
            TypeClass::DateTime => Some("YYYY-MM-DD HH:MM:SS"),
            TypeClass::Time => Some("HH:MM:SS"),
            _ => None,
        }
    }
}

/// Outcome of formatting one value
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedValue {
    /// SQL literal; the raw input when validation failed
    pub literal: String,
    /// Value bound in place of the literal when the statement runs;
    /// `None` when validation failed
    pub param: Option<DatabaseValue>,
    /// Validation failure, if any
    pub error: Option<String>,
}

impl FormattedValue {
    fn ok(literal: String, param: DatabaseValue) -> Self {
        Self {
            literal,
            param: Some(param),
            error: None,
        }
    }

    fn text(literal: String, raw: &str) -> Self {
        Self::ok(literal, DatabaseValue::String(raw.to_string()))
    }

    fn rejected(raw: &str, message: String) -> Self {
        Self {
            literal: raw.to_string(),
            param: None,
            error: Some(message),
        }
    }

    /// True when the value passed validation
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Turns raw field text into dialect-correct SQL literals
#[derive(Debug, Clone, Copy)]
pub struct ValueFormatter {
    dialect: &'static dyn SqlDialect,
    escape: bool,
}

impl ValueFormatter {
    /// Create a formatter; `escape` enables dialect escaping of text values
    pub fn new(dialect: &'static dyn SqlDialect, escape: bool) -> Self {
        Self { dialect, escape }
    }

    /// Dialect used for quoting
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.dialect
    }

    /// Validate `raw` against `declared_type` and build its literal
    pub fn format(&self, field: &str, declared_type: &str, raw: &str) -> FormattedValue {
        let class = TypeClass::of(declared_type);
        let improper = || {
            let mut message = format!(
                "You have entered an improper value, {raw}, for field {field}, which is of type {}.",
                normalize_type(declared_type)
            );
            if let Some(proper) = class.proper_format() {
                message.push_str(" Proper Format: ");
                message.push_str(proper);
            }
            FormattedValue::rejected(raw, message)
        };

        match class {
            TypeClass::Integer if INTEGER.is_match(raw) => {
                let param = raw
                    .parse::<i64>()
                    .map(DatabaseValue::Long)
                    .unwrap_or_else(|_| DatabaseValue::String(raw.to_string()));
                FormattedValue::ok(raw.to_string(), param)
            }
            TypeClass::Float if FLOAT.is_match(raw) => {
                let param = raw
                    .parse::<f64>()
                    .map(DatabaseValue::Double)
                    .unwrap_or_else(|_| DatabaseValue::String(raw.to_string()));
                FormattedValue::ok(raw.to_string(), param)
            }
            TypeClass::Integer | TypeClass::Float => improper(),
            TypeClass::Date => match normalize_date(raw) {
                Some(iso) => FormattedValue::ok(format!("'{iso}'"), DatabaseValue::String(iso)),
                None => improper(),
            },
            TypeClass::DateTime if DATETIME.is_match(raw) => {
                FormattedValue::text(format!("'{raw}'"), raw)
            }
            TypeClass::Time if TIME.is_match(raw) => FormattedValue::text(format!("'{raw}'"), raw),
            TypeClass::DateTime | TypeClass::Time => improper(),
            TypeClass::Text => FormattedValue::text(self.quote_text(raw), raw),
            TypeClass::Other if self.dialect.quotes_type(declared_type) => {
                FormattedValue::text(self.quote_text(raw), raw)
            }
            TypeClass::Other => match raw.parse::<i64>() {
                Ok(n) if INTEGER.is_match(raw) => FormattedValue::ok(raw.to_string(), DatabaseValue::Long(n)),
                _ => FormattedValue::text(raw.to_string(), raw),
            },
        }
    }

    fn quote_text(&self, raw: &str) -> String {
        if self.escape {
            self.dialect.quote_literal(raw)
        } else {
            format!("'{raw}'")
        }
    }
}

/// ISO form of a calendar date given as `YYYY-MM-DD` or `MM/DD/YYYY`
fn normalize_date(raw: &str) -> Option<String> {
    let iso = if US_DATE.is_match(raw) {
        NaiveDate::parse_from_str(raw, "%m/%d/%Y")
            .ok()?
            .format("%Y-%m-%d")
            .to_string()
    } else {
        raw.to_string()
    };

    if !ISO_DATE.is_match(&iso) {
        return None;
    }
    NaiveDate::parse_from_str(&iso, "%Y-%m-%d").ok()?;
    Some(iso)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DatabaseType;

    fn mysql(escape: bool) -> ValueFormatter {
        ValueFormatter::new(DatabaseType::Mysql.dialect(), escape)
    }

    #[test]
    fn test_classification() {
        assert_eq!(TypeClass::of("INT(11)"), TypeClass::Integer);
        assert_eq!(TypeClass::of("bigint"), TypeClass::Integer);
        assert_eq!(TypeClass::of("float"), TypeClass::Float);
        assert_eq!(TypeClass::of("date"), TypeClass::Date);
        assert_eq!(TypeClass::of("datetime2"), TypeClass::DateTime);
        assert_eq!(TypeClass::of("timestamptz"), TypeClass::DateTime);
        assert_eq!(TypeClass::of("time"), TypeClass::Time);
        assert_eq!(TypeClass::of("nvarchar(max)"), TypeClass::Text);
        assert_eq!(TypeClass::of("longtext"), TypeClass::Text);
        assert_eq!(TypeClass::of("decimal(10,2)"), TypeClass::Other);
    }

    #[test]
    fn test_integer_rules() {
        let f = mysql(false);
        assert_eq!(f.format("beds", "int", "-3").literal, "-3");
        assert!(f.format("beds", "int", "+12").is_valid());

        let bad = f.format("beds", "int", "3.5");
        assert_eq!(bad.literal, "3.5");
        assert_eq!(
            bad.error.as_deref(),
            Some("You have entered an improper value, 3.5, for field beds, which is of type int.")
        );
    }

    #[test]
    fn test_float_rules() {
        let f = mysql(false);
        assert_eq!(f.format("price", "float", ".5").literal, ".5");
        assert!(f.format("price", "float", "-12.25").is_valid());
        assert!(!f.format("price", "float", "1e5").is_valid());
        assert!(!f.format("price", "float", "12.").is_valid());
    }

    #[test]
    fn test_date_rules() {
        let f = mysql(false);
        assert_eq!(f.format("listed", "date", "12/31/2020").literal, "'2020-12-31'");
        assert_eq!(f.format("listed", "date", "2020-02-29").literal, "'2020-02-29'");

        let bad = f.format("listed", "date", "2020-13-40");
        assert_eq!(
            bad.error.as_deref(),
            Some(
                "You have entered an improper value, 2020-13-40, for field listed, which is of type date. Proper Format: YYYY-MM-DD"
            )
        );
        assert!(!f.format("listed", "date", "02/30/2021").is_valid());
        assert!(!f.format("listed", "date", "2021-02-29").is_valid());
    }

    #[test]
    fn test_datetime_and_time_rules() {
        let f = mysql(false);
        assert_eq!(
            f.format("seen", "datetime", "2021-04-01 08:30:00").literal,
            "'2021-04-01 08:30:00'"
        );
        let bad = f.format("seen", "timestamp", "2021-04-01");
        assert!(bad
            .error
            .as_deref()
            .is_some_and(|m| m.ends_with("Proper Format: YYYY-MM-DD HH:MM:SS")));

        assert_eq!(f.format("open", "time", "09:15:00").literal, "'09:15:00'");
        assert!(f
            .format("open", "time", "9:15")
            .error
            .as_deref()
            .is_some_and(|m| m.ends_with("Proper Format: HH:MM:SS")));
    }

    #[test]
    fn test_text_escaping_is_opt_in() {
        assert_eq!(mysql(false).format("city", "varchar", "Coeur d'Alene").literal, "'Coeur d'Alene'");
        assert_eq!(
            mysql(true).format("city", "varchar", "Coeur d'Alene").literal,
            "'Coeur d\\'Alene'"
        );

        let mssql = ValueFormatter::new(DatabaseType::SqlServer.dialect(), true);
        assert_eq!(mssql.format("city", "nvarchar", "O'Neil").literal, "'O''Neil'");
    }

    #[test]
    fn test_bound_values_are_typed_and_unescaped() {
        let f = mysql(true);
        assert_eq!(f.format("beds", "int", "+12").param, Some(DatabaseValue::Long(12)));
        assert_eq!(f.format("price", "float", ".5").param, Some(DatabaseValue::Double(0.5)));
        assert_eq!(
            f.format("listed", "date", "12/31/2020").param,
            Some(DatabaseValue::String("2020-12-31".into()))
        );
        assert_eq!(
            f.format("city", "varchar", "Coeur d'Alene").param,
            Some(DatabaseValue::String("Coeur d'Alene".into()))
        );
        assert_eq!(
            f.format("mls", "bigint", "99999999999999999999").param,
            Some(DatabaseValue::String("99999999999999999999".into()))
        );
        assert_eq!(f.format("beds", "int", "many").param, None);
    }

    #[test]
    fn test_other_types_pass_through() {
        let f = mysql(true);
        assert_eq!(f.format("amount", "decimal", "12.50").literal, "12.50");
        assert_eq!(f.format("flag", "bit", "anything").literal, "anything");
        assert_eq!(f.format("flag", "bit(1)", "1").param, Some(DatabaseValue::Long(1)));
        assert_eq!(
            f.format("amount", "decimal", "12.50").param,
            Some(DatabaseValue::String("12.50".into()))
        );

        let mssql = ValueFormatter::new(DatabaseType::SqlServer.dialect(), true);
        assert_eq!(
            mssql
                .format("guid", "uniqueidentifier", "6F9619FF-8B86-D011-B42D-00C04FC964FF")
                .literal,
            "'6F9619FF-8B86-D011-B42D-00C04FC964FF'"
        );
    }
}
