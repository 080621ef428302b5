//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, Utc};
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::{DecisionType, Phase};

fn conversion_failure<E>(e: E) -> SqlError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SqlError::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

#[derive(Debug)]
struct UnknownValue(String);

impl std::fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown stored value '{}'", self.0)
    }
}

impl std::error::Error for UnknownValue {}

/// Parse a UUID from a database string column
pub fn parse_uuid(s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s).map_err(conversion_failure)
}

/// Parse an optional UUID from a database string column
pub fn parse_uuid_opt(s: Option<String>) -> Result<Option<Uuid>, SqlError> {
    s.map(|s| parse_uuid(&s)).transpose()
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(conversion_failure)
}

pub fn parse_phase(s: &str) -> Result<Phase, SqlError> {
    Phase::parse(s).ok_or_else(|| conversion_failure(UnknownValue(s.to_string())))
}

pub fn parse_decision_type(s: &str) -> Result<DecisionType, SqlError> {
    DecisionType::parse(s).ok_or_else(|| conversion_failure(UnknownValue(s.to_string())))
}

pub fn parse_decision_type_opt(s: Option<String>) -> Result<Option<DecisionType>, SqlError> {
    s.map(|s| parse_decision_type(&s)).transpose()
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_phase_is_conversion_error() {
        assert!(matches!(
            parse_phase("paused"),
            Err(SqlError::FromSqlConversionFailure(..))
        ));
        assert_eq!(parse_phase("voting").unwrap(), Phase::Voting);
    }

    #[test]
    fn test_optional_decision_type() {
        assert_eq!(parse_decision_type_opt(None).unwrap(), None);
        assert_eq!(
            parse_decision_type_opt(Some("dice".into())).unwrap(),
            Some(DecisionType::Dice)
        );
    }
}
