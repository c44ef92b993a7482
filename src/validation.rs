//! Field validation
//!
//! Schema-driven checks run by the HTTP and bulk layers before a record
//! reaches an entity store.

use serde_json::Value;

use crate::db::Record;
use crate::error::{Result, StoreError};

// == Rules ==
/// Constraint on a single field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Non-blank string of at most `max` characters
    Text { max: usize },
    /// Uppercase ASCII letters, length within `min..=max`
    Code { min: usize, max: usize },
    /// Integer greater than zero
    PositiveInt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub rule: FieldRule,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, rule: FieldRule) -> Self {
        Self {
            name,
            rule,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, rule: FieldRule) -> Self {
        Self {
            name,
            rule,
            required: false,
        }
    }
}

// == Schema ==
/// The allowed fields of a resource and their rules.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Full check for a record about to be created.
    pub fn validate_create(&self, record: &Record) -> Result<()> {
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name)
            .collect();
        validate_required_fields(record, &required)?;
        self.validate_present(record)
    }

    /// Check for a partial update: at least one field, rules on present fields.
    pub fn validate_update(&self, fields: &Record) -> Result<()> {
        if fields.is_empty() {
            return Err(StoreError::Validation("No fields to update".to_string()));
        }
        self.validate_present(fields)
    }

    fn validate_present(&self, record: &Record) -> Result<()> {
        let allowed: Vec<&str> = self.fields.iter().map(|field| field.name).collect();
        validate_no_extra_fields(record, &allowed)?;

        for field in self.fields {
            if let Some(value) = record.get(field.name) {
                validate_rule(value, field.name, field.rule)?;
            }
        }
        Ok(())
    }
}

// == Checks ==
/// Fails when a required field is missing, null, or a blank string.
pub fn validate_required_fields(record: &Record, required: &[&str]) -> Result<()> {
    let mut missing = Vec::new();
    let mut empty = Vec::new();

    for &field in required {
        match record.get(field) {
            None => missing.push(field),
            Some(Value::Null) => empty.push(field),
            Some(Value::String(s)) if s.trim().is_empty() => empty.push(field),
            Some(_) => {}
        }
    }

    if !missing.is_empty() {
        return Err(StoreError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }
    if !empty.is_empty() {
        return Err(StoreError::Validation(format!(
            "Fields cannot be empty: {}",
            empty.join(", ")
        )));
    }
    Ok(())
}

/// Fails when the record carries a field outside `allowed`.
pub fn validate_no_extra_fields(record: &Record, allowed: &[&str]) -> Result<()> {
    let mut extra: Vec<&str> = record
        .keys()
        .map(String::as_str)
        .filter(|field| !allowed.contains(field))
        .collect();
    if extra.is_empty() {
        return Ok(());
    }
    extra.sort_unstable();
    Err(StoreError::Validation(format!(
        "Unexpected fields: {}",
        extra.join(", ")
    )))
}

pub fn validate_rule(value: &Value, field: &str, rule: FieldRule) -> Result<()> {
    match rule {
        FieldRule::Text { max } => validate_string_length(value, field, 1, max),
        FieldRule::Code { min, max } => validate_code(value, field, min, max),
        FieldRule::PositiveInt => validate_positive_integer(value, field),
    }
}

pub fn validate_string_length(value: &Value, field: &str, min: usize, max: usize) -> Result<()> {
    let Some(text) = value.as_str() else {
        return Err(StoreError::Validation(format!("{} must be a string", field)));
    };
    let len = text.trim().chars().count();
    if len < min || len > max {
        return Err(StoreError::Validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

pub fn validate_code(value: &Value, field: &str, min: usize, max: usize) -> Result<()> {
    let ok = value.as_str().map_or(false, |code| {
        (min..=max).contains(&code.len()) && code.chars().all(|c| c.is_ascii_uppercase())
    });
    if ok {
        return Ok(());
    }
    let length = if min == max {
        min.to_string()
    } else {
        format!("{}-{}", min, max)
    };
    Err(StoreError::Validation(format!(
        "{} must be {} uppercase letters",
        field, length
    )))
}

pub fn validate_positive_integer(value: &Value, field: &str) -> Result<()> {
    let positive = match value {
        Value::Number(n) => n.as_u64().map_or(false, |v| v > 0),
        _ => false,
    };
    if positive {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "{} must be a positive integer",
            field
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static TEST_SCHEMA: Schema = Schema {
        fields: &[
            FieldSpec::required("name", FieldRule::Text { max: 10 }),
            FieldSpec::required("state_code", FieldRule::Code { min: 2, max: 2 }),
            FieldSpec::optional("population", FieldRule::PositiveInt),
        ],
    };

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn message(result: Result<()>) -> String {
        match result {
            Err(StoreError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_create() {
        let rec = record(json!({"name": "Miami", "state_code": "FL", "population": 450000}));
        assert!(TEST_SCHEMA.validate_create(&rec).is_ok());
    }

    #[test]
    fn test_missing_and_empty_fields() {
        let msg = message(TEST_SCHEMA.validate_create(&record(json!({"name": "Miami"}))));
        assert_eq!(msg, "Missing required fields: state_code");

        let msg = message(
            TEST_SCHEMA.validate_create(&record(json!({"name": "  ", "state_code": null}))),
        );
        assert_eq!(msg, "Fields cannot be empty: name, state_code");
    }

    #[test]
    fn test_extra_fields_rejected() {
        let rec = record(json!({"name": "Miami", "state_code": "FL", "zip": 1, "area": 2}));
        assert_eq!(
            message(TEST_SCHEMA.validate_create(&rec)),
            "Unexpected fields: area, zip"
        );
    }

    #[test]
    fn test_code_format() {
        for bad in [json!("fl"), json!("FLA"), json!("F1"), json!(12)] {
            let rec = record(json!({"name": "Miami", "state_code": bad}));
            assert!(message(TEST_SCHEMA.validate_create(&rec)).contains("2 uppercase letters"));
        }
        assert!(validate_code(&json!("PER"), "iso_code", 2, 3).is_ok());
        assert!(message(validate_code(&json!("P"), "iso_code", 2, 3)).contains("2-3"));
    }

    #[test]
    fn test_string_length() {
        let rec = record(json!({"name": "A very long city name", "state_code": "FL"}));
        assert!(message(TEST_SCHEMA.validate_create(&rec)).contains("between 1 and 10"));
        assert!(message(validate_string_length(&json!(5), "name", 1, 10)).contains("string"));
    }

    #[test]
    fn test_positive_integer() {
        assert!(validate_positive_integer(&json!(1), "population").is_ok());
        for bad in [json!(0), json!(-5), json!(2.5), json!("10"), json!(true)] {
            assert!(validate_positive_integer(&bad, "population").is_err());
        }
    }

    #[test]
    fn test_update_partial() {
        assert!(TEST_SCHEMA
            .validate_update(&record(json!({"population": 10})))
            .is_ok());
        assert_eq!(
            message(TEST_SCHEMA.validate_update(&Record::new())),
            "No fields to update"
        );
        assert!(TEST_SCHEMA
            .validate_update(&record(json!({"state_code": "xx"})))
            .is_err());
    }
}
