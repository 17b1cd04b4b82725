//! A library with common utilities for reconciling course grades and submitting them.

pub mod edit_buffer;
pub mod error;
pub mod memory;
pub mod service;
pub mod store;
pub mod validation;
pub mod workspace;

#[cfg(feature = "database")]
pub mod db_util;

use chrono::NaiveDate;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub use error::GradeError;

/// Wire format for every date handled by the service.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One student's row for a course assignment, as fetched from the roster.
/// Empty strings mean the value has not been filled in yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRow {
    pub roster_key: String,
    pub course_code: String,
    pub display_name: String,
    pub grade_value: String,
    pub assignment_name: String,
    pub date: Option<NaiveDate>,
}

/// A roster key paired with the identity number it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub roster_key: String,
    pub identity_number: String,
}

/// Read-only lookup from roster key to identity number.
/// Keys that could not be resolved are absent, never mapped to an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityMap(BTreeMap<String, String>);

impl IdentityMap {
    /// Build a map from lookup results, keeping only keys that were requested
    /// and dropping entries with a blank identity number.
    pub fn from_entries(requested: &BTreeSet<String>, entries: Vec<IdentityEntry>) -> Self {
        let map = entries
            .into_iter()
            .filter(|entry| requested.contains(&entry.roster_key))
            .filter(|entry| !entry.identity_number.trim().is_empty())
            .map(|entry| (entry.roster_key, entry.identity_number))
            .collect();
        Self(map)
    }

    pub fn get(&self, roster_key: &str) -> Option<&str> {
        self.0.get(roster_key).map(String::as_str)
    }

    pub fn contains(&self, roster_key: &str) -> bool {
        self.0.contains_key(roster_key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The resolved pairs in roster key order.
    pub fn entries(&self) -> Vec<IdentityEntry> {
        self.0
            .iter()
            .map(|(roster_key, identity_number)| IdentityEntry {
                roster_key: roster_key.clone(),
                identity_number: identity_number.clone(),
            })
            .collect()
    }
}

/// A module in the grading registry that grades are recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingModule {
    pub module_id: String,
    pub module_label: String,
    pub course_code: String,
}

/// A grade object as received from a client. Every field is optional so that
/// incomplete rows can be reported field by field instead of failing to parse.
/// Numbers and booleans are taken as their string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeSubmission {
    #[serde(default, deserialize_with = "deserialize_scalar_to_string")]
    pub identity_number: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_to_string")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_to_string")]
    pub module_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_to_string")]
    pub grade_value: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_to_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_to_string")]
    pub course_code: Option<String>,
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Option<String>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string, number, boolean or null")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(Some(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(Some(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(Some(value.to_string()))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(Some(value.to_string()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(Some(value.to_string()))
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
        Ok(Some(value.to_string()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

fn deserialize_scalar_to_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_option(ScalarVisitor)
}

/// A validated grade, ready to be written to the registry.
/// `(identity_number, module_id)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub identity_number: String,
    pub display_name: String,
    pub module_id: String,
    pub grade_value: String,
    pub date: NaiveDate,
    pub course_code: String,
}

impl GradeRecord {
    pub fn key(&self) -> (String, String) {
        (self.identity_number.clone(), self.module_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, number: &str) -> IdentityEntry {
        IdentityEntry {
            roster_key: key.to_string(),
            identity_number: number.to_string(),
        }
    }

    #[test_log::test]
    fn test_identity_map_keeps_only_requested_keys() {
        let requested = BTreeSet::from(["a".to_string(), "b".to_string()]);
        let map = IdentityMap::from_entries(
            &requested,
            vec![entry("a", "111"), entry("b", " "), entry("x", "999")],
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a"), Some("111"));
        assert!(!map.contains("b"));
        assert!(!map.contains("x"));
        assert_eq!(map.entries(), vec![entry("a", "111")]);
        assert!(!map.is_empty());
        assert!(IdentityMap::from_entries(&requested, vec![entry("x", "999")]).is_empty());
    }

    #[test_log::test]
    fn test_student_row_dates_use_wire_format() {
        let row = StudentRow {
            roster_key: "adalov-1".to_string(),
            course_code: "D0009E".to_string(),
            display_name: "Ada Lovelace".to_string(),
            grade_value: String::new(),
            assignment_name: "Lab 1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["date"], "2024-06-01");

        let undated = StudentRow { date: None, ..row };
        assert!(serde_json::to_value(&undated).unwrap()["date"].is_null());
    }

    #[test_log::test]
    fn test_grade_submission_tolerates_missing_fields() {
        let submission: GradeSubmission =
            serde_json::from_str(r#"{"identity_number": "111", "module_id": "0005"}"#).unwrap();
        assert_eq!(submission.identity_number.as_deref(), Some("111"));
        assert!(submission.grade_value.is_none());
    }

    #[test_log::test]
    fn test_grade_submission_takes_scalars_as_strings() {
        let submission: GradeSubmission = serde_json::from_str(
            r#"{"identity_number": 199001011234, "module_id": 5, "grade_value": true, "date": null}"#,
        )
        .unwrap();
        assert_eq!(submission.identity_number.as_deref(), Some("199001011234"));
        assert_eq!(submission.module_id.as_deref(), Some("5"));
        assert_eq!(submission.grade_value.as_deref(), Some("true"));
        assert!(submission.date.is_none());
    }

    #[test_log::test]
    fn test_grade_submission_rejects_nested_values() {
        let err = serde_json::from_str::<GradeSubmission>(r#"{"module_id": ["0005"]}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("expected a string, number, boolean or null"));
    }
}
