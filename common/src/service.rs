//! Boundary-checked operations over a [`GradeStore`].

use crate::store::{GradeSession, GradeStore};
use crate::validation::validate_batch;
use crate::{GradeError, GradeRecord, GradeSubmission, GradingModule, IdentityMap, StudentRow};
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;

fn require_course_code(course_code: &str) -> Result<&str, GradeError> {
    let course_code = course_code.trim();
    if course_code.is_empty() {
        return Err(GradeError::InvalidInput(
            "course_code is required".to_string(),
        ));
    }
    Ok(course_code)
}

/// Fetch the roster rows for a course. An empty result is not an error.
pub fn fetch_roster(
    store: &dyn GradeStore,
    course_code: &str,
    assignment_name: Option<&str>,
) -> Result<Vec<StudentRow>, GradeError> {
    let course_code = require_course_code(course_code)?;
    let assignment_name = assignment_name
        .map(str::trim)
        .filter(|name| !name.is_empty());

    debug!("Fetching roster for {course_code} (assignment: {assignment_name:?})");
    store
        .fetch_roster(course_code, assignment_name)
        .map_err(|err| {
            error!("Roster fetch for {course_code} failed: {err}");
            GradeError::Fetch("student data")
        })
}

pub fn list_assignments(
    store: &dyn GradeStore,
    course_code: &str,
) -> Result<Vec<String>, GradeError> {
    let course_code = require_course_code(course_code)?;
    store.list_assignments(course_code).map_err(|err| {
        error!("Assignment listing for {course_code} failed: {err}");
        GradeError::Fetch("assignments")
    })
}

pub fn list_modules(
    store: &dyn GradeStore,
    course_code: &str,
) -> Result<Vec<GradingModule>, GradeError> {
    let course_code = require_course_code(course_code)?;
    store.list_modules(course_code).map_err(|err| {
        error!("Module listing for {course_code} failed: {err}");
        GradeError::Fetch("grading modules")
    })
}

/// Resolve roster keys to identity numbers. Unknown keys are left out of the map.
pub fn lookup_identities(
    store: &dyn GradeStore,
    roster_keys: &[String],
) -> Result<IdentityMap, GradeError> {
    let requested: BTreeSet<String> = roster_keys
        .iter()
        .map(|key| key.trim())
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();
    if requested.is_empty() {
        return Err(GradeError::InvalidInput(
            "at least one roster key is required".to_string(),
        ));
    }

    let keys: Vec<String> = requested.iter().cloned().collect();
    let entries = store.lookup_identities(&keys).map_err(|err| {
        error!("Identity lookup for {} keys failed: {err}", keys.len());
        GradeError::Fetch("identity numbers")
    })?;

    let identities = IdentityMap::from_entries(&requested, entries);
    if identities.len() < requested.len() {
        warn!(
            "{} of {} roster keys have no identity number",
            requested.len() - identities.len(),
            requested.len()
        );
    }
    Ok(identities)
}

/// Write a batch of grades to the registry as one transaction.
///
/// The batch is refused before a session is acquired if it is empty or any
/// row fails validation. A failed write rolls the whole batch back and the
/// write error is returned even if the rollback fails too.
pub fn submit_grades(
    store: &dyn GradeStore,
    submissions: &[GradeSubmission],
    today: NaiveDate,
) -> Result<usize, GradeError> {
    if submissions.is_empty() {
        return Err(GradeError::NoRowsSelected);
    }
    let records = validate_batch(submissions, today).map_err(GradeError::InvalidRows)?;

    let mut session = store.open_session().map_err(|err| {
        error!("Could not acquire a registry session: {err}");
        GradeError::Submit(err)
    })?;
    let result = write_batch(session.as_mut(), &records);
    drop(session);

    match &result {
        Ok(count) => info!("Committed {count} grade records"),
        Err(err) => error!("Grade batch was not committed: {err}"),
    }
    result
}

fn write_batch(session: &mut dyn GradeSession, records: &[GradeRecord]) -> Result<usize, GradeError> {
    session.begin().map_err(GradeError::Submit)?;

    let written = records.iter().try_for_each(|record| {
        debug!(
            "Upserting grade for {} in module {}",
            record.identity_number, record.module_id
        );
        session.upsert_grade(record)
    });

    if let Err(write_err) = written.and_then(|()| session.commit()) {
        match session.rollback() {
            Ok(()) => info!("Transaction rolled back"),
            Err(rollback_err) => error!("Rollback failed: {rollback_err}"),
        }
        return Err(GradeError::Submit(write_err));
    }
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    fn submission(identity: &str, module: &str, grade: &str) -> GradeSubmission {
        GradeSubmission {
            identity_number: Some(identity.to_string()),
            display_name: Some(format!("Student {identity}")),
            module_id: Some(module.to_string()),
            grade_value: Some(grade.to_string()),
            date: Some("2024-06-10".to_string()),
            course_code: Some("D0009E".to_string()),
        }
    }

    fn row(key: &str, course: &str, assignment: &str) -> StudentRow {
        StudentRow {
            roster_key: key.to_string(),
            course_code: course.to_string(),
            display_name: format!("Student {key}"),
            grade_value: "G".to_string(),
            assignment_name: assignment.to_string(),
            date: None,
        }
    }

    #[test_log::test]
    fn test_fetch_roster_unknown_course_is_empty() {
        let store = MemoryStore::new().with_roster(vec![row("a", "D0009E", "Lab 1")]);
        let rows = fetch_roster(&store, "X0000X", None).unwrap();
        assert!(rows.is_empty());
    }

    #[test_log::test]
    fn test_fetch_roster_filters_by_assignment() {
        let store = MemoryStore::new().with_roster(vec![
            row("a", "D0009E", "Lab 1"),
            row("b", "D0009E", "Lab 2"),
        ]);
        let rows = fetch_roster(&store, "D0009E", Some("Lab 2")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].roster_key, "b");

        let rows = fetch_roster(&store, "D0009E", Some("  ")).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test_log::test]
    fn test_fetch_roster_requires_course_code() {
        let store = MemoryStore::new();
        let err = fetch_roster(&store, " ", None).unwrap_err();
        assert!(matches!(err, GradeError::InvalidInput(_)));
    }

    #[test_log::test]
    fn test_fetch_failure_is_generic() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        let err = fetch_roster(&store, "D0009E", None).unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch student data");
    }

    #[test_log::test]
    fn test_list_assignments_distinct_and_sorted() {
        let store = MemoryStore::new().with_roster(vec![
            row("a", "D0009E", "Lab 2"),
            row("b", "D0009E", "Lab 1"),
            row("c", "D0009E", "Lab 2"),
        ]);
        let names = list_assignments(&store, "D0009E").unwrap();
        assert_eq!(names, vec!["Lab 1".to_string(), "Lab 2".to_string()]);
    }

    #[test_log::test]
    fn test_lookup_only_returns_requested_keys() {
        let store = MemoryStore::new().with_identities([("a", "111"), ("b", "222"), ("c", "333")]);
        let identities =
            lookup_identities(&store, &["a".to_string(), "z".to_string()]).unwrap();
        assert_eq!(identities.len(), 1);
        assert_eq!(identities.get("a"), Some("111"));
        assert!(!identities.contains("z"));
        assert!(!identities.contains("b"));
    }

    #[test_log::test]
    fn test_lookup_rejects_empty_key_list() {
        let store = MemoryStore::new();
        let err = lookup_identities(&store, &[]).unwrap_err();
        assert!(matches!(err, GradeError::InvalidInput(_)));
    }

    #[test_log::test]
    fn test_submit_zero_rows_acquires_nothing() {
        let store = MemoryStore::new();
        let err = submit_grades(&store, &[], today()).unwrap_err();
        assert!(matches!(err, GradeError::NoRowsSelected));
        assert_eq!(store.sessions_opened(), 0);
    }

    #[test_log::test]
    fn test_submit_invalid_row_acquires_nothing() {
        let store = MemoryStore::new();
        let mut bad = submission("2", "m1", "G");
        bad.grade_value = None;
        let err = submit_grades(&store, &[submission("1", "m1", "G"), bad], today()).unwrap_err();
        assert!(matches!(err, GradeError::InvalidRows(ref problems) if problems.len() == 1));
        assert_eq!(store.sessions_opened(), 0);
    }

    #[test_log::test]
    fn test_submit_commits_batch() {
        let store = MemoryStore::new();
        let batch = vec![submission("1", "m1", "G"), submission("2", "m1", "U")];
        assert_eq!(submit_grades(&store, &batch, today()).unwrap(), 2);
        assert_eq!(store.grades().len(), 2);
        assert_eq!(store.sessions_opened(), 1);
        assert_eq!(store.sessions_released(), 1);
    }

    #[test_log::test]
    fn test_failed_row_rolls_back_whole_batch() {
        let store = MemoryStore::new();
        store.fail_upsert_call(Some(2));
        let batch = vec![
            submission("1", "m1", "G"),
            submission("2", "m1", "G"),
            submission("3", "m1", "G"),
        ];
        let err = submit_grades(&store, &batch, today()).unwrap_err();
        assert!(matches!(err, GradeError::Submit(_)));
        assert!(store.grades().is_empty());
        assert_eq!(store.sessions_released(), 1);
    }

    #[test_log::test]
    fn test_rollback_failure_keeps_write_error() {
        let store = MemoryStore::new();
        store.fail_upsert_call(Some(1));
        store.fail_rollback(true);
        let err = submit_grades(&store, &[submission("1", "m1", "G")], today()).unwrap_err();
        match err {
            GradeError::Submit(message) => assert!(message.contains("injected write failure")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.grades().is_empty());
        assert_eq!(store.sessions_released(), 1);
    }

    #[test_log::test]
    fn test_resubmission_overwrites_grade() {
        let store = MemoryStore::new();
        submit_grades(&store, &[submission("1", "m1", "U")], today()).unwrap();

        let mut changed = submission("1", "m1", "G");
        changed.display_name = Some("Renamed Student".to_string());
        submit_grades(&store, &[changed], today()).unwrap();

        let grades = store.grades();
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].identity_number, "1");
        assert_eq!(grades[0].module_id, "m1");
        assert_eq!(grades[0].grade_value, "G");
        assert_eq!(grades[0].display_name, "Renamed Student");
    }

    #[test_log::test]
    fn test_same_student_different_modules_are_separate() {
        let store = MemoryStore::new();
        let batch = vec![submission("1", "m1", "G"), submission("1", "m2", "VG")];
        submit_grades(&store, &batch, today()).unwrap();
        assert_eq!(store.grades().len(), 2);
    }

    #[test_log::test]
    fn test_commit_failure_rolls_back_and_reports_commit_error() {
        let store = MemoryStore::new();
        store.fail_commit(true);
        let batch = vec![submission("1", "m1", "G"), submission("2", "m1", "G")];
        let err = submit_grades(&store, &batch, today()).unwrap_err();
        assert_eq!(err.to_string(), "Failed to send grades: injected commit failure");
        assert!(store.grades().is_empty());
        assert_eq!(store.sessions_opened(), 1);
        assert_eq!(store.sessions_released(), 1);

        store.fail_commit(false);
        assert_eq!(submit_grades(&store, &batch, today()).unwrap(), 2);
        assert_eq!(store.grades().len(), 2);
    }

    #[test_log::test]
    fn test_begin_failure_releases_session() {
        let store = MemoryStore::new();
        store.fail_begin(true);
        let err = submit_grades(&store, &[submission("1", "m1", "G")], today()).unwrap_err();
        assert_eq!(err.to_string(), "Failed to send grades: injected begin failure");
        assert!(store.grades().is_empty());
        assert_eq!(store.sessions_released(), 1);
    }

    #[test_log::test]
    fn test_duplicate_key_in_batch_acquires_nothing() {
        let store = MemoryStore::new();
        let batch = vec![submission("1", "m1", "VG"), submission("1", "m1", "U")];
        let err = submit_grades(&store, &batch, today()).unwrap_err();
        assert!(matches!(err, GradeError::InvalidRows(ref problems) if problems[0].index == 1));
        assert_eq!(store.sessions_opened(), 0);
    }
}
