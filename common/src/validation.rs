//! Field-completeness and date checks shared by every path that writes grades.

use crate::{DATE_FORMAT, GradeRecord, GradeSubmission};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// A single reason a grade row cannot be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssue {
    MissingIdentity,
    MissingName,
    MissingModule,
    MissingGrade,
    MissingDate,
    MissingCourse,
    MalformedDate,
    FutureDate,
    /// A second row in one batch for the same identity number and module.
    DuplicateKey,
}

impl RowIssue {
    /// The wire field this issue concerns.
    pub fn field(self) -> &'static str {
        match self {
            RowIssue::MissingIdentity | RowIssue::DuplicateKey => "identity_number",
            RowIssue::MissingName => "display_name",
            RowIssue::MissingModule => "module_id",
            RowIssue::MissingGrade => "grade_value",
            RowIssue::MissingDate | RowIssue::MalformedDate | RowIssue::FutureDate => "date",
            RowIssue::MissingCourse => "course_code",
        }
    }

    pub fn is_missing(self) -> bool {
        !matches!(
            self,
            RowIssue::MalformedDate | RowIssue::FutureDate | RowIssue::DuplicateKey
        )
    }
}

/// Every issue found on one row, with enough context to point the user at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowProblem {
    pub index: usize,
    pub roster_key: Option<String>,
    pub issues: BTreeSet<RowIssue>,
}

impl fmt::Display for RowProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid grade data at index {}", self.index)?;
        if let Some(key) = &self.roster_key {
            write!(f, " ({key})")?;
        }
        write!(f, ".")?;

        let missing: Vec<&str> = self
            .issues
            .iter()
            .filter(|issue| issue.is_missing())
            .map(|issue| issue.field())
            .collect();
        if !missing.is_empty() {
            write!(f, " Missing fields: {}.", missing.join(", "))?;
        }
        if self.issues.contains(&RowIssue::MalformedDate) {
            write!(f, " Invalid fields: date.")?;
        }
        if self.issues.contains(&RowIssue::FutureDate) {
            write!(f, " Date is in the future.")?;
        }
        if self.issues.contains(&RowIssue::DuplicateKey) {
            write!(f, " Another row already grades this student in this module.")?;
        }
        Ok(())
    }
}

/// Today's calendar date in local time.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// True when `date` falls on a later calendar day than `today`.
/// Any time of day on `today` is accepted.
pub fn is_future_date(date: NaiveDate, today: NaiveDate) -> bool {
    date > today
}

/// Parse a grade date. Accepts `YYYY-MM-DD`, RFC 3339 timestamps (converted to
/// the local calendar date) and naive `YYYY-MM-DDTHH:MM:SS` timestamps.
pub fn parse_grade_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, DATE_FORMAT) {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(input) {
        return Some(timestamp.with_timezone(&Local).date_naive());
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|timestamp| timestamp.date())
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Check a grade object and turn it into a record that may be persisted.
/// Every problem is collected; nothing is short-circuited.
pub fn validate_grade(
    submission: &GradeSubmission,
    today: NaiveDate,
) -> Result<GradeRecord, BTreeSet<RowIssue>> {
    let mut issues = BTreeSet::new();

    let identity_number = present(&submission.identity_number);
    if identity_number.is_none() {
        issues.insert(RowIssue::MissingIdentity);
    }
    let display_name = present(&submission.display_name);
    if display_name.is_none() {
        issues.insert(RowIssue::MissingName);
    }
    let module_id = present(&submission.module_id);
    if module_id.is_none() {
        issues.insert(RowIssue::MissingModule);
    }
    let grade_value = present(&submission.grade_value);
    if grade_value.is_none() {
        issues.insert(RowIssue::MissingGrade);
    }
    let course_code = present(&submission.course_code);
    if course_code.is_none() {
        issues.insert(RowIssue::MissingCourse);
    }

    let date = match present(&submission.date) {
        None => {
            issues.insert(RowIssue::MissingDate);
            None
        }
        Some(raw) => match parse_grade_date(raw) {
            None => {
                issues.insert(RowIssue::MalformedDate);
                None
            }
            Some(date) if is_future_date(date, today) => {
                issues.insert(RowIssue::FutureDate);
                None
            }
            Some(date) => Some(date),
        },
    };

    match (
        identity_number,
        display_name,
        module_id,
        grade_value,
        date,
        course_code,
    ) {
        (
            Some(identity_number),
            Some(display_name),
            Some(module_id),
            Some(grade_value),
            Some(date),
            Some(course_code),
        ) if issues.is_empty() => Ok(GradeRecord {
            identity_number: identity_number.to_string(),
            display_name: display_name.to_string(),
            module_id: module_id.to_string(),
            grade_value: grade_value.to_string(),
            date,
            course_code: course_code.to_string(),
        }),
        _ => Err(issues),
    }
}

/// Validate one row of a batch. A row whose `(identity_number, module_id)`
/// was already accepted earlier in the batch is refused, since both would
/// upsert the same record and only the last would survive.
pub fn validate_batch_row(
    submission: &GradeSubmission,
    today: NaiveDate,
    seen: &mut BTreeSet<(String, String)>,
) -> Result<GradeRecord, BTreeSet<RowIssue>> {
    let record = validate_grade(submission, today)?;
    if !seen.insert(record.key()) {
        return Err(BTreeSet::from([RowIssue::DuplicateKey]));
    }
    Ok(record)
}

/// Validate a whole batch, returning the records only if every row passes.
pub fn validate_batch(
    submissions: &[GradeSubmission],
    today: NaiveDate,
) -> Result<Vec<GradeRecord>, Vec<RowProblem>> {
    let mut records = Vec::with_capacity(submissions.len());
    let mut problems = Vec::new();
    let mut seen = BTreeSet::new();

    for (index, submission) in submissions.iter().enumerate() {
        match validate_batch_row(submission, today, &mut seen) {
            Ok(record) => records.push(record),
            Err(issues) => problems.push(RowProblem {
                index,
                roster_key: None,
                issues,
            }),
        }
    }

    if problems.is_empty() {
        Ok(records)
    } else {
        Err(problems)
    }
}
