//! The seam between the grade workflow and whatever holds the data.

use crate::{GradeRecord, GradingModule, IdentityEntry, StudentRow};

/// Read access to the roster, identity and catalog tables plus a way to open
/// a write session against the grading registry.
///
/// Stores are constructed once at start-up and passed to whoever needs them.
pub trait GradeStore: Send + Sync {
    /// Rows for a course, optionally narrowed to one assignment.
    fn fetch_roster(
        &self,
        course_code: &str,
        assignment_name: Option<&str>,
    ) -> Result<Vec<StudentRow>, String>;

    /// Distinct assignment names for a course, in name order.
    fn list_assignments(&self, course_code: &str) -> Result<Vec<String>, String>;

    /// Grading modules for a course, in module id order.
    fn list_modules(&self, course_code: &str) -> Result<Vec<GradingModule>, String>;

    /// Identity numbers for whichever of the keys are known.
    fn lookup_identities(&self, roster_keys: &[String]) -> Result<Vec<IdentityEntry>, String>;

    /// Acquire an exclusive session for one batch of writes.
    fn open_session(&self) -> Result<Box<dyn GradeSession>, String>;

    /// Stop handing out sessions. Sessions already open finish their batch.
    fn shutdown(&self) {}
}

/// One exclusive connection to the grading registry.
///
/// Dropping the session releases the connection.
pub trait GradeSession: Send {
    fn begin(&mut self) -> Result<(), String>;

    /// Insert the record, or overwrite name, grade, date and course of the
    /// record already stored under the same `(identity_number, module_id)`.
    fn upsert_grade(&mut self, record: &GradeRecord) -> Result<(), String>;

    fn commit(&mut self) -> Result<(), String>;

    fn rollback(&mut self) -> Result<(), String>;
}
