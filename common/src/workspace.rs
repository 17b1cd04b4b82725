//! Load everything needed to edit and submit one course's grades.

use crate::service;
use crate::store::GradeStore;
use crate::{GradeError, GradingModule, IdentityMap, StudentRow};
use log::info;
use serde::Serialize;

/// The joined result of the roster, identity and catalog reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseWorkspace {
    pub course_code: String,
    pub assignment_name: Option<String>,
    pub rows: Vec<StudentRow>,
    pub identities: IdentityMap,
    pub modules: Vec<GradingModule>,
    pub assignments: Vec<String>,
}

impl CourseWorkspace {
    /// Roster keys with no identity number; these rows cannot be submitted.
    pub fn unresolved_keys(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.roster_key.as_str())
            .filter(|key| !self.identities.contains(key))
            .collect()
    }
}

/// Fetch the roster and, if it has any rows, the identities, grading modules
/// and assignment list for the course. Those three reads run concurrently.
///
/// Returns `Ok(None)` for an empty roster without issuing the other reads.
pub fn load_course_workspace(
    store: &dyn GradeStore,
    course_code: &str,
    assignment_name: Option<&str>,
) -> Result<Option<CourseWorkspace>, GradeError> {
    let rows = service::fetch_roster(store, course_code, assignment_name)?;
    if rows.is_empty() {
        info!("No roster rows for {course_code}, skipping catalog and identity reads");
        return Ok(None);
    }

    let course_code = course_code.trim();
    let roster_keys: Vec<String> = rows.iter().map(|row| row.roster_key.clone()).collect();

    let (identities, (modules, assignments)) = rayon::join(
        || service::lookup_identities(store, &roster_keys),
        || {
            rayon::join(
                || service::list_modules(store, course_code),
                || service::list_assignments(store, course_code),
            )
        },
    );

    let workspace = CourseWorkspace {
        course_code: course_code.to_string(),
        assignment_name: assignment_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        rows,
        identities: identities?,
        modules: modules?,
        assignments: assignments?,
    };
    info!(
        "Loaded {} rows for {} ({} unresolved identities, {} modules)",
        workspace.rows.len(),
        workspace.course_code,
        workspace.unresolved_keys().len(),
        workspace.modules.len()
    );
    Ok(Some(workspace))
}
