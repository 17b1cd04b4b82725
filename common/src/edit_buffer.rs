//! Mutable working copy of a course workspace, diffed against what was fetched.

use crate::service;
use crate::store::GradeStore;
use crate::validation::{RowIssue, RowProblem, validate_batch_row, validate_grade};
use crate::workspace::CourseWorkspace;
use crate::{DATE_FORMAT, GradeError, GradeSubmission, GradingModule, StudentRow};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Rows are addressed by their position in the workspace. A roster key alone
/// is not unique once a workspace spans several assignments.
#[derive(Debug, Clone)]
pub struct EditBuffer {
    workspace: CourseWorkspace,
    edited: Vec<StudentRow>,
    selected: BTreeSet<usize>,
    module_id: Option<String>,
}

impl EditBuffer {
    pub fn new(workspace: CourseWorkspace) -> Self {
        let edited = workspace.rows.clone();
        Self {
            workspace,
            edited,
            selected: BTreeSet::new(),
            module_id: None,
        }
    }

    pub fn rows(&self) -> &[StudentRow] {
        &self.edited
    }

    pub fn workspace(&self) -> &CourseWorkspace {
        &self.workspace
    }

    /// Position of the row for `roster_key` within `assignment_name`.
    pub fn row_index(&self, assignment_name: &str, roster_key: &str) -> Option<usize> {
        self.edited
            .iter()
            .position(|row| row.assignment_name == assignment_name && row.roster_key == roster_key)
    }

    fn row_mut(&mut self, row: usize) -> Result<&mut StudentRow, GradeError> {
        self.edited
            .get_mut(row)
            .ok_or_else(|| GradeError::InvalidInput(format!("no row at position {row}")))
    }

    pub fn set_grade(&mut self, row: usize, grade_value: &str) -> Result<(), GradeError> {
        self.row_mut(row)?.grade_value = grade_value.to_string();
        Ok(())
    }

    pub fn set_date(&mut self, row: usize, date: Option<NaiveDate>) -> Result<(), GradeError> {
        self.row_mut(row)?.date = date;
        Ok(())
    }

    pub fn set_name(&mut self, row: usize, display_name: &str) -> Result<(), GradeError> {
        self.row_mut(row)?.display_name = display_name.to_string();
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.edited != self.workspace.rows
    }

    /// Positions of rows that differ from the fetched version.
    pub fn changed_rows(&self) -> Vec<usize> {
        self.edited
            .iter()
            .zip(&self.workspace.rows)
            .enumerate()
            .filter(|(_, (edited, original))| edited != original)
            .map(|(row, _)| row)
            .collect()
    }

    pub fn discard_changes(&mut self) {
        self.edited = self.workspace.rows.clone();
    }

    pub fn set_selected(&mut self, row: usize, selected: bool) -> Result<(), GradeError> {
        self.row_mut(row)?;
        if selected {
            self.selected.insert(row);
        } else {
            self.selected.remove(&row);
        }
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.selected = (0..self.edited.len()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Choose the grading module the selected rows will be recorded against.
    pub fn select_module(&mut self, module_id: &str) -> Result<&GradingModule, GradeError> {
        let module = self
            .workspace
            .modules
            .iter()
            .find(|module| module.module_id == module_id)
            .ok_or_else(|| {
                GradeError::InvalidInput(format!(
                    "module {module_id} is not offered for {}",
                    self.workspace.course_code
                ))
            })?;
        self.module_id = Some(module.module_id.clone());
        Ok(module)
    }

    pub fn selected_module(&self) -> Option<&GradingModule> {
        let module_id = self.module_id.as_deref()?;
        self.workspace
            .modules
            .iter()
            .find(|module| module.module_id == module_id)
    }

    fn draft(&self, row: &StudentRow, module_id: &str) -> GradeSubmission {
        GradeSubmission {
            identity_number: self
                .workspace
                .identities
                .get(&row.roster_key)
                .map(str::to_string),
            display_name: Some(row.display_name.clone()),
            module_id: Some(module_id.to_string()),
            grade_value: Some(row.grade_value.clone()),
            date: row.date.map(|date| date.format(DATE_FORMAT).to_string()),
            course_code: Some(self.workspace.course_code.clone()),
        }
    }

    fn drafts(&self, today: NaiveDate) -> Result<Vec<GradeSubmission>, GradeError> {
        let module_id = self
            .module_id
            .as_deref()
            .ok_or(GradeError::NoModuleSelected)?;

        let mut drafts = Vec::new();
        let mut problems = Vec::new();
        let mut seen = BTreeSet::new();
        for &index in &self.selected {
            let Some(row) = self.edited.get(index) else {
                continue;
            };
            let draft = self.draft(row, module_id);
            match validate_batch_row(&draft, today, &mut seen) {
                Ok(_) => drafts.push(draft),
                Err(issues) => problems.push(RowProblem {
                    index,
                    roster_key: Some(row.roster_key.clone()),
                    issues,
                }),
            }
        }

        if problems.is_empty() {
            Ok(drafts)
        } else {
            Err(GradeError::InvalidRows(problems))
        }
    }

    /// Check the module choice and then every selected row.
    /// Rows without an identity number are reported as unresolved, and a
    /// second selected row for the same student is refused.
    pub fn validate(&self, today: NaiveDate) -> Result<(), GradeError> {
        self.drafts(today).map(|_| ())
    }

    /// Issues for a single row, for highlighting in the table.
    pub fn row_issues(&self, row: usize, today: NaiveDate) -> BTreeSet<RowIssue> {
        let Some(row) = self.edited.get(row) else {
            return BTreeSet::new();
        };
        let module_id = self.module_id.as_deref().unwrap_or_default();
        validate_grade(&self.draft(row, module_id), today)
            .err()
            .unwrap_or_default()
    }

    /// Resolve the selected rows into grade objects ready for submission.
    pub fn prepare_submission(&self, today: NaiveDate) -> Result<Vec<GradeSubmission>, GradeError> {
        if self.selected.is_empty() {
            return Err(GradeError::NoRowsSelected);
        }
        self.drafts(today)
    }

    /// Validate and send the selected rows as one batch.
    pub fn submit(&self, store: &dyn GradeStore, today: NaiveDate) -> Result<usize, GradeError> {
        let submissions = self.prepare_submission(today)?;
        service::submit_grades(store, &submissions, today)
    }
}
