//! Errors surfaced by the grade workflow.

use crate::validation::RowProblem;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GradeError {
    /// The caller supplied a missing or malformed parameter.
    #[error("{0}")]
    InvalidInput(String),

    /// A storage read failed. The underlying detail is logged, not returned.
    #[error("Failed to fetch {0}")]
    Fetch(&'static str),

    #[error("No rows selected for submission")]
    NoRowsSelected,

    #[error("No grading module selected")]
    NoModuleSelected,

    #[error("{}", join_problems(.0))]
    InvalidRows(Vec<RowProblem>),

    /// The batch write failed and was rolled back.
    #[error("Failed to send grades: {0}")]
    Submit(String),
}

impl GradeError {
    /// Whether the error was caused by the request rather than the backend.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, GradeError::Fetch(_) | GradeError::Submit(_))
    }
}

fn join_problems(problems: &[RowProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
