//! HTTP handlers. Each one is a thin adapter over the common grade workflow.

use crate::helpers::{ApiError, ApiErrorKind, ApiResult, SharedStore, grade_error, store_ref};
use gradebridge_common::validation::local_today;
use gradebridge_common::{
    GradeSubmission, GradingModule, IdentityEntry, StudentRow, service, workspace,
};
use rocket::State;
use rocket::http::Status;
use rocket::request::Request;
use rocket::serde::json::{Json, Value, json};

#[get("/students?<course_code>&<assignment_name>")]
pub fn students(
    course_code: Option<&str>,
    assignment_name: Option<&str>,
    store: &State<SharedStore>,
) -> ApiResult<Vec<StudentRow>> {
    service::fetch_roster(
        store_ref(store),
        course_code.unwrap_or_default(),
        assignment_name,
    )
    .map(Json)
    .map_err(grade_error)
}

#[get("/assignments?<course_code>")]
pub fn assignments(course_code: Option<&str>, store: &State<SharedStore>) -> ApiResult<Vec<String>> {
    service::list_assignments(store_ref(store), course_code.unwrap_or_default())
        .map(Json)
        .map_err(grade_error)
}

#[get("/modules?<course_code>")]
pub fn modules(
    course_code: Option<&str>,
    store: &State<SharedStore>,
) -> ApiResult<Vec<GradingModule>> {
    service::list_modules(store_ref(store), course_code.unwrap_or_default())
        .map(Json)
        .map_err(grade_error)
}

#[post("/identities", data = "<body>")]
pub fn identities(body: Json<Value>, store: &State<SharedStore>) -> ApiResult<Vec<IdentityEntry>> {
    let Some(items) = body.as_array() else {
        return Err(ApiErrorKind::BadRequest
            .with("Invalid request format: expected an array of roster keys"));
    };
    let roster_keys = items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect::<Option<Vec<String>>>()
        .ok_or_else(|| {
            ApiErrorKind::BadRequest.with("Invalid request format: roster keys must be strings")
        })?;

    service::lookup_identities(store_ref(store), &roster_keys)
        .map(|identities| Json(identities.entries()))
        .map_err(grade_error)
}

/// Parse each grade object on its own so a bad element is reported by index.
fn parse_submissions(body: Value) -> Result<Vec<GradeSubmission>, ApiError> {
    let Value::Array(items) = body else {
        return Err(ApiErrorKind::BadRequest
            .with("Invalid grades data: expected an array of grade objects"));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|err| {
                ApiErrorKind::BadRequest
                    .with(format!("Invalid grade object at index {index}: {err}"))
            })
        })
        .collect()
}

#[post("/grades", data = "<body>")]
pub fn grades(body: Json<Value>, store: &State<SharedStore>) -> ApiResult<Value> {
    let submissions = parse_submissions(body.into_inner())?;
    let count = service::submit_grades(store_ref(store), &submissions, local_today())
        .map_err(grade_error)?;
    Ok(Json(json!({ "success": true, "count": count })))
}

#[get("/workspace?<course_code>&<assignment_name>")]
pub fn course_workspace(
    course_code: Option<&str>,
    assignment_name: Option<&str>,
    store: &State<SharedStore>,
) -> ApiResult<Value> {
    let loaded = workspace::load_course_workspace(
        store_ref(store),
        course_code.unwrap_or_default(),
        assignment_name,
    )
    .map_err(grade_error)?;

    Ok(Json(json!({
        "empty": loaded.is_none(),
        "workspace": loaded,
    })))
}

#[catch(default)]
pub fn default_catcher(status: Status, _request: &Request<'_>) -> ApiError {
    let message = match status.code {
        404 => "The requested resource could not be found.",
        422 => "The request body could not be processed.",
        code if code >= 500 => "Internal server error.",
        _ => "The request could not be understood.",
    };
    let mut response = ApiErrorKind::for_status(status).with(message);
    response.0 = status;
    response
}
