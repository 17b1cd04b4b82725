//! Fairings and JSON error responses shared by the handlers.

use gradebridge_common::GradeError;
use gradebridge_common::store::GradeStore;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::Response;
use rocket::response::status as rocket_status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{Orbit, Rocket, State};
use std::time::Instant;

/// The store shared by every request, chosen once at start-up.
pub type SharedStore = Box<dyn GradeStore>;

pub fn store_ref(store: &State<SharedStore>) -> &dyn GradeStore {
    &**store.inner()
}

/// When the request reached the server, cached per request.
struct ReceivedAt(Instant);

/// Logs one line per request with its route, status and latency.
/// Server errors are logged at warn level.
#[derive(Clone, Copy)]
pub struct RequestLogFairing;

#[rocket::async_trait]
impl Fairing for RequestLogFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request log",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut rocket::Data<'_>) {
        request.local_cache(|| ReceivedAt(Instant::now()));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let ReceivedAt(received) = request.local_cache(|| ReceivedAt(Instant::now()));
        let route = request
            .route()
            .and_then(|route| route.name.as_deref())
            .unwrap_or("-");
        let status = response.status();

        if status.class().is_server_error() {
            tracing::warn!(
                method = %request.method(),
                uri = %request.uri(),
                route,
                status = status.code,
                elapsed_ms = received.elapsed().as_millis(),
                "request failed"
            );
        } else {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                route,
                status = status.code,
                elapsed_ms = received.elapsed().as_millis(),
                "request served"
            );
        }
    }
}

/// Closes the managed store to new write sessions once Rocket stops
/// accepting requests. The pool itself is dropped with the managed state.
#[derive(Clone, Copy)]
pub struct StoreShutdownFairing;

#[rocket::async_trait]
impl Fairing for StoreShutdownFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store shutdown",
            kind: Kind::Shutdown,
        }
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        match rocket.state::<SharedStore>() {
            Some(store) => {
                store.shutdown();
                tracing::info!("grade store shut down");
            }
            None => tracing::warn!("no grade store was managed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    NotFound,
    BadRequest,
    UnprocessableEntity,
    Internal,
}

impl ApiErrorKind {
    /// The kind reported for a response status that has no handler of its own.
    pub fn for_status(status: Status) -> Self {
        match status.code {
            404 => ApiErrorKind::NotFound,
            422 => ApiErrorKind::UnprocessableEntity,
            code if code >= 500 => ApiErrorKind::Internal,
            _ => ApiErrorKind::BadRequest,
        }
    }

    fn status(self) -> Status {
        match self {
            ApiErrorKind::NotFound => Status::NotFound,
            ApiErrorKind::BadRequest => Status::BadRequest,
            ApiErrorKind::UnprocessableEntity => Status::UnprocessableEntity,
            ApiErrorKind::Internal => Status::InternalServerError,
        }
    }

    pub fn with(self, message: impl Into<String>) -> ApiError {
        rocket_status::Custom(
            self.status(),
            Json(ApiErrorBody {
                error: self,
                message: message.into(),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ApiErrorBody {
    pub error: ApiErrorKind,
    pub message: String,
}

pub type ApiError = rocket_status::Custom<Json<ApiErrorBody>>;
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Client errors become 400s, backend failures 500s with the message the
/// error chose to expose.
pub fn grade_error(err: GradeError) -> ApiError {
    let kind = if err.is_client_error() {
        ApiErrorKind::BadRequest
    } else {
        ApiErrorKind::Internal
    };
    kind.with(err.to_string())
}
