use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicantId, FileUpload, RawPayload, RawValue, SubmissionId};
use super::repository::{NotificationPublisher, RepositoryError, SubmissionRepository};
use super::service::{FormSubmissionService, SubmissionError};
use crate::forms::answers::{AnswerSet, AnswerValue};
use crate::forms::store::{FormLookupError, FormSchemaStore};
use crate::forms::validation::ValidationScope;

/// Header carrying the authenticated applicant identity.
pub const APPLICANT_HEADER: &str = "x-applicant-id";

/// Router builder exposing the form schema, validation and submission endpoints.
pub fn form_router<S, R, N>(
    service: Arc<FormSubmissionService<S, R, N>>,
    max_upload_bytes: usize,
) -> Router
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/forms/:short_code",
            get(schema_handler::<S, R, N>).post(multipart_submit_handler::<S, R, N>),
        )
        .route(
            "/api/forms/:short_code/answers",
            post(json_submit_handler::<S, R, N>),
        )
        .route(
            "/api/forms/:short_code/validate",
            post(validate_handler::<S, R, N>),
        )
        .route(
            "/api/submissions/:submission_id",
            get(status_handler::<S, R, N>),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Body of a validation-only request.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub section: Option<usize>,
    #[serde(default)]
    pub answers: AnswerSet,
}

pub(crate) async fn schema_handler<S, R, N>(
    State(service): State<Arc<FormSubmissionService<S, R, N>>>,
    Path(short_code): Path<String>,
) -> Response
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.schema(&short_code) {
        Ok(schema) => (StatusCode::OK, Json(schema.as_ref().clone())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn multipart_submit_handler<S, R, N>(
    State(service): State<Arc<FormSubmissionService<S, R, N>>>,
    Path(short_code): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let mut payload = match read_multipart(multipart).await {
        Ok(payload) => payload,
        Err(error) => {
            let payload = json!({
                "success": false,
                "error": error.body_text(),
            });
            return (error.status(), Json(payload)).into_response();
        }
    };
    payload.applicant = applicant_from(&headers);
    submit(&service, &short_code, payload)
}

pub(crate) async fn json_submit_handler<S, R, N>(
    State(service): State<Arc<FormSubmissionService<S, R, N>>>,
    Path(short_code): Path<String>,
    headers: HeaderMap,
    Json(answers): Json<AnswerSet>,
) -> Response
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let mut payload = RawPayload::from_answers(answers);
    payload.applicant = applicant_from(&headers);
    submit(&service, &short_code, payload)
}

pub(crate) async fn validate_handler<S, R, N>(
    State(service): State<Arc<FormSubmissionService<S, R, N>>>,
    Path(short_code): Path<String>,
    Json(request): Json<ValidateRequest>,
) -> Response
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let scope = match request.section {
        Some(index) => ValidationScope::Section(index),
        None => ValidationScope::Form,
    };
    match service.check(&short_code, &request.answers, scope) {
        Ok(()) => (StatusCode::OK, Json(json!({ "valid": true }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S, R, N>(
    State(service): State<Arc<FormSubmissionService<S, R, N>>>,
    Path(submission_id): Path<String>,
) -> Response
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.get(&SubmissionId(submission_id)) {
        Ok(submission) => (StatusCode::OK, Json(submission.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

fn submit<S, R, N>(
    service: &FormSubmissionService<S, R, N>,
    short_code: &str,
    payload: RawPayload,
) -> Response
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.submit(short_code, payload) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

fn applicant_from(headers: &HeaderMap) -> Option<ApplicantId> {
    headers
        .get(APPLICANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| ApplicantId(value.to_string()))
}

/// Decode a multipart body. Parts named `field[]` are collected into a list; parts with a
/// file name become uploads.
async fn read_multipart(
    mut multipart: Multipart,
) -> Result<RawPayload, axum::extract::multipart::MultipartError> {
    let mut payload = RawPayload::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            let upload = FileUpload {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            };
            let name = name.strip_suffix("[]").unwrap_or(&name).to_string();
            payload.insert(name, RawValue::File(upload));
            continue;
        }

        let text = field.text().await?;
        match name.strip_suffix("[]") {
            Some(list_name) => payload.push_item(list_name, text),
            None => payload.insert(name, RawValue::Answer(AnswerValue::Text(text))),
        }
    }
    Ok(payload)
}

fn error_response(error: SubmissionError) -> Response {
    match error {
        SubmissionError::Validation(errors) => {
            let payload = json!({
                "success": false,
                "errors": errors,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        SubmissionError::Lookup(FormLookupError::NotFound { short_code }) => {
            let payload = json!({
                "error": format!("form '{short_code}' not found"),
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        SubmissionError::Repository(RepositoryError::NotFound) => {
            let payload = json!({
                "error": "submission not found",
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        error @ SubmissionError::SectionOutOfRange { .. } => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        error @ SubmissionError::Forbidden { .. } => {
            let payload = json!({
                "success": false,
                "error": error.to_string(),
            });
            (StatusCode::FORBIDDEN, Json(payload)).into_response()
        }
        error @ (SubmissionError::Duplicate { .. } | SubmissionError::AlreadyFinalized { .. }) => {
            let payload = json!({
                "success": false,
                "error": error.to_string(),
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        other => {
            tracing::error!(error = %other, "form request failed");
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
