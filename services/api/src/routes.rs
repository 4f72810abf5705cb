use crate::infra::AppState;
use admission_portal::forms::submission::{
    form_router, FormSubmissionService, NotificationPublisher, SubmissionRepository,
};
use admission_portal::forms::{FormSchema, FormSchemaStore};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Catalog entry for `GET /api/forms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct FormSummary {
    pub(crate) short_code: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) steps: Vec<String>,
    pub(crate) is_active: bool,
}

impl FormSummary {
    fn from_schema(schema: &FormSchema) -> Self {
        Self {
            short_code: schema.short_code().to_string(),
            title: schema.title().to_string(),
            description: schema.form().description.clone(),
            steps: schema
                .sections()
                .iter()
                .map(|section| section.title.clone())
                .collect(),
            is_active: schema.form().is_active,
        }
    }
}

pub(crate) fn with_form_routes<S, R, N>(
    service: Arc<FormSubmissionService<S, R, N>>,
    max_upload_bytes: usize,
) -> axum::Router
where
    S: FormSchemaStore + 'static,
    R: SubmissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    form_router(service, max_upload_bytes)
        .route("/api/forms", axum::routing::get(form_index))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Forms an applicant can open right now: active and inside their activation window.
pub(crate) async fn form_index(Extension(state): Extension<AppState>) -> impl IntoResponse {
    match state.forms.list() {
        Ok(forms) => {
            let summaries: Vec<FormSummary> = forms
                .iter()
                .filter(|schema| {
                    schema.form().is_active && state.availability.is_open(schema.form())
                })
                .map(|schema| FormSummary::from_schema(schema))
                .collect();
            (StatusCode::OK, Json(json!({ "forms": summaries }))).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "form catalog unavailable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
