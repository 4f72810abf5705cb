use crate::cli::ServeArgs;
use crate::infra::{
    build_form_store, AppState, DiskFileStorage, InMemoryNotificationPublisher,
    InMemorySubmissionRepository,
};
use crate::routes::with_form_routes;
use admission_portal::config::AppConfig;
use admission_portal::error::AppError;
use admission_portal::forms::submission::FormSubmissionService;
use admission_portal::forms::WindowAvailability;
use admission_portal::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let forms = Arc::new(build_form_store(&config.forms)?);
    let availability = Arc::new(WindowAvailability);
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        forms: forms.clone(),
        availability: availability.clone(),
    };

    let repository = Arc::new(InMemorySubmissionRepository::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let uploads = Arc::new(DiskFileStorage::new(config.forms.upload_dir.clone()));
    let submission_service = Arc::new(
        FormSubmissionService::new(
            forms,
            repository,
            notifier,
            uploads,
            config.forms.resubmission,
        )
        .with_availability(availability),
    );

    let app = with_form_routes(submission_service, config.forms.max_upload_bytes)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        policy = %config.forms.resubmission,
        upload_dir = %config.forms.upload_dir.display(),
        "admission form service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
