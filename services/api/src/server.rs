use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryTransactionRepository, LoggingActivator, TracingAuditLog};
use crate::routes::with_approval_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use membership_approvals::config::AppConfig;
use membership_approvals::error::AppError;
use membership_approvals::telemetry;
use membership_approvals::workflows::approvals::ApprovalOrchestrator;
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
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let orchestrator = Arc::new(ApprovalOrchestrator::new(
        Arc::new(InMemoryTransactionRepository::default()),
        Arc::new(TracingAuditLog::default()),
        Arc::new(LoggingActivator::default()),
        config.approvals.clone(),
    ));

    let app = with_approval_routes(orchestrator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        auto_approve = config.approvals.auto_approval.enabled,
        auto_approve_limit = %config.approvals.auto_approval.max_amount,
        "membership approval service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
