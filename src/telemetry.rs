//! Structured logging setup.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

pub fn init_telemetry(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json().with_current_span(true).with_span_list(true))
        .with(filter)
        .init();

    tracing::info!("telemetry initialized with structured logging");
    Ok(())
}

/// Correlation id for linking a dispatcher tick to the runner/store/vcs
/// calls it triggers across log lines.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn create_dispatch_span(project_id: &str, agent_id: &str, issue_id: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "agent_dispatch",
        project.id = project_id,
        agent.id = agent_id,
        issue.id = issue_id,
        correlation.id = correlation_id,
    )
}

pub fn shutdown_telemetry() {
    tracing::info!("telemetry shutdown complete");
}
