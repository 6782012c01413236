use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean. `RUST_LOG` wins over the configured level.
pub fn init_telemetry(log_level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    // a second init (tests, embedding) keeps the first subscriber
    if installed.is_ok() {
        tracing::debug!(log_level, json, "Telemetry initialized");
    }
    Ok(())
}

/// Generate a correlation ID for linking the log lines of one save
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one save and the sync it triggers
pub fn save_span(doc_id: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!("save", doc_id = doc_id, correlation.id = correlation_id)
}
