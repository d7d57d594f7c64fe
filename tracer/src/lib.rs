//! Logging/tracing initialization for embedders of this crate.
//!
//! The core workspace is a library, not a server, so by default we only wire
//! a local stdout + json `tracing-subscriber` pipeline. Callers that embed
//! this store inside an already-traced service can enable the `otel` feature
//! to additionally export spans via OTLP.

use tracing::subscriber::set_global_default;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Initializes a process-global `tracing` subscriber with stdout + json layers.
///
/// Safe to call more than once (e.g. from multiple test modules): a second
/// call simply fails to install and is ignored, rather than panicking.
pub fn init_tracing(log_level: Option<&str>) {
    let env_filter = EnvFilter::new(log_level.unwrap_or("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().pretty();
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_level(true)
        .with_current_span(true)
        .with_thread_names(true);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(json_layer)
        .with(stdout_layer);

    let _ = set_global_default(subscriber);
}

#[cfg(feature = "otel")]
pub fn init_tracing_with_otel(service_name: &'static str, log_level: Option<&str>, otel_url: &str) {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{
        trace::{self, Sampler},
        Resource,
    };

    let env_filter = EnvFilter::new(log_level.unwrap_or("info"));

    let otel_layer = tracing_opentelemetry::layer().with_tracer(
        opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(otel_url),
            )
            .with_trace_config(
                trace::config()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_resource(Resource::new(vec![KeyValue::new(
                        "service.name",
                        service_name,
                    )])),
            )
            .install_batch(opentelemetry_sdk::runtime::TokioCurrentThread)
            .expect("could not build otel pipeline"),
    );

    let stdout_layer = tracing_subscriber::fmt::layer().pretty();
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_level(true)
        .with_current_span(true)
        .with_thread_names(true);

    let subscriber = Registry::default().with(env_filter).with(json_layer);

    let _ = set_global_default(subscriber.with(stdout_layer).with(otel_layer));
}

#[cfg(feature = "otel")]
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic_when_called_twice() {
        init_tracing(Some("debug"));
        init_tracing(Some("debug"));
    }
}
