//! Observability Metrics
//!
//! Prometheus recorder, metric helpers and the `/metrics` handler.

use std::sync::OnceLock;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use roleplay_agent::{AgentError, PerformanceSink};
use roleplay_core::PerformanceSample;

use crate::state::AppState;
use crate::ServerError;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    register_default_metrics();

    METRICS_HANDLE.get_or_init(|| handle.clone());
    Ok(handle)
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

fn register_default_metrics() {
    gauge!("roleplay_sessions_active").set(0.0);
    counter!("roleplay_sessions_created_total").absolute(0);
    counter!("roleplay_chat_total").absolute(0);
    counter!("roleplay_fallback_total").absolute(0);
    counter!("roleplay_stage_transitions_total").absolute(0);
}

pub fn record_session_created(flow_type: &'static str) {
    counter!("roleplay_sessions_created_total", "flow" => flow_type).increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("roleplay_sessions_active").set(count as f64);
}

pub fn record_fallback(provider: &str) {
    counter!("roleplay_fallback_total", "provider" => provider.to_string()).increment(1);
}

pub fn record_transition(flow_type: &'static str, from: &str, to: &str) {
    counter!(
        "roleplay_stage_transitions_total",
        "flow" => flow_type,
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Performance sink backed by the global metrics recorder
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

impl PerformanceSink for PrometheusSink {
    fn record(&self, sample: &PerformanceSample) -> Result<(), AgentError> {
        histogram!(
            "roleplay_chat_latency_ms",
            "stage" => sample.stage.clone(),
            "provider" => sample.provider.clone()
        )
        .record(sample.latency_ms);
        counter!(
            "roleplay_chat_total",
            "strategy" => sample.strategy.clone(),
            "provider" => sample.provider.clone()
        )
        .increment(1);

        tracing::debug!(
            session_id = %sample.session_id,
            stage = %sample.stage,
            provider = %sample.provider,
            latency_ms = sample.latency_ms,
            "Recorded chat sample"
        );
        Ok(())
    }
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    record_active_sessions(state.sessions.count());

    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_helpers() {
        // No recorder installed: all of these are no-ops and must not panic
        record_session_created("consultative");
        record_active_sessions(3);
        record_fallback("ollama");
        record_transition("consultative", "intent", "pitch");
    }

    #[test]
    fn test_prometheus_sink_accepts_samples() {
        let sample = PerformanceSample {
            session_id: "s".to_string(),
            stage: "intent".to_string(),
            strategy: "consultative".to_string(),
            latency_ms: 42.0,
            provider: "groq".to_string(),
            model: "m".to_string(),
            input_len: 10,
            output_len: 5,
            recorded_at: chrono::Utc::now(),
        };
        assert!(PrometheusSink.record(&sample).is_ok());
    }
}
