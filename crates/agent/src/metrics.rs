//! Performance sinks
//!
//! Every chat call produces one [`PerformanceSample`]. Sinks are synchronous
//! and must not block; the orchestrator logs and drops their errors.

use roleplay_core::PerformanceSample;

use crate::AgentError;

/// Receiver of per-call latency samples
pub trait PerformanceSink: Send + Sync {
    fn record(&self, sample: &PerformanceSample) -> Result<(), AgentError>;
}

/// Writes samples to the `roleplay::perf` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PerformanceSink for TracingSink {
    fn record(&self, sample: &PerformanceSample) -> Result<(), AgentError> {
        tracing::info!(
            target: "roleplay::perf",
            session_id = %sample.session_id,
            stage = %sample.stage,
            strategy = %sample.strategy,
            provider = %sample.provider,
            model = %sample.model,
            latency_ms = sample.latency_ms,
            input_len = sample.input_len,
            output_len = sample.output_len,
            "Chat latency"
        );
        Ok(())
    }
}

/// Discards every sample
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl PerformanceSink for NoopSink {
    fn record(&self, _sample: &PerformanceSample) -> Result<(), AgentError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Collects samples for assertions
    #[derive(Default)]
    pub(crate) struct CollectingSink {
        pub samples: Mutex<Vec<PerformanceSample>>,
    }

    impl PerformanceSink for CollectingSink {
        fn record(&self, sample: &PerformanceSample) -> Result<(), AgentError> {
            self.samples.lock().push(sample.clone());
            Ok(())
        }
    }

    fn sample() -> PerformanceSample {
        PerformanceSample {
            session_id: "s1".to_string(),
            stage: "intent".to_string(),
            strategy: "consultative".to_string(),
            latency_ms: 12.5,
            provider: "ollama".to_string(),
            model: "llama3.2:3b".to_string(),
            input_len: 40,
            output_len: 10,
            recorded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_builtin_sinks_accept() {
        assert!(TracingSink.record(&sample()).is_ok());
        assert!(NoopSink.record(&sample()).is_ok());
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::default();
        sink.record(&sample()).unwrap();
        assert_eq!(sink.samples.lock().len(), 1);
    }
}
