use prometheus::{
    Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub lifecycle_operations_total: IntCounterVec,
    pub lifecycle_latency_seconds: HistogramVec,
    pub mirror_write_failures_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let lifecycle_operations_total = IntCounterVec::new(
            Opts::new(
                "lifecycle_operations_total",
                "Lifecycle operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid lifecycle_operations_total metric");

        let lifecycle_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "lifecycle_latency_seconds",
                "Latency of lifecycle operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid lifecycle_latency_seconds metric");

        let mirror_write_failures_total = IntCounterVec::new(
            Opts::new(
                "mirror_write_failures_total",
                "Realtime mirror writes that failed after the primary write succeeded",
            ),
            &["entity"],
        )
        .expect("valid mirror_write_failures_total metric");

        registry
            .register(Box::new(lifecycle_operations_total.clone()))
            .expect("register lifecycle_operations_total");
        registry
            .register(Box::new(lifecycle_latency_seconds.clone()))
            .expect("register lifecycle_latency_seconds");
        registry
            .register(Box::new(mirror_write_failures_total.clone()))
            .expect("register mirror_write_failures_total");

        Self {
            registry,
            lifecycle_operations_total,
            lifecycle_latency_seconds,
            mirror_write_failures_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
