use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub actions_submitted_total: IntCounterVec,
    pub pending_actions: IntGauge,
    pub submit_latency_seconds: HistogramVec,
    pub drains_total: IntCounterVec,
    pub connectivity_transitions_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let actions_submitted_total = IntCounterVec::new(
            Opts::new(
                "actions_submitted_total",
                "Remote submissions of field actions by kind and outcome",
            ),
            &["kind", "outcome"],
        )
        .expect("valid actions_submitted_total metric");

        let pending_actions =
            IntGauge::new("pending_actions", "Field actions waiting in the durable queue")
                .expect("valid pending_actions metric");

        let submit_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "submit_latency_seconds",
                "Latency of a single remote submission in seconds",
            ),
            &["kind"],
        )
        .expect("valid submit_latency_seconds metric");

        let drains_total = IntCounterVec::new(
            Opts::new("drains_total", "Queue drain runs by result"),
            &["result"],
        )
        .expect("valid drains_total metric");

        let connectivity_transitions_total = IntCounterVec::new(
            Opts::new(
                "connectivity_transitions_total",
                "Online/offline transitions observed",
            ),
            &["direction"],
        )
        .expect("valid connectivity_transitions_total metric");

        registry
            .register(Box::new(actions_submitted_total.clone()))
            .expect("register actions_submitted_total");
        registry
            .register(Box::new(pending_actions.clone()))
            .expect("register pending_actions");
        registry
            .register(Box::new(submit_latency_seconds.clone()))
            .expect("register submit_latency_seconds");
        registry
            .register(Box::new(drains_total.clone()))
            .expect("register drains_total");
        registry
            .register(Box::new(connectivity_transitions_total.clone()))
            .expect("register connectivity_transitions_total");

        Self {
            registry,
            actions_submitted_total,
            pending_actions,
            submit_latency_seconds,
            drains_total,
            connectivity_transitions_total,
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
