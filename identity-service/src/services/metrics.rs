use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;
use std::time::Duration;

/// Registry and collectors, published together.
pub struct ProvisioningMetrics {
    pub registry: Registry,
    pub total: IntCounterVec,
    pub duration_seconds: Histogram,
}

static METRICS: OnceLock<ProvisioningMetrics> = OnceLock::new();

impl ProvisioningMetrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let total = IntCounterVec::new(
            Opts::new(
                "tenant_provisioning_total",
                "Total number of tenant provisioning attempts",
            ),
            &["outcome"],
        )
        .inspect_err(|e| {
            tracing::error!("Failed to create tenant_provisioning_total metric: {}", e)
        })?;

        let duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tenant_provisioning_duration_seconds",
                "Tenant provisioning duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )
        .inspect_err(|e| {
            tracing::error!(
                "Failed to create tenant_provisioning_duration_seconds metric: {}",
                e
            )
        })?;

        registry.register(Box::new(total.clone()))?;
        registry.register(Box::new(duration_seconds.clone()))?;

        Ok(Self {
            registry,
            total,
            duration_seconds,
        })
    }
}

/// Register provisioning metrics. Later calls are no-ops.
///
/// Racing first calls may each build a registry; only one is published, and
/// its collectors are the ones recorded into.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    let _ = METRICS.set(ProvisioningMetrics::new()?);
    Ok(())
}

pub fn metrics() -> Option<&'static ProvisioningMetrics> {
    METRICS.get()
}

/// Count one provisioning attempt and its duration.
pub fn record_provisioning(outcome: &str, elapsed: Duration) {
    if let Some(metrics) = METRICS.get() {
        metrics.total.with_label_values(&[outcome]).inc();
        metrics.duration_seconds.observe(elapsed.as_secs_f64());
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match METRICS.get() {
        Some(m) => &m.registry,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
