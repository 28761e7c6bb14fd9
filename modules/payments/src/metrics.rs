use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::services::reconciliation::{ReconcileOutcome, SweepSummary};

/// Prometheus metrics for the payments service.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    /// Reconciliation attempts by path (push|pull) and outcome.
    pub recon_events_total: IntCounterVec,
    /// Paid-over-failed inconsistencies needing manual review.
    pub recon_conflicts_total: IntCounter,
    pub sweep_duration_seconds: Histogram,
    pub webhook_rejected_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let recon_events_total = IntCounterVec::new(
            Opts::new("recon_events_total", "Reconciliation attempts"),
            &["path", "outcome"],
        )
        .expect("metric");

        let recon_conflicts_total = IntCounter::new(
            "recon_conflicts_total",
            "Provider-paid reports over terminal non-paid requests",
        )
        .expect("metric");

        let sweep_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "sweep_duration_seconds",
            "Duration of pending-request sweeps",
        ))
        .expect("metric");

        let webhook_rejected_total = IntCounterVec::new(
            Opts::new("webhook_rejected_total", "Rejected webhook deliveries"),
            &["reason"], // signature|malformed
        )
        .expect("metric");

        registry
            .register(Box::new(recon_events_total.clone()))
            .unwrap();
        registry
            .register(Box::new(recon_conflicts_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sweep_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(webhook_rejected_total.clone()))
            .unwrap();

        Self {
            registry,
            recon_events_total,
            recon_conflicts_total,
            sweep_duration_seconds,
            webhook_rejected_total,
        }
    }

    pub fn record_outcome(&self, path: &str, outcome: ReconcileOutcome) {
        self.recon_events_total
            .with_label_values(&[path, outcome.as_str()])
            .inc();
        if outcome == ReconcileOutcome::Conflict {
            self.recon_conflicts_total.inc();
        }
    }

    pub fn record_sweep(&self, summary: &SweepSummary) {
        self.recon_events_total
            .with_label_values(&["pull", "swept"])
            .inc_by(summary.scanned as u64);
        self.recon_conflicts_total.inc_by(summary.conflicts as u64);
    }

    pub fn render(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).map_err(|e| e.to_string())?;
        String::from_utf8(buf).map_err(|e| e.to_string())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
