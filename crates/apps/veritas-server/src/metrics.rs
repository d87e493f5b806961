//! Prometheus metrics for the Veritas server.
//!
//! Counts queries by outcome, charges by status and the raw token units
//! charged and burned, plus query latency.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use veritas_ops::{OpsError, QueryFailure, QueryOutcome};
use veritas_pay::PayError;

/// Metrics registry and definitions for the server.
pub struct Metrics {
    /// The Prometheus registry containing all metrics.
    pub registry: Registry,

    // =========================================================================
    // Query Metrics
    // =========================================================================
    /// Total queries by outcome (`answered` or an error code).
    pub queries_total: IntCounterVec,

    /// Query latency in seconds.
    pub query_latency_seconds: Histogram,

    // =========================================================================
    // Payment Metrics
    // =========================================================================
    /// Total charges by final status.
    pub charges_total: IntCounterVec,

    /// Raw token units moved from users.
    pub raw_charged_total: IntCounter,

    /// Raw token units burned.
    pub raw_burned_total: IntCounter,

    /// Unsigned transactions built, by kind (`charge` or `allowance`).
    pub payment_requests_total: IntCounterVec,

    /// Payment verifications by result.
    pub verifications_total: IntCounterVec,

    // =========================================================================
    // Server Metrics
    // =========================================================================
    /// Server uptime in seconds.
    pub uptime_seconds: IntGauge,

    /// Server information (version, ledger network).
    pub server_info: IntGaugeVec,
}

impl Metrics {
    /// Create a new Metrics instance with all metrics registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        // Query metrics
        let queries_total = IntCounterVec::new(
            Opts::new("veritas_queries_total", "Total queries by outcome"),
            &["outcome"],
        )
        .expect("metric creation should not fail");

        let query_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("veritas_query_latency_seconds", "Query latency in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )
        .expect("metric creation should not fail");

        // Payment metrics
        let charges_total = IntCounterVec::new(
            Opts::new("veritas_charges_total", "Total charges by status"),
            &["status"],
        )
        .expect("metric creation should not fail");

        let raw_charged_total = IntCounter::with_opts(Opts::new(
            "veritas_raw_charged_total",
            "Raw token units charged",
        ))
        .expect("metric creation should not fail");

        let raw_burned_total = IntCounter::with_opts(Opts::new(
            "veritas_raw_burned_total",
            "Raw token units burned",
        ))
        .expect("metric creation should not fail");

        let payment_requests_total = IntCounterVec::new(
            Opts::new(
                "veritas_payment_requests_total",
                "Unsigned transactions built",
            ),
            &["kind"],
        )
        .expect("metric creation should not fail");

        let verifications_total = IntCounterVec::new(
            Opts::new("veritas_verifications_total", "Payment verifications"),
            &["result"],
        )
        .expect("metric creation should not fail");

        // Server metrics
        let uptime_seconds = IntGauge::with_opts(Opts::new(
            "veritas_uptime_seconds",
            "Server uptime in seconds",
        ))
        .expect("metric creation should not fail");

        let server_info = IntGaugeVec::new(
            Opts::new("veritas_server_info", "Server information"),
            &["version", "network"],
        )
        .expect("metric creation should not fail");

        // Register all metrics
        registry
            .register(Box::new(queries_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(query_latency_seconds.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(charges_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(raw_charged_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(raw_burned_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(payment_requests_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(verifications_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(uptime_seconds.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(server_info.clone()))
            .expect("registration should not fail");

        Self {
            registry,
            queries_total,
            query_latency_seconds,
            charges_total,
            raw_charged_total,
            raw_burned_total,
            payment_requests_total,
            verifications_total,
            uptime_seconds,
            server_info,
        }
    }

    /// Encode all metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("encoding should not fail");
        String::from_utf8(buffer).expect("metrics are valid utf8")
    }

    /// Record the result of one query.
    pub fn record_query(&self, result: &Result<QueryOutcome, QueryFailure>, elapsed: Duration) {
        self.query_latency_seconds.observe(elapsed.as_secs_f64());
        match result {
            Ok(outcome) => {
                self.queries_total.with_label_values(&["answered"]).inc();
                self.record_charge("completed", outcome.usage.raw_amount, outcome.usage.burned_raw);
            }
            Err(failure) => {
                self.queries_total
                    .with_label_values(&[failure.error.reason_code()])
                    .inc();
                if let Some(charge) = failure.error.charge() {
                    self.record_charge("generation_failed", charge.amount, charge.split.burned);
                }
                if matches!(
                    failure.error,
                    OpsError::Payment(PayError::PartialChargeFailure { .. })
                ) {
                    // The transfer landed; only the burn is outstanding.
                    self.charges_total.with_label_values(&["burn_pending"]).inc();
                }
            }
        }
    }

    /// Record a charge that moved funds.
    pub fn record_charge(&self, status: &str, raw_amount: u64, burned: u64) {
        self.charges_total.with_label_values(&[status]).inc();
        self.raw_charged_total.inc_by(raw_amount);
        self.raw_burned_total.inc_by(burned);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics handle for use across async tasks.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        metrics.uptime_seconds.set(3);
        assert!(metrics.encode().contains("veritas_uptime_seconds 3"));
    }

    #[test]
    fn test_record_charge() {
        let metrics = Metrics::new();
        metrics.record_charge("completed", 6_600, 66);
        metrics.record_charge("completed", 1_000, 10);

        let output = metrics.encode();
        assert!(output.contains("veritas_charges_total{status=\"completed\"} 2"));
        assert!(output.contains("veritas_raw_charged_total 7600"));
        assert!(output.contains("veritas_raw_burned_total 76"));
    }

    #[test]
    fn test_histogram_recording() {
        let metrics = Metrics::new();
        metrics.query_latency_seconds.observe(1.5);
        assert!(metrics
            .encode()
            .contains("veritas_query_latency_seconds_count 1"));
    }
}
