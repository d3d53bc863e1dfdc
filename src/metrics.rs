//! Prometheus counters for bind and verify outcomes.

use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Gateway-owned metrics registry.
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    binds: IntCounterVec,
    verifications: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let binds = IntCounterVec::new(
            Opts::new("hijackguard_binds_total", "Session bind attempts by outcome"),
            &["outcome"],
        )?;
        let verifications = IntCounterVec::new(
            Opts::new(
                "hijackguard_verifications_total",
                "Session verifications by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(binds.clone()))?;
        registry.register(Box::new(verifications.clone()))?;

        Ok(Self {
            registry,
            binds,
            verifications,
        })
    }

    pub fn record_bind(&self, outcome: &str) {
        self.binds.with_label_values(&[outcome]).inc();
    }

    pub fn record_verification(&self, outcome: &str) {
        self.verifications.with_label_values(&[outcome]).inc();
    }

    pub fn bind_count(&self, outcome: &str) -> u64 {
        self.binds.with_label_values(&[outcome]).get()
    }

    pub fn verification_count(&self, outcome: &str) -> u64 {
        self.verifications.with_label_values(&[outcome]).get()
    }

    /// Text exposition format for `/metrics`.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
