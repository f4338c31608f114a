//! Metrics collection and export

use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};

/// Relay metrics
pub struct RelayMetrics {
    connected_endpoints: Gauge,
    supervisor_connections: Gauge,
    frames_forwarded: Counter,
    statuses_broadcast: Counter,
    addressing_errors: Counter,
    malformed_frames: Counter,
    auth_failures: Counter,
    registry: Registry,
}

impl RelayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connected_endpoints = Gauge::with_opts(Opts::new(
            "rcs_relay_connected_endpoints",
            "Number of endpoints with an open inbound channel",
        ))?;
        registry.register(Box::new(connected_endpoints.clone()))?;

        let supervisor_connections = Gauge::with_opts(Opts::new(
            "rcs_relay_supervisor_connections",
            "Number of open supervisor control channels",
        ))?;
        registry.register(Box::new(supervisor_connections.clone()))?;

        let frames_forwarded = Counter::with_opts(Opts::new(
            "rcs_relay_frames_forwarded_total",
            "Frames forwarded from supervisors to endpoints",
        ))?;
        registry.register(Box::new(frames_forwarded.clone()))?;

        let statuses_broadcast = Counter::with_opts(Opts::new(
            "rcs_relay_statuses_broadcast_total",
            "Endpoint frames fanned out to supervisors",
        ))?;
        registry.register(Box::new(statuses_broadcast.clone()))?;

        let addressing_errors = Counter::with_opts(Opts::new(
            "rcs_relay_addressing_errors_total",
            "Frames rejected because the endpoint was absent or misaddressed",
        ))?;
        registry.register(Box::new(addressing_errors.clone()))?;

        let malformed_frames = Counter::with_opts(Opts::new(
            "rcs_relay_malformed_frames_total",
            "Frames rejected because no client id could be read",
        ))?;
        registry.register(Box::new(malformed_frames.clone()))?;

        let auth_failures = Counter::with_opts(Opts::new(
            "rcs_relay_auth_failures_total",
            "Connection attempts rejected for a missing or wrong token",
        ))?;
        registry.register(Box::new(auth_failures.clone()))?;

        Ok(Self {
            connected_endpoints,
            supervisor_connections,
            frames_forwarded,
            statuses_broadcast,
            addressing_errors,
            malformed_frames,
            auth_failures,
            registry,
        })
    }

    pub fn set_connected_endpoints(&self, count: usize) {
        self.connected_endpoints.set(count as f64);
    }

    pub fn supervisor_connected(&self) {
        self.supervisor_connections.inc();
    }

    pub fn supervisor_disconnected(&self) {
        self.supervisor_connections.dec();
    }

    pub fn record_forward(&self) {
        self.frames_forwarded.inc();
    }

    pub fn record_broadcast(&self) {
        self.statuses_broadcast.inc();
    }

    pub fn record_addressing_error(&self) {
        self.addressing_errors.inc();
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.inc();
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.inc();
    }

    pub fn frames_forwarded(&self) -> f64 {
        self.frames_forwarded.get()
    }

    pub fn addressing_errors(&self) -> f64 {
        self.addressing_errors.get()
    }

    /// Export Prometheus format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_counters() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.record_forward();
        metrics.record_addressing_error();
        metrics.set_connected_endpoints(3);
        let text = metrics.export().unwrap();
        assert!(text.contains("rcs_relay_frames_forwarded_total 1"));
        assert!(text.contains("rcs_relay_connected_endpoints 3"));
        assert_eq!(metrics.addressing_errors(), 1.0);
    }
}
