// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// METRICS
//
// Prometheus-compatible counters for the gateway and broadcast pool.
// Kept as an ambient concern even though the spec's Non-goals exclude a
// fee market — observability isn't a feature, it's infrastructure.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use pactum_net::{ActionMetricsSink, BroadcastMetricsSink};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

pub struct NodeMetrics {
    registry: Registry,
    pub actions_validated_total: IntCounter,
    pub actions_rejected_total: IntCounter,
    pub blocks_committed_total: IntCounter,
    pub gateway_connections: IntGauge,
    pub broadcast_listeners: IntGauge,
    pub listeners_dropped_total: IntCounter,
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let actions_validated_total =
            IntCounter::with_opts(Opts::new("pactum_actions_validated_total", "accepted actions")).unwrap();
        let actions_rejected_total =
            IntCounter::with_opts(Opts::new("pactum_actions_rejected_total", "rejected actions")).unwrap();
        let blocks_committed_total =
            IntCounter::with_opts(Opts::new("pactum_blocks_committed_total", "committed blocks")).unwrap();
        let gateway_connections =
            IntGauge::with_opts(Opts::new("pactum_gateway_connections", "live gateway connections")).unwrap();
        let broadcast_listeners =
            IntGauge::with_opts(Opts::new("pactum_broadcast_listeners", "live broadcast pool listeners")).unwrap();
        let listeners_dropped_total = IntCounter::with_opts(Opts::new(
            "pactum_listeners_dropped_total",
            "listeners dropped for backlog overflow",
        ))
        .unwrap();

        registry.register(Box::new(actions_validated_total.clone())).unwrap();
        registry.register(Box::new(actions_rejected_total.clone())).unwrap();
        registry.register(Box::new(blocks_committed_total.clone())).unwrap();
        registry.register(Box::new(gateway_connections.clone())).unwrap();
        registry.register(Box::new(broadcast_listeners.clone())).unwrap();
        registry.register(Box::new(listeners_dropped_total.clone())).unwrap();

        NodeMetrics {
            registry,
            actions_validated_total,
            actions_rejected_total,
            blocks_committed_total,
            gateway_connections,
            broadcast_listeners,
            listeners_dropped_total,
        }
    }

    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer).expect("prometheus encoding never fails for counters/gauges");
        String::from_utf8(buffer).expect("prometheus text output is always utf-8")
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionMetricsSink for NodeMetrics {
    fn record(&self, accepted: bool) {
        if accepted {
            self.actions_validated_total.inc();
        } else {
            self.actions_rejected_total.inc();
        }
    }
}

impl BroadcastMetricsSink for NodeMetrics {
    fn listener_dropped(&self) {
        self.listeners_dropped_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_output_contains_every_metric_name() {
        let metrics = NodeMetrics::new();
        metrics.actions_validated_total.inc();
        metrics.blocks_committed_total.inc_by(3);
        metrics.gateway_connections.set(2);

        let text = metrics.encode();
        assert!(text.contains("pactum_actions_validated_total"));
        assert!(text.contains("pactum_blocks_committed_total"));
        assert!(text.contains("pactum_gateway_connections"));
    }
}
