use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Counters of one engine instance, registered in their own registry so
/// several engines can live in one process.
pub struct CdpMetrics {
    registry: Registry,

    pub request_timeouts: IntCounter,
    pub replies_received: IntCounter,
    /// Sum of answer latencies in milliseconds
    pub replies_response_time_ms: IntCounter,
    pub response_time_seconds: Histogram,

    pub queue_length: IntGauge,
    pub queue_put_slow: IntCounter,

    pub peers_open: IntGauge,
    pub malformed_messages: IntCounter,
    pub messages_received: IntCounter,
    pub messages_sent: IntCounter,
}

impl CdpMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("cdp".to_string()), None)?;

        let metrics = Self {
            request_timeouts: IntCounter::with_opts(Opts::new(
                "request_timeouts_total",
                "Requests whose transaction expired without an answer",
            ))?,
            replies_received: IntCounter::with_opts(Opts::new(
                "replies_received_total",
                "Answers matched to a pending transaction",
            ))?,
            replies_response_time_ms: IntCounter::with_opts(Opts::new(
                "replies_response_time_ms_total",
                "Cumulative response time of matched answers in milliseconds",
            ))?,
            response_time_seconds: Histogram::with_opts(
                HistogramOpts::new("response_time_seconds", "Answer latency in seconds")
                    .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            )?,
            queue_length: IntGauge::with_opts(Opts::new(
                "queue_length",
                "Tasks waiting for a worker",
            ))?,
            queue_put_slow: IntCounter::with_opts(Opts::new(
                "queue_put_slow_total",
                "Task queue puts that exceeded the latency threshold",
            ))?,
            peers_open: IntGauge::with_opts(Opts::new("peers_open", "Peers in an open state"))?,
            malformed_messages: IntCounter::with_opts(Opts::new(
                "malformed_messages_total",
                "Received messages dropped because they failed to decode",
            ))?,
            messages_received: IntCounter::with_opts(Opts::new(
                "messages_received_total",
                "Messages received from peers",
            ))?,
            messages_sent: IntCounter::with_opts(Opts::new(
                "messages_sent_total",
                "Messages handed to peer connections",
            ))?,
            registry,
        };

        metrics.registry.register(Box::new(metrics.request_timeouts.clone()))?;
        metrics.registry.register(Box::new(metrics.replies_received.clone()))?;
        metrics.registry.register(Box::new(metrics.replies_response_time_ms.clone()))?;
        metrics.registry.register(Box::new(metrics.response_time_seconds.clone()))?;
        metrics.registry.register(Box::new(metrics.queue_length.clone()))?;
        metrics.registry.register(Box::new(metrics.queue_put_slow.clone()))?;
        metrics.registry.register(Box::new(metrics.peers_open.clone()))?;
        metrics.registry.register(Box::new(metrics.malformed_messages.clone()))?;
        metrics.registry.register(Box::new(metrics.messages_received.clone()))?;
        metrics.registry.register(Box::new(metrics.messages_sent.clone()))?;

        Ok(metrics)
    }

    /// Record one matched answer
    pub fn observe_reply(&self, elapsed_ms: u64) {
        self.replies_received.inc();
        self.replies_response_time_ms.inc_by(elapsed_ms);
        self.response_time_seconds.observe(elapsed_ms as f64 / 1000.0);
    }

    /// Cumulative response time divided by replies; zero with no replies
    pub fn average_response_time(&self) -> u64 {
        average_response_time(
            self.replies_response_time_ms.get(),
            self.replies_received.get(),
        )
    }

    /// Gather metrics in Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Average response time in milliseconds
pub fn average_response_time(cumulative_ms: u64, replies: u64) -> u64 {
    if replies == 0 {
        0
    } else {
        cumulative_ms / replies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_response_time() {
        assert_eq!(average_response_time(0, 0), 0);
        assert_eq!(average_response_time(500, 0), 0);
        assert_eq!(average_response_time(300, 3), 100);
    }

    #[test]
    fn test_metrics_per_instance() {
        let a = CdpMetrics::new().unwrap();
        let b = CdpMetrics::new().unwrap();

        a.observe_reply(40);
        a.observe_reply(20);
        a.request_timeouts.inc();
        a.queue_length.set(3);

        assert_eq!(a.average_response_time(), 30);
        assert_eq!(b.average_response_time(), 0);
        assert_eq!(b.replies_received.get(), 0);

        let text = a.gather();
        assert!(text.contains("cdp_request_timeouts_total 1"));
        assert!(text.contains("cdp_queue_length 3"));
        assert!(text.contains("cdp_response_time_seconds"));
    }
}
