use crate::ResourceKind;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Prometheus counters for channel allocation, labelled by resource kind.
#[derive(Clone)]
pub struct AllocationMetrics {
    pub registry: Registry,
    grants: IntCounterVec,
    rejections: IntCounterVec,
    live: IntGaugeVec,
}

impl AllocationMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let grants = IntCounterVec::new(
            Opts::new("hal_channel_grants", "Channel allocations granted"),
            &["kind"],
        )?;
        let rejections = IntCounterVec::new(
            Opts::new(
                "hal_channel_rejections",
                "Channel allocations rejected because the index was taken",
            ),
            &["kind"],
        )?;
        let live = IntGaugeVec::new(
            Opts::new("hal_channels_allocated", "Channels currently allocated"),
            &["kind"],
        )?;
        registry.register(Box::new(grants.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(live.clone()))?;
        Ok(Self {
            registry,
            grants,
            rejections,
            live,
        })
    }

    pub(crate) fn record_grant(&self, kind: ResourceKind) {
        self.grants.with_label_values(&[kind.as_str()]).inc();
        self.live.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn record_rejection(&self, kind: ResourceKind) {
        self.rejections.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn record_free(&self, kind: ResourceKind) {
        self.live.with_label_values(&[kind.as_str()]).dec();
    }

    pub fn grants(&self, kind: ResourceKind) -> u64 {
        self.grants.with_label_values(&[kind.as_str()]).get()
    }

    pub fn rejections(&self, kind: ResourceKind) -> u64 {
        self.rejections.with_label_values(&[kind.as_str()]).get()
    }

    pub fn live(&self, kind: ResourceKind) -> i64 {
        self.live.with_label_values(&[kind.as_str()]).get()
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
