use crate::hooks::{NoopHooks, SensorRegistry, UsageReporter};
use channel_registry::{AllocationMetrics, ChannelLayout, ChannelRegistry, ResourceKind};
use hal_port::Hardware;
use std::sync::Arc;

/// Shared state every channel object is created against.
///
/// Holds one registry per resource kind, the hardware capability and the
/// outbound hooks. Cloning is cheap; clones share the same registries.
#[derive(Clone)]
pub struct HalContext {
    hardware: Arc<dyn Hardware>,
    analog: Arc<ChannelRegistry>,
    digital: Arc<ChannelRegistry>,
    default_analog_module: u8,
    sensors: Arc<dyn SensorRegistry>,
    usage: Arc<dyn UsageReporter>,
}

impl HalContext {
    /// Context with the default layouts and no-op hooks.
    pub fn new(hardware: Arc<dyn Hardware>) -> Self {
        Self::builder(hardware).build()
    }

    pub fn builder(hardware: Arc<dyn Hardware>) -> HalContextBuilder {
        HalContextBuilder {
            hardware,
            analog: ChannelLayout::analog_default(),
            digital: ChannelLayout::digital_default(),
            default_analog_module: 1,
            sensors: Arc::new(NoopHooks),
            usage: Arc::new(NoopHooks),
            metrics: None,
        }
    }

    pub fn hardware(&self) -> &dyn Hardware {
        &*self.hardware
    }

    pub(crate) fn hardware_arc(&self) -> Arc<dyn Hardware> {
        Arc::clone(&self.hardware)
    }

    pub fn registry(&self, kind: ResourceKind) -> &Arc<ChannelRegistry> {
        match kind {
            ResourceKind::Analog => &self.analog,
            ResourceKind::Digital => &self.digital,
        }
    }

    pub fn default_analog_module(&self) -> u8 {
        self.default_analog_module
    }

    pub(crate) fn sensors(&self) -> &dyn SensorRegistry {
        &*self.sensors
    }

    pub(crate) fn usage(&self) -> &dyn UsageReporter {
        &*self.usage
    }
}

pub struct HalContextBuilder {
    hardware: Arc<dyn Hardware>,
    analog: ChannelLayout,
    digital: ChannelLayout,
    default_analog_module: u8,
    sensors: Arc<dyn SensorRegistry>,
    usage: Arc<dyn UsageReporter>,
    metrics: Option<AllocationMetrics>,
}

impl HalContextBuilder {
    pub fn analog_layout(mut self, layout: ChannelLayout) -> Self {
        self.analog = layout;
        self
    }

    pub fn digital_layout(mut self, layout: ChannelLayout) -> Self {
        self.digital = layout;
        self
    }

    pub fn default_analog_module(mut self, module: u8) -> Self {
        self.default_analog_module = module;
        self
    }

    pub fn sensor_registry(mut self, sensors: Arc<dyn SensorRegistry>) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn usage_reporter(mut self, usage: Arc<dyn UsageReporter>) -> Self {
        self.usage = usage;
        self
    }

    pub fn metrics(mut self, metrics: AllocationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> HalContext {
        let mut analog = ChannelRegistry::new(ResourceKind::Analog, self.analog);
        let mut digital = ChannelRegistry::new(ResourceKind::Digital, self.digital);
        if let Some(m) = self.metrics {
            analog = analog.with_metrics(m.clone());
            digital = digital.with_metrics(m);
        }
        HalContext {
            hardware: self.hardware,
            analog: Arc::new(analog),
            digital: Arc::new(digital),
            default_analog_module: self.default_analog_module,
            sensors: self.sensors,
            usage: self.usage,
        }
    }
}
