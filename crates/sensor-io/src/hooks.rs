//! One-way notifications a channel sends to the outside world.

use channel_registry::ResourceKind;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Registry of live sensors, fed once per successfully opened channel.
pub trait SensorRegistry: Send + Sync {
    fn add_sensor(&self, kind: &'static str, module: u8, channel: u32);
}

/// Resource usage reporting. `module_index` is zero-based.
pub trait UsageReporter: Send + Sync {
    fn report(&self, resource: ResourceKind, channel: u32, module_index: u8);
}

/// Key/value table a sensor pushes its current reading into.
pub trait LiveValueTable: Send + Sync {
    fn put_number(&self, key: &str, value: f64);
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl SensorRegistry for NoopHooks {
    fn add_sensor(&self, _kind: &'static str, _module: u8, _channel: u32) {}
}

impl UsageReporter for NoopHooks {
    fn report(&self, _resource: ResourceKind, _channel: u32, _module_index: u8) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorEntry {
    pub kind: &'static str,
    pub module: u8,
    pub channel: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageEntry {
    pub resource: ResourceKind,
    pub channel: u32,
    pub module_index: u8,
}

/// Keeps every notification in memory, in arrival order.
#[derive(Default)]
pub struct RecordingHooks {
    sensors: Mutex<Vec<SensorEntry>>,
    usage: Mutex<Vec<UsageEntry>>,
}

impl RecordingHooks {
    pub fn sensors(&self) -> Vec<SensorEntry> {
        self.sensors.lock().clone()
    }

    pub fn usage(&self) -> Vec<UsageEntry> {
        self.usage.lock().clone()
    }
}

impl SensorRegistry for RecordingHooks {
    fn add_sensor(&self, kind: &'static str, module: u8, channel: u32) {
        self.sensors.lock().push(SensorEntry {
            kind,
            module,
            channel,
        });
    }
}

impl UsageReporter for RecordingHooks {
    fn report(&self, resource: ResourceKind, channel: u32, module_index: u8) {
        self.usage.lock().push(UsageEntry {
            resource,
            channel,
            module_index,
        });
    }
}

#[derive(Default)]
pub struct InMemoryTable {
    values: Mutex<HashMap<String, f64>>,
}

impl InMemoryTable {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.lock().get(key).copied()
    }
}

impl LiveValueTable for InMemoryTable {
    fn put_number(&self, key: &str, value: f64) {
        self.values.lock().insert(key.to_string(), value);
    }
}
