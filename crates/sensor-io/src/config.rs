//! YAML chassis description: module layouts plus per-channel engine and
//! accumulator settings.
//!
//! ```yaml
//! analog: { modules: 2, channels_per_module: 8 }
//! default_analog_module: 1
//! sample_rate: 50000
//! channels:
//!   - { module: 1, channel: 0, average_bits: 4, accumulator: { center: 2048, deadband: 2 } }
//!   - { module: 1, channel: 3, oversample_bits: 2 }
//! ```

use crate::{AnalogChannel, HalContext, Result, SensorError};
use anyhow::Context;
use channel_registry::{AllocationMetrics, ChannelLayout};
use hal_port::Hardware;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChassisConfig {
    #[serde(default = "ChannelLayout::analog_default")]
    pub analog: ChannelLayout,
    #[serde(default = "ChannelLayout::digital_default")]
    pub digital: ChannelLayout,
    #[serde(default = "default_analog_module")]
    pub default_analog_module: u8,
    #[serde(default)]
    pub sample_rate: Option<f64>,
    #[serde(default)]
    pub channels: Vec<AnalogChannelConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogChannelConfig {
    pub module: u8,
    pub channel: u32,
    #[serde(default)]
    pub average_bits: Option<u32>,
    #[serde(default)]
    pub oversample_bits: Option<u32>,
    #[serde(default)]
    pub accumulator: Option<AccumulatorConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorConfig {
    #[serde(default)]
    pub center: Option<i32>,
    #[serde(default)]
    pub deadband: Option<i32>,
    #[serde(default)]
    pub initial_value: Option<i64>,
}

/// Largest per-module channel count a chassis file may declare.
pub const MAX_CHANNELS_PER_MODULE: u32 = 64;

fn default_analog_module() -> u8 {
    1
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            analog: ChannelLayout::analog_default(),
            digital: ChannelLayout::digital_default(),
            default_analog_module: default_analog_module(),
            sample_rate: None,
            channels: Vec::new(),
        }
    }
}

impl ChassisConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, layout) in [("analog", self.analog), ("digital", self.digital)] {
            if layout.capacity() == 0 {
                return Err(SensorError::Config(format!("{name} layout has no channels")));
            }
            if layout.channels_per_module > MAX_CHANNELS_PER_MODULE {
                return Err(SensorError::Config(format!(
                    "{name} layout declares {} channels per module, limit is {MAX_CHANNELS_PER_MODULE}",
                    layout.channels_per_module
                )));
            }
        }
        if self.default_analog_module == 0 || self.default_analog_module > self.analog.modules {
            return Err(SensorError::Config(format!(
                "default analog module {} outside 1..={}",
                self.default_analog_module, self.analog.modules
            )));
        }
        if let Some(rate) = self.sample_rate {
            if rate <= 0.0 || !rate.is_finite() {
                return Err(SensorError::Config(format!("invalid sample rate {rate}")));
            }
        }
        let mut seen = HashSet::new();
        for c in &self.channels {
            if !self.analog.contains(c.module, c.channel) {
                return Err(SensorError::Config(format!(
                    "analog channel {} on module {} is outside the layout",
                    c.channel, c.module
                )));
            }
            if !seen.insert((c.module, c.channel)) {
                return Err(SensorError::Config(format!(
                    "analog channel {} on module {} is listed twice",
                    c.channel, c.module
                )));
            }
            if c.accumulator.is_some() && !crate::is_accumulator_channel(c.module, c.channel) {
                return Err(SensorError::UnsupportedChannel {
                    module: c.module,
                    channel: c.channel,
                });
            }
        }
        Ok(())
    }

    /// Context with this chassis' layouts and default module.
    pub fn context(&self, hardware: Arc<dyn Hardware>) -> HalContext {
        self.context_builder(hardware).build()
    }

    /// Same as [`ChassisConfig::context`] with allocation metrics attached.
    pub fn context_with_metrics(
        &self,
        hardware: Arc<dyn Hardware>,
        metrics: AllocationMetrics,
    ) -> HalContext {
        self.context_builder(hardware).metrics(metrics).build()
    }

    fn context_builder(&self, hardware: Arc<dyn Hardware>) -> crate::HalContextBuilder {
        HalContext::builder(hardware)
            .analog_layout(self.analog)
            .digital_layout(self.digital)
            .default_analog_module(self.default_analog_module)
    }

    /// Open every configured channel and apply its settings. The sample rate
    /// is written once per module that has a configured channel.
    pub fn open_channels(&self, ctx: &HalContext) -> Result<Vec<AnalogChannel>> {
        let mut opened = Vec::with_capacity(self.channels.len());
        for c in &self.channels {
            let mut ch = AnalogChannel::open(ctx, c.module, c.channel)?;
            if let Some(bits) = c.oversample_bits {
                ch.set_oversample_bits(bits)?;
            }
            if let Some(bits) = c.average_bits {
                ch.set_average_bits(bits)?;
            }
            if let Some(acc) = &c.accumulator {
                ch.init_accumulator()?;
                if let Some(center) = acc.center {
                    ch.set_accumulator_center(center)?;
                }
                if let Some(deadband) = acc.deadband {
                    ch.set_accumulator_deadband(deadband)?;
                }
                if let Some(initial) = acc.initial_value {
                    ch.set_accumulator_initial_value(initial)?;
                }
            }
            debug!(module = c.module, channel = c.channel, "configured analog channel");
            opened.push(ch);
        }

        if let Some(rate) = self.sample_rate {
            let mut per_module: BTreeMap<u8, &AnalogChannel> = BTreeMap::new();
            for ch in &opened {
                per_module.entry(ch.module_number()).or_insert(ch);
            }
            for ch in per_module.values() {
                ch.set_sample_rate(rate)?;
            }
        }
        Ok(opened)
    }
}

pub fn parse_chassis(raw: &str) -> anyhow::Result<ChassisConfig> {
    let cfg: ChassisConfig = serde_yaml::from_str(raw).context("parsing chassis yaml")?;
    cfg.validate().context("validating chassis")?;
    Ok(cfg)
}

pub fn load_chassis_file(path: impl AsRef<Path>) -> anyhow::Result<ChassisConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading chassis config: {}", path.display()))?;
    parse_chassis(&raw).with_context(|| format!("loading chassis config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccumulatorState;
    use hal_port::MockHardware;
    use std::io::Write;

    const SAMPLE: &str = r#"
analog: { modules: 2, channels_per_module: 8 }
default_analog_module: 2
sample_rate: 1000
channels:
  - { module: 1, channel: 0, average_bits: 3, accumulator: { center: 5, deadband: 1, initial_value: 40 } }
  - { module: 1, channel: 3, oversample_bits: 2 }
  - { module: 2, channel: 7 }
"#;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse_chassis("{}").unwrap();
        assert_eq!(cfg, ChassisConfig::default());
        assert_eq!(cfg.digital, ChannelLayout::new(2, 14));
    }

    #[test]
    fn parses_sample() {
        let cfg = parse_chassis(SAMPLE).unwrap();
        assert_eq!(cfg.default_analog_module, 2);
        assert_eq!(cfg.channels.len(), 3);
        let acc = cfg.channels[0].accumulator.clone().unwrap();
        assert_eq!(acc.initial_value, Some(40));
    }

    #[test]
    fn rejects_duplicate_channel() {
        let err = parse_chassis(
            "channels:\n  - { module: 1, channel: 2 }\n  - { module: 1, channel: 2 }\n",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("listed twice"));
    }

    #[test]
    fn rejects_channel_outside_layout() {
        let err = parse_chassis("channels:\n  - { module: 3, channel: 0 }\n").unwrap_err();
        assert!(format!("{err:#}").contains("outside the layout"));
    }

    #[test]
    fn rejects_accumulator_on_plain_channel() {
        let err = parse_chassis("channels:\n  - { module: 1, channel: 4, accumulator: {} }\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("not an accumulator channel"));
    }

    #[test]
    fn rejects_oversized_layout() {
        let err = parse_chassis("digital: { modules: 2, channels_per_module: 4000000000 }\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("limit is 64"));
        parse_chassis("analog: { modules: 2, channels_per_module: 64 }\n").unwrap();
    }

    #[test]
    fn rejects_default_module_outside_layout() {
        let err = parse_chassis("default_analog_module: 3\n").unwrap_err();
        assert!(format!("{err:#}").contains("default analog module"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = load_chassis_file(file.path()).unwrap();
        assert_eq!(cfg.sample_rate, Some(1000.0));
    }

    #[test]
    fn missing_file_names_path() {
        let err = load_chassis_file("/nonexistent/chassis.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/chassis.yaml"));
    }

    #[test]
    fn open_channels_applies_settings() {
        let cfg = parse_chassis(SAMPLE).unwrap();
        let hw = Arc::new(MockHardware::new());
        let ctx = cfg.context(hw);
        let channels = cfg.open_channels(&ctx).unwrap();
        assert_eq!(channels.len(), 3);

        let gyro = &channels[0];
        assert_eq!(gyro.average_bits().unwrap(), 3);
        assert_eq!(gyro.accumulator_state(), AccumulatorState::Accumulating);
        assert_eq!(gyro.accumulator_value().unwrap(), 40);
        assert_eq!(channels[1].oversample_bits().unwrap(), 2);

        assert_eq!(channels[0].sample_rate().unwrap(), 1000.0);
        assert_eq!(channels[2].sample_rate().unwrap(), 1000.0);
        assert_eq!(ctx.default_analog_module(), 2);
    }

    #[test]
    fn open_channels_fails_on_conflict() {
        let cfg = parse_chassis(SAMPLE).unwrap();
        let hw = Arc::new(MockHardware::new());
        let ctx = cfg.context(hw);
        let _held = AnalogChannel::open(&ctx, 2, 7).unwrap();
        assert!(matches!(
            cfg.open_channels(&ctx),
            Err(SensorError::ChannelAlreadyAllocated { module: 2, channel: 7, .. })
        ));
        // Channels opened before the conflict were dropped with the error.
        assert!(!ctx
            .registry(channel_registry::ResourceKind::Analog)
            .is_allocated(0));
    }
}
