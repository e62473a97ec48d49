//! Analog input channels.
//!
//! Each channel reads a 12-bit code spanning -10 V to +10 V. Behind every
//! channel sits an oversample and average engine: oversampling sums `2^bits`
//! conversions (more resolution, larger magnitude) and averaging divides
//! `2^bits` of those sums back down (more stability, same range). The engine
//! output is not a sliding window; it changes only after
//! `2^(oversample_bits + average_bits)` fresh conversions.

use crate::accumulator::AccumulatorState;
use crate::hooks::LiveValueTable;
use crate::{Calibration, HalContext, Result, SensorError};
use channel_registry::{ChannelLayout, ChannelSlot, ResourceKind};
use hal_port::{Hardware, PortHandle, PortResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DASHBOARD_TYPE: &str = "Analog Input";
const SENSOR_KIND: &str = "Analog";

/// Something a control loop can sample as its process variable.
pub trait PidSource {
    fn pid_get(&self) -> Result<f64>;
}

/// Exclusive handle on one analog input.
pub struct AnalogChannel {
    hardware: Arc<dyn Hardware>,
    port: PortHandle,
    module: u8,
    channel: u32,
    pub(crate) accumulator_offset: i64,
    pub(crate) accumulator_state: AccumulatorState,
    table: Option<Arc<dyn LiveValueTable>>,
    _slot: ChannelSlot,
}

impl AnalogChannel {
    /// Allocate and bind `channel` on `module`.
    ///
    /// Fails if the module or channel is absent, if another owner holds the
    /// channel, or if the hardware refuses to bind the port. A bind failure
    /// releases the allocation again.
    pub fn open(ctx: &HalContext, module: u8, channel: u32) -> Result<Self> {
        let hw = ctx.hardware();
        if !hw.analog_module_exists(module) {
            warn!(module, channel, "analog module not present");
            return Err(SensorError::ModuleNotPresent {
                kind: ResourceKind::Analog,
                module,
                channel,
            });
        }
        if !hw.analog_channel_exists(channel) {
            warn!(module, channel, "analog channel not present");
            return Err(SensorError::ChannelNotPresent {
                kind: ResourceKind::Analog,
                module,
                channel,
            });
        }

        let registry = ctx.registry(ResourceKind::Analog);
        let index = layout_index(registry.layout(), ResourceKind::Analog, module, channel)?;
        let slot = registry
            .claim(index)
            .map_err(|_| SensorError::ChannelAlreadyAllocated {
                kind: ResourceKind::Analog,
                module,
                channel,
            })?;

        let port = hw.bind_analog(module, channel).map_err(|status| {
            warn!(module, channel, %status, "analog port bind failed; releasing slot");
            SensorError::HardwareInit {
                kind: ResourceKind::Analog,
                module,
                channel,
                status,
            }
        })?;

        ctx.sensors().add_sensor(SENSOR_KIND, module, channel);
        ctx.usage().report(ResourceKind::Analog, channel, module - 1);
        info!(module, channel, index, "analog channel opened");

        Ok(Self {
            hardware: ctx.hardware_arc(),
            port,
            module,
            channel,
            accumulator_offset: 0,
            accumulator_state: AccumulatorState::Uninitialized,
            table: None,
            _slot: slot,
        })
    }

    /// Open `channel` on the context's default analog module.
    pub fn open_default(ctx: &HalContext, channel: u32) -> Result<Self> {
        Self::open(ctx, ctx.default_analog_module(), channel)
    }

    pub fn module_number(&self) -> u8 {
        self.module
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Latest raw conversion in ADC codes.
    pub fn value(&self) -> Result<i16> {
        self.read("read_raw", |hw, port| hw.read_raw(port))
    }

    /// Latest output of the oversample/average engine. The magnitude grows by
    /// `2^oversample_bits`.
    pub fn average_value(&self) -> Result<i32> {
        self.read("read_average", |hw, port| hw.read_average(port))
    }

    /// Factory LSB weight, nanovolts per code.
    pub fn lsb_weight(&self) -> Result<u32> {
        self.read("read_lsb_weight", |hw, port| hw.read_lsb_weight(port))
    }

    /// Factory offset, nanovolts.
    pub fn offset(&self) -> Result<i32> {
        self.read("read_offset", |hw, port| hw.read_offset(port))
    }

    pub fn calibration(&self) -> Result<Calibration> {
        Ok(Calibration {
            lsb_weight: self.lsb_weight()?,
            offset: self.offset()?,
        })
    }

    /// Latest raw conversion scaled to volts.
    pub fn voltage(&self) -> Result<f64> {
        let raw = self.value()?;
        let cal = self.calibration()?;
        Ok(cal.to_volts(f64::from(raw)))
    }

    /// Engine output scaled to volts. The oversample gain is divided out
    /// first, so the result stays in volts at any oversample depth.
    pub fn average_voltage(&self) -> Result<f64> {
        let avg = self.average_value()?;
        let oversample = self.oversample_bits()?;
        let cal = self.calibration()?;
        let raw = f64::from(avg) / f64::from(1u32 << oversample.min(31));
        Ok(cal.to_volts(raw))
    }

    /// Average `2^bits` oversampled values per engine output.
    pub fn set_average_bits(&self, bits: u32) -> Result<()> {
        debug!(module = self.module, channel = self.channel, bits, "set average bits");
        self.write("write_average_bits", |hw, port| {
            hw.write_average_bits(port, bits)
        })
    }

    pub fn average_bits(&self) -> Result<u32> {
        self.read("read_average_bits", |hw, port| hw.read_average_bits(port))
    }

    /// Sum `2^bits` conversions per oversampled value.
    pub fn set_oversample_bits(&self, bits: u32) -> Result<()> {
        debug!(module = self.module, channel = self.channel, bits, "set oversample bits");
        self.write("write_oversample_bits", |hw, port| {
            hw.write_oversample_bits(port, bits)
        })
    }

    pub fn oversample_bits(&self) -> Result<u32> {
        self.read("read_oversample_bits", |hw, port| {
            hw.read_oversample_bits(port)
        })
    }

    /// Set the scan rate of this channel's module.
    ///
    /// The module scans a fixed-size list, so the rate applies to every
    /// channel on the module, not just this one.
    pub fn set_sample_rate(&self, samples_per_second: f64) -> Result<()> {
        let module = self.module;
        debug!(module, samples_per_second, "set module sample rate");
        self.write("write_sample_rate", |hw, _| {
            hw.write_sample_rate(module, samples_per_second)
        })
    }

    pub fn sample_rate(&self) -> Result<f64> {
        let module = self.module;
        self.read("read_sample_rate", |hw, _| hw.read_sample_rate(module))
    }

    pub fn dashboard_type(&self) -> &'static str {
        DASHBOARD_TYPE
    }

    /// Bind a live-value table and push the current reading into it.
    pub fn init_table(&mut self, table: Arc<dyn LiveValueTable>) -> Result<()> {
        self.table = Some(table);
        self.update_table()
    }

    /// Push `Value = average_voltage()` into the bound table, if any.
    pub fn update_table(&self) -> Result<()> {
        if let Some(table) = &self.table {
            table.put_number("Value", self.average_voltage()?);
        }
        Ok(())
    }

    pub(crate) fn read<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&dyn Hardware, PortHandle) -> PortResult<T>,
    ) -> Result<T> {
        f(&*self.hardware, self.port).map_err(|status| {
            warn!(module = self.module, channel = self.channel, op, %status, "hardware read failed");
            SensorError::HardwareRead { op, status }
        })
    }

    pub(crate) fn write(
        &self,
        op: &'static str,
        f: impl FnOnce(&dyn Hardware, PortHandle) -> PortResult<()>,
    ) -> Result<()> {
        f(&*self.hardware, self.port).map_err(|status| {
            warn!(module = self.module, channel = self.channel, op, %status, "hardware write failed");
            SensorError::HardwareWrite { op, status }
        })
    }
}

impl PidSource for AnalogChannel {
    fn pid_get(&self) -> Result<f64> {
        Ok(f64::from(self.average_value()?))
    }
}

impl Drop for AnalogChannel {
    fn drop(&mut self) {
        info!(module = self.module, channel = self.channel, "analog channel released");
    }
}

impl core::fmt::Debug for AnalogChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnalogChannel")
            .field("module", &self.module)
            .field("channel", &self.channel)
            .field("accumulator_offset", &self.accumulator_offset)
            .field("accumulator_state", &self.accumulator_state)
            .finish()
    }
}

/// Flatten `(module, channel)` for `kind`, mapping pairs the layout does not
/// cover onto the matching "not present" error.
pub(crate) fn layout_index(
    layout: ChannelLayout,
    kind: ResourceKind,
    module: u8,
    channel: u32,
) -> Result<usize> {
    if module == 0 || module > layout.modules {
        return Err(SensorError::ModuleNotPresent {
            kind,
            module,
            channel,
        });
    }
    layout
        .index(module, channel)
        .ok_or(SensorError::ChannelNotPresent {
            kind,
            module,
            channel,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryTable, RecordingHooks};
    use hal_port::{MockHardware, MockOp, StatusCode};

    fn setup() -> (Arc<MockHardware>, HalContext) {
        let hw = Arc::new(MockHardware::new());
        let ctx = HalContext::new(hw.clone());
        (hw, ctx)
    }

    #[test]
    fn open_binds_port_and_claims_slot() {
        let (hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 2, 5).unwrap();
        assert_eq!(ch.module_number(), 2);
        assert_eq!(ch.channel(), 5);
        assert!(hw.is_analog_bound(2, 5));
        assert!(ctx.registry(ResourceKind::Analog).is_allocated(13));
    }

    #[test]
    fn open_twice_reports_already_allocated() {
        let (_hw, ctx) = setup();
        let _first = AnalogChannel::open(&ctx, 1, 3).unwrap();
        let err = AnalogChannel::open(&ctx, 1, 3).unwrap_err();
        assert_eq!(
            err,
            SensorError::ChannelAlreadyAllocated {
                kind: ResourceKind::Analog,
                module: 1,
                channel: 3
            }
        );
        assert!(err.to_string().contains("already allocated"));
    }

    #[test]
    fn drop_releases_channel() {
        let (_hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 3).unwrap();
        drop(ch);
        assert!(!ctx.registry(ResourceKind::Analog).is_allocated(3));
        AnalogChannel::open(&ctx, 1, 3).unwrap();
    }

    #[test]
    fn missing_module_is_reported_first() {
        let (hw, ctx) = setup();
        hw.set_analog_module_present(2, false);
        let err = AnalogChannel::open(&ctx, 2, 99).unwrap_err();
        assert!(matches!(err, SensorError::ModuleNotPresent { module: 2, .. }));
        assert_eq!(hw.access_count(), 0);
    }

    #[test]
    fn missing_channel_is_reported() {
        let (_hw, ctx) = setup();
        let err = AnalogChannel::open(&ctx, 1, 8).unwrap_err();
        assert!(matches!(err, SensorError::ChannelNotPresent { channel: 8, .. }));
    }

    #[test]
    fn module_outside_layout_is_not_present() {
        let hw = Arc::new(MockHardware::new());
        let ctx = HalContext::builder(hw.clone())
            .analog_layout(ChannelLayout::new(1, 8))
            .build();
        let err = AnalogChannel::open(&ctx, 2, 0).unwrap_err();
        assert!(matches!(err, SensorError::ModuleNotPresent { module: 2, .. }));
    }

    #[test]
    fn bind_failure_rolls_back_allocation() {
        let (hw, ctx) = setup();
        hw.fail_next(MockOp::BindAnalog, StatusCode::NO_AVAILABLE_RESOURCES);
        let err = AnalogChannel::open(&ctx, 1, 6).unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NO_AVAILABLE_RESOURCES));
        assert!(matches!(err, SensorError::HardwareInit { .. }));
        assert!(!ctx.registry(ResourceKind::Analog).is_allocated(6));
        AnalogChannel::open(&ctx, 1, 6).unwrap();
    }

    #[test]
    fn open_notifies_hooks() {
        let hw = Arc::new(MockHardware::new());
        let hooks = Arc::new(RecordingHooks::default());
        let ctx = HalContext::builder(hw)
            .sensor_registry(hooks.clone())
            .usage_reporter(hooks.clone())
            .build();
        let _ch = AnalogChannel::open(&ctx, 2, 1).unwrap();
        let sensors = hooks.sensors();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].kind, "Analog");
        assert_eq!(sensors[0].module, 2);
        let usage = hooks.usage();
        assert_eq!(usage[0].module_index, 1);
        assert_eq!(usage[0].channel, 1);
    }

    #[test]
    fn open_default_uses_configured_module() {
        let hw = Arc::new(MockHardware::new());
        let ctx = HalContext::builder(hw).default_analog_module(2).build();
        let ch = AnalogChannel::open_default(&ctx, 4).unwrap();
        assert_eq!(ch.module_number(), 2);
    }

    #[test]
    fn voltage_applies_calibration() {
        let (hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 2).unwrap();
        hw.set_calibration(1, 2, 1_000_000_000, 0);
        hw.set_raw(1, 2, 100);
        assert_eq!(ch.value().unwrap(), 100);
        assert_eq!(ch.voltage().unwrap(), 100.0);

        hw.set_calibration(1, 2, 1_000_000_000, 250_000_000);
        assert_eq!(ch.voltage().unwrap(), 99.75);
    }

    #[test]
    fn average_value_freezes_between_windows() {
        let (hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 4).unwrap();
        ch.set_oversample_bits(2).unwrap();
        ch.set_average_bits(1).unwrap();
        assert_eq!(ch.oversample_bits().unwrap(), 2);
        assert_eq!(ch.average_bits().unwrap(), 1);

        hw.push_samples(1, 4, [100; 8]);
        assert_eq!(ch.average_value().unwrap(), 400);
        hw.push_samples(1, 4, [200; 7]);
        assert_eq!(ch.average_value().unwrap(), 400);
        hw.push_sample(1, 4, 200);
        assert_eq!(ch.average_value().unwrap(), 800);
    }

    #[test]
    fn average_voltage_removes_oversample_gain() {
        let (hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 5).unwrap();
        hw.set_calibration(1, 5, 1_000_000_000, 0);
        ch.set_oversample_bits(3).unwrap();
        hw.push_samples(1, 5, [7; 8]);
        assert_eq!(ch.average_value().unwrap(), 56);
        assert_eq!(ch.average_voltage().unwrap(), 7.0);
        assert_eq!(ch.pid_get().unwrap(), 56.0);
    }

    #[test]
    fn read_failure_surfaces_status_and_channel_stays_usable() {
        let (hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 7).unwrap();
        hw.fail_next(MockOp::ReadLsbWeight, StatusCode::LOOP_TIMING_ERROR);
        assert_eq!(
            ch.voltage().unwrap_err(),
            SensorError::HardwareRead {
                op: "read_lsb_weight",
                status: StatusCode::LOOP_TIMING_ERROR
            }
        );
        assert!(ch.voltage().is_ok());
    }

    #[test]
    fn engine_depth_rejection_is_a_write_error() {
        let (_hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 7).unwrap();
        let err = ch.set_average_bits(40).unwrap_err();
        assert!(matches!(err, SensorError::HardwareWrite { op: "write_average_bits", .. }));
    }

    #[test]
    fn sample_rate_is_shared_by_module() {
        let (_hw, ctx) = setup();
        let a = AnalogChannel::open(&ctx, 1, 2).unwrap();
        let b = AnalogChannel::open(&ctx, 1, 3).unwrap();
        let other = AnalogChannel::open(&ctx, 2, 3).unwrap();
        a.set_sample_rate(20_000.0).unwrap();
        assert_eq!(b.sample_rate().unwrap(), 20_000.0);
        assert_ne!(other.sample_rate().unwrap(), 20_000.0);
        assert!(matches!(
            a.set_sample_rate(1.0e7),
            Err(SensorError::HardwareWrite { status: StatusCode::SAMPLE_RATE_TOO_HIGH, .. })
        ));
    }

    #[test]
    fn table_receives_average_voltage() {
        let (hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 6).unwrap();
        hw.set_calibration(1, 6, 1_000_000_000, 0);
        let table = Arc::new(InMemoryTable::default());
        ch.init_table(table.clone()).unwrap();
        assert_eq!(table.get("Value"), Some(0.0));
        hw.push_sample(1, 6, 3);
        ch.update_table().unwrap();
        assert_eq!(table.get("Value"), Some(3.0));
        assert_eq!(ch.dashboard_type(), "Analog Input");
    }
}
