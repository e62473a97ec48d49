//! Hardware accumulator attached behind the oversample/average engine.
//!
//! The hardware keeps a running sum and sample count. Software layers one
//! offset on top: every value read back is `hardware_sum + offset`. Resetting
//! the hardware clears the sum and count but keeps the offset.

use crate::{AnalogChannel, Result, SensorError};
use hal_port::AccumulatorSnapshot;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Only module 1 carries accumulators.
pub const ACCUMULATOR_MODULE: u8 = 1;
pub const ACCUMULATOR_CHANNELS: [u32; 2] = [0, 1];

pub fn is_accumulator_channel(module: u8, channel: u32) -> bool {
    module == ACCUMULATOR_MODULE && ACCUMULATOR_CHANNELS.contains(&channel)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccumulatorState {
    Uninitialized,
    Accumulating,
}

/// Value and count read in one transaction; `value` includes the offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorOutput {
    pub value: i64,
    pub count: i64,
}

impl AccumulatorOutput {
    /// Mean accumulated value per sample, `None` before the first sample.
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.value as f64 / self.count as f64)
    }
}

impl AnalogChannel {
    pub fn is_accumulator_channel(&self) -> bool {
        is_accumulator_channel(self.module_number(), self.channel())
    }

    fn require_accumulator(&self) -> Result<()> {
        if !self.is_accumulator_channel() {
            return Err(SensorError::UnsupportedChannel {
                module: self.module_number(),
                channel: self.channel(),
            });
        }
        Ok(())
    }

    pub fn accumulator_state(&self) -> AccumulatorState {
        self.accumulator_state
    }

    pub fn accumulator_offset(&self) -> i64 {
        self.accumulator_offset
    }

    /// Clear the offset and start the hardware sum and count from zero.
    pub fn init_accumulator(&mut self) -> Result<()> {
        self.require_accumulator()?;
        self.write("accumulator_init", |hw, port| hw.accumulator_init(port))?;
        self.accumulator_offset = 0;
        self.accumulator_state = AccumulatorState::Accumulating;
        debug!(module = self.module_number(), channel = self.channel(), "accumulator initialised");
        Ok(())
    }

    /// Value added to every sum read back. Hardware state is untouched.
    pub fn set_accumulator_initial_value(&mut self, initial_value: i64) -> Result<()> {
        self.require_accumulator()?;
        self.accumulator_offset = initial_value;
        Ok(())
    }

    /// Zero the hardware sum and count. The offset is kept.
    pub fn reset_accumulator(&self) -> Result<()> {
        self.require_accumulator()?;
        self.write("accumulator_reset", |hw, port| hw.accumulator_reset(port))
    }

    /// Value the hardware subtracts from each engine output before adding it
    /// to the sum, e.g. a gyro's zero-rate output. Expressed in engine units,
    /// so it scales with the oversample depth.
    pub fn set_accumulator_center(&self, center: i32) -> Result<()> {
        self.require_accumulator()?;
        self.write("accumulator_set_center", |hw, port| {
            hw.accumulator_set_center(port, center)
        })
    }

    /// [`AnalogChannel::set_accumulator_center`] with the center given in
    /// volts, converted through the channel calibration and oversample gain.
    pub fn set_accumulator_center_volts(&self, volts: f64) -> Result<i32> {
        self.require_accumulator()?;
        let cal = self.calibration()?;
        let oversample = self.oversample_bits()?;
        let out_of_range = SensorError::InvalidArgument("center voltage out of range");
        let raw = cal.volts_to_raw(volts).ok_or(out_of_range.clone())?;
        if oversample >= 31 {
            return Err(out_of_range);
        }
        let center = raw.checked_mul(1 << oversample).ok_or(out_of_range)?;
        self.set_accumulator_center(center)?;
        Ok(center)
    }

    /// Engine outputs within `±deadband` of the center add nothing to the sum.
    pub fn set_accumulator_deadband(&self, deadband: i32) -> Result<()> {
        self.require_accumulator()?;
        self.write("accumulator_set_deadband", |hw, port| {
            hw.accumulator_set_deadband(port, deadband)
        })
    }

    /// Hardware sum since the last reset plus the software offset. The sum
    /// wraps at the `i64` bounds.
    pub fn accumulator_value(&self) -> Result<i64> {
        self.require_accumulator()?;
        let sum = self.read("accumulator_read_value", |hw, port| {
            hw.accumulator_read_value(port)
        })?;
        Ok(sum.wrapping_add(self.accumulator_offset))
    }

    /// Samples accumulated since the last reset.
    pub fn accumulator_count(&self) -> Result<i64> {
        self.require_accumulator()?;
        self.read("accumulator_read_count", |hw, port| {
            hw.accumulator_read_count(port)
        })
    }

    /// Value and count latched together, so `value / count` is consistent.
    pub fn accumulator_output(&self) -> Result<AccumulatorOutput> {
        self.require_accumulator()?;
        let AccumulatorSnapshot { value, count } = self.read("accumulator_read_joint", |hw, port| {
            hw.accumulator_read_joint(port)
        })?;
        Ok(AccumulatorOutput {
            value: value.wrapping_add(self.accumulator_offset),
            count,
        })
    }

    /// Out-parameter form of [`AnalogChannel::accumulator_output`].
    ///
    /// A missing `out` is rejected before the hardware is touched. `out` is
    /// written only when the whole read succeeds.
    pub fn read_accumulator_output(&self, out: Option<&mut AccumulatorOutput>) -> Result<()> {
        let out = out.ok_or(SensorError::InvalidArgument("accumulator output is required"))?;
        *out = self.accumulator_output()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HalContext;
    use hal_port::{MockHardware, MockOp, StatusCode};
    use std::sync::Arc;

    fn setup() -> (Arc<MockHardware>, HalContext) {
        let hw = Arc::new(MockHardware::new());
        let ctx = HalContext::new(hw.clone());
        (hw, ctx)
    }

    #[test]
    fn whitelist_is_module_one_channels_zero_and_one() {
        assert!(is_accumulator_channel(1, 0));
        assert!(is_accumulator_channel(1, 1));
        assert!(!is_accumulator_channel(1, 2));
        assert!(!is_accumulator_channel(2, 0));
        assert!(!is_accumulator_channel(2, 1));
        for channel in 2..8 {
            assert!(!is_accumulator_channel(1, channel));
        }
    }

    #[test]
    fn channel_reports_whitelist_membership() {
        let (_hw, ctx) = setup();
        assert!(AnalogChannel::open(&ctx, 1, 1).unwrap().is_accumulator_channel());
        assert!(!AnalogChannel::open(&ctx, 1, 2).unwrap().is_accumulator_channel());
        assert!(!AnalogChannel::open(&ctx, 2, 0).unwrap().is_accumulator_channel());
    }

    #[test]
    fn init_transitions_to_accumulating() {
        let (_hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        assert_eq!(ch.accumulator_state(), AccumulatorState::Uninitialized);
        ch.set_accumulator_initial_value(9).unwrap();
        ch.init_accumulator().unwrap();
        assert_eq!(ch.accumulator_state(), AccumulatorState::Accumulating);
        assert_eq!(ch.accumulator_offset(), 0);
    }

    #[test]
    fn init_on_unsupported_channel_fails() {
        let (_hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 2).unwrap();
        assert_eq!(
            ch.init_accumulator(),
            Err(SensorError::UnsupportedChannel {
                module: 1,
                channel: 2
            })
        );
        assert_eq!(ch.accumulator_state(), AccumulatorState::Uninitialized);
    }

    #[test]
    fn every_accumulator_op_checks_whitelist() {
        let (_hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 2, 0).unwrap();
        let unsupported = |r: Result<()>| matches!(r, Err(SensorError::UnsupportedChannel { .. }));
        assert!(unsupported(ch.set_accumulator_initial_value(1)));
        assert!(unsupported(ch.reset_accumulator()));
        assert!(unsupported(ch.set_accumulator_center(0)));
        assert!(unsupported(ch.set_accumulator_deadband(0)));
        assert!(unsupported(ch.accumulator_value().map(|_| ())));
        assert!(unsupported(ch.accumulator_count().map(|_| ())));
        assert!(unsupported(ch.accumulator_output().map(|_| ())));
    }

    #[test]
    fn initial_value_is_added_to_reads() {
        let (_hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        ch.init_accumulator().unwrap();
        ch.set_accumulator_initial_value(100).unwrap();
        assert_eq!(ch.accumulator_value().unwrap(), 100);
    }

    #[test]
    fn offset_composes_with_hardware_sum() {
        let (hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 1).unwrap();
        ch.init_accumulator().unwrap();
        hw.set_accumulator(1, 1, -40, 3);
        ch.set_accumulator_initial_value(100).unwrap();
        assert_eq!(ch.accumulator_value().unwrap(), 60);
        assert_eq!(ch.accumulator_count().unwrap(), 3);
    }

    #[test]
    fn reset_keeps_offset() {
        let (hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        ch.init_accumulator().unwrap();
        hw.push_samples(1, 0, [12, 12, 12]);
        ch.set_accumulator_initial_value(50).unwrap();
        assert_eq!(ch.accumulator_value().unwrap(), 86);
        ch.reset_accumulator().unwrap();
        assert_eq!(ch.accumulator_value().unwrap(), 50);
        assert_eq!(ch.accumulator_count().unwrap(), 0);
        assert_eq!(ch.accumulator_offset(), 50);
    }

    #[test]
    fn offset_at_i64_limit_wraps() {
        let (hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        ch.init_accumulator().unwrap();
        hw.push_sample(1, 0, 5);
        ch.set_accumulator_initial_value(i64::MAX).unwrap();
        assert_eq!(ch.accumulator_value().unwrap(), i64::MIN + 4);
        let out = ch.accumulator_output().unwrap();
        assert_eq!(out, AccumulatorOutput { value: i64::MIN + 4, count: 1 });
    }

    #[test]
    fn center_and_deadband_shape_the_sum() {
        let (hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        ch.init_accumulator().unwrap();
        ch.set_accumulator_center(2000).unwrap();
        ch.set_accumulator_deadband(3).unwrap();
        hw.push_samples(1, 0, [2001, 1998, 2010, 2010, 1990]);
        let out = ch.accumulator_output().unwrap();
        assert_eq!(out.count, 5);
        assert_eq!(out.value, 10);
        assert_eq!(out.average(), Some(2.0));
    }

    #[test]
    fn center_in_volts_follows_oversample_gain() {
        let (hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 1).unwrap();
        hw.set_calibration(1, 1, 1_000_000_000, 0);
        ch.set_oversample_bits(2).unwrap();
        assert_eq!(ch.set_accumulator_center_volts(5.0).unwrap(), 20);
    }

    #[test]
    fn joint_read_includes_offset() {
        let (hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        ch.init_accumulator().unwrap();
        hw.set_accumulator(1, 0, 7, 2);
        ch.set_accumulator_initial_value(-10).unwrap();
        let mut out = AccumulatorOutput::default();
        ch.read_accumulator_output(Some(&mut out)).unwrap();
        assert_eq!(out, AccumulatorOutput { value: -3, count: 2 });
    }

    #[test]
    fn joint_read_on_unsupported_channel_leaves_output_alone() {
        let (_hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 5).unwrap();
        let mut out = AccumulatorOutput { value: 11, count: 22 };
        let err = ch.read_accumulator_output(Some(&mut out)).unwrap_err();
        assert!(matches!(err, SensorError::UnsupportedChannel { .. }));
        assert_eq!(out, AccumulatorOutput { value: 11, count: 22 });
    }

    #[test]
    fn joint_read_without_output_fails_before_hardware_access() {
        let (hw, ctx) = setup();
        let ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        let before = hw.access_count();
        assert_eq!(
            ch.read_accumulator_output(None),
            Err(SensorError::InvalidArgument("accumulator output is required"))
        );
        assert_eq!(hw.access_count(), before);
    }

    #[test]
    fn joint_read_failure_leaves_output_alone() {
        let (hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        ch.init_accumulator().unwrap();
        hw.fail_next(MockOp::AccumulatorReadJoint, StatusCode::INCOMPATIBLE_STATE);
        let mut out = AccumulatorOutput { value: 1, count: 1 };
        let err = ch.read_accumulator_output(Some(&mut out)).unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INCOMPATIBLE_STATE));
        assert_eq!(out, AccumulatorOutput { value: 1, count: 1 });
    }

    #[test]
    fn hardware_init_failure_keeps_state() {
        let (hw, ctx) = setup();
        let mut ch = AnalogChannel::open(&ctx, 1, 0).unwrap();
        hw.fail_next(MockOp::AccumulatorInit, StatusCode::NULL_PARAMETER);
        assert!(matches!(
            ch.init_accumulator(),
            Err(SensorError::HardwareWrite { op: "accumulator_init", .. })
        ));
        assert_eq!(ch.accumulator_state(), AccumulatorState::Uninitialized);
    }
}
