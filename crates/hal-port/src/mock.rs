use crate::{
    AccumulatorSnapshot, AnalogPort, DigitalPort, PortHandle, PortResult, PresenceOracle,
    StatusCode,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

const ANALOG_CHANNELS: u32 = 8;
const DIGITAL_CHANNELS: u32 = 14;
const MAX_ENGINE_BITS: u32 = 15;
const MAX_SAMPLE_RATE: f64 = 500_000.0;
const DEFAULT_SAMPLE_RATE: f64 = 50_000.0;
const DEFAULT_LSB_WEIGHT: u32 = 4_882_812;
const ACCUMULATOR_MODULE: u8 = 1;
const ACCUMULATOR_CHANNELS: [u32; 2] = [0, 1];

/// Primitive selector for one-shot failure injection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MockOp {
    BindAnalog,
    ReadRaw,
    ReadAverage,
    ReadLsbWeight,
    ReadOffset,
    WriteAverageBits,
    ReadAverageBits,
    WriteOversampleBits,
    ReadOversampleBits,
    WriteSampleRate,
    ReadSampleRate,
    AccumulatorInit,
    AccumulatorReset,
    AccumulatorSetCenter,
    AccumulatorSetDeadband,
    AccumulatorReadValue,
    AccumulatorReadCount,
    AccumulatorReadJoint,
    BindDigital,
    AllocateDio,
    FreeDio,
    ReadDio,
}

#[derive(Default)]
struct Engine {
    oversample_sum: i64,
    oversample_n: u32,
    average_sum: i64,
    average_n: u32,
    output: i32,
}

#[derive(Default)]
struct Accumulator {
    armed: bool,
    sum: i64,
    count: i64,
    center: i32,
    deadband: i32,
}

impl Accumulator {
    fn feed(&mut self, sample: i32) {
        if !self.armed {
            return;
        }
        let mut delta = i64::from(sample) - i64::from(self.center);
        if delta.abs() <= i64::from(self.deadband) {
            delta = 0;
        }
        self.sum += delta;
        self.count += 1;
    }

    fn clear(&mut self) {
        self.sum = 0;
        self.count = 0;
    }
}

struct AnalogSim {
    bound: bool,
    raw: i16,
    lsb_weight: u32,
    offset: i32,
    average_bits: u32,
    oversample_bits: u32,
    engine: Engine,
    accumulator: Accumulator,
}

impl Default for AnalogSim {
    fn default() -> Self {
        Self {
            bound: false,
            raw: 0,
            lsb_weight: DEFAULT_LSB_WEIGHT,
            offset: 0,
            average_bits: 0,
            oversample_bits: 0,
            engine: Engine::default(),
            accumulator: Accumulator::default(),
        }
    }
}

impl AnalogSim {
    /// One conversion through the engine: `2^oversample` raw codes are
    /// summed, `2^average` of those sums are averaged, and each finished
    /// average is handed to the accumulator.
    fn convert(&mut self, raw: i16) {
        self.raw = raw;
        let e = &mut self.engine;
        e.oversample_sum += i64::from(raw);
        e.oversample_n += 1;
        if e.oversample_n < 1 << self.oversample_bits {
            return;
        }
        e.average_sum += e.oversample_sum;
        e.average_n += 1;
        e.oversample_sum = 0;
        e.oversample_n = 0;
        if e.average_n < 1 << self.average_bits {
            return;
        }
        let out = e.average_sum >> self.average_bits;
        e.output = i32::try_from(out).unwrap_or(if out < 0 { i32::MIN } else { i32::MAX });
        e.average_sum = 0;
        e.average_n = 0;
        let out = e.output;
        self.accumulator.feed(out);
    }

    fn restart_engine(&mut self) {
        self.engine = Engine {
            output: self.engine.output,
            ..Engine::default()
        };
    }
}

#[derive(Default)]
struct DioSim {
    reserved: Option<bool>,
    level: bool,
}

struct State {
    analog_modules: BTreeSet<u8>,
    digital_modules: BTreeSet<u8>,
    analog: HashMap<(u8, u32), AnalogSim>,
    digital: HashMap<(u8, u32), DioSim>,
    sample_rates: HashMap<u8, f64>,
    failures: HashMap<MockOp, StatusCode>,
    accesses: u64,
}

/// In-process hardware model.
///
/// Presents analog modules 1 and 2 with eight inputs each and digital
/// modules 1 and 2 with fourteen lines each. Samples are injected with
/// [`MockHardware::push_sample`]; each one runs through a software model of
/// the oversample/average engine and, for channels 0 and 1 on module 1, the
/// accumulator. Samples whose distance from the accumulator center is within
/// the deadband are counted but contribute zero to the sum.
pub struct MockHardware {
    state: Mutex<State>,
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHardware {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                analog_modules: [1, 2].into_iter().collect(),
                digital_modules: [1, 2].into_iter().collect(),
                analog: HashMap::new(),
                digital: HashMap::new(),
                sample_rates: HashMap::new(),
                failures: HashMap::new(),
                accesses: 0,
            }),
        }
    }

    pub fn set_analog_module_present(&self, module: u8, present: bool) {
        let mut s = self.state.lock();
        if present {
            s.analog_modules.insert(module);
        } else {
            s.analog_modules.remove(&module);
        }
    }

    pub fn set_digital_module_present(&self, module: u8, present: bool) {
        let mut s = self.state.lock();
        if present {
            s.digital_modules.insert(module);
        } else {
            s.digital_modules.remove(&module);
        }
    }

    /// Make the next call of `op` fail with `status`.
    pub fn fail_next(&self, op: MockOp, status: StatusCode) {
        self.state.lock().failures.insert(op, status);
    }

    /// Number of port primitives invoked so far (presence queries excluded).
    pub fn access_count(&self) -> u64 {
        self.state.lock().accesses
    }

    /// Overwrite the instantaneous raw code without running the engine.
    pub fn set_raw(&self, module: u8, channel: u32, raw: i16) {
        self.state.lock().analog.entry((module, channel)).or_default().raw = raw;
    }

    /// Feed one conversion through the engine and accumulator.
    pub fn push_sample(&self, module: u8, channel: u32, raw: i16) {
        self.state
            .lock()
            .analog
            .entry((module, channel))
            .or_default()
            .convert(raw);
    }

    pub fn push_samples(&self, module: u8, channel: u32, raw: impl IntoIterator<Item = i16>) {
        let mut s = self.state.lock();
        let sim = s.analog.entry((module, channel)).or_default();
        for r in raw {
            sim.convert(r);
        }
    }

    pub fn set_calibration(&self, module: u8, channel: u32, lsb_weight: u32, offset: i32) {
        let mut s = self.state.lock();
        let sim = s.analog.entry((module, channel)).or_default();
        sim.lsb_weight = lsb_weight;
        sim.offset = offset;
    }

    /// Force the accumulator registers to a given sum and count.
    pub fn set_accumulator(&self, module: u8, channel: u32, sum: i64, count: i64) {
        let mut s = self.state.lock();
        let acc = &mut s.analog.entry((module, channel)).or_default().accumulator;
        acc.sum = sum;
        acc.count = count;
    }

    pub fn is_analog_bound(&self, module: u8, channel: u32) -> bool {
        self.state
            .lock()
            .analog
            .get(&(module, channel))
            .is_some_and(|sim| sim.bound)
    }

    pub fn set_dio_level(&self, module: u8, channel: u32, level: bool) {
        self.state
            .lock()
            .digital
            .entry((module, channel))
            .or_default()
            .level = level;
    }

    /// Direction the line is reserved for, if any.
    pub fn dio_reservation(&self, module: u8, channel: u32) -> Option<bool> {
        self.state
            .lock()
            .digital
            .get(&(module, channel))
            .and_then(|d| d.reserved)
    }

    fn access<T>(
        &self,
        op: MockOp,
        f: impl FnOnce(&mut State) -> PortResult<T>,
    ) -> PortResult<T> {
        let mut s = self.state.lock();
        s.accesses += 1;
        if let Some(status) = s.failures.remove(&op) {
            trace!(?op, %status, "injected failure");
            return Err(status);
        }
        f(&mut s)
    }

    fn analog_port<T>(
        &self,
        op: MockOp,
        port: PortHandle,
        f: impl FnOnce(&mut AnalogSim) -> PortResult<T>,
    ) -> PortResult<T> {
        self.access(op, |s| {
            match s.analog.get_mut(&(port.module(), port.channel())) {
                Some(sim) if sim.bound => f(sim),
                _ => Err(StatusCode::NULL_PARAMETER),
            }
        })
    }

    fn accumulator_port<T>(
        &self,
        op: MockOp,
        port: PortHandle,
        f: impl FnOnce(&mut AnalogSim) -> PortResult<T>,
    ) -> PortResult<T> {
        if port.module() != ACCUMULATOR_MODULE || !ACCUMULATOR_CHANNELS.contains(&port.channel())
        {
            return self.access(op, |_| Err(StatusCode::PARAMETER_OUT_OF_RANGE));
        }
        self.analog_port(op, port, f)
    }

    fn digital_port<T>(
        &self,
        op: MockOp,
        port: PortHandle,
        f: impl FnOnce(&mut DioSim) -> PortResult<T>,
    ) -> PortResult<T> {
        self.access(op, |s| {
            match s.digital.get_mut(&(port.module(), port.channel())) {
                Some(dio) => f(dio),
                None => Err(StatusCode::NULL_PARAMETER),
            }
        })
    }
}

fn check_engine_bits(bits: u32) -> PortResult<()> {
    if bits > MAX_ENGINE_BITS {
        return Err(StatusCode::PARAMETER_OUT_OF_RANGE);
    }
    Ok(())
}

impl PresenceOracle for MockHardware {
    fn analog_module_exists(&self, module: u8) -> bool {
        self.state.lock().analog_modules.contains(&module)
    }

    fn analog_channel_exists(&self, channel: u32) -> bool {
        channel < ANALOG_CHANNELS
    }

    fn digital_module_exists(&self, module: u8) -> bool {
        self.state.lock().digital_modules.contains(&module)
    }

    fn digital_channel_exists(&self, channel: u32) -> bool {
        channel < DIGITAL_CHANNELS
    }
}

impl AnalogPort for MockHardware {
    fn bind_analog(&self, module: u8, channel: u32) -> PortResult<PortHandle> {
        self.access(MockOp::BindAnalog, |s| {
            if !s.analog_modules.contains(&module) || channel >= ANALOG_CHANNELS {
                return Err(StatusCode::PARAMETER_OUT_OF_RANGE);
            }
            s.analog.entry((module, channel)).or_default().bound = true;
            trace!(module, channel, "bound analog port");
            Ok(PortHandle::new(module, channel))
        })
    }

    fn read_raw(&self, port: PortHandle) -> PortResult<i16> {
        self.analog_port(MockOp::ReadRaw, port, |sim| Ok(sim.raw))
    }

    fn read_average(&self, port: PortHandle) -> PortResult<i32> {
        self.analog_port(MockOp::ReadAverage, port, |sim| Ok(sim.engine.output))
    }

    fn read_lsb_weight(&self, port: PortHandle) -> PortResult<u32> {
        self.analog_port(MockOp::ReadLsbWeight, port, |sim| Ok(sim.lsb_weight))
    }

    fn read_offset(&self, port: PortHandle) -> PortResult<i32> {
        self.analog_port(MockOp::ReadOffset, port, |sim| Ok(sim.offset))
    }

    fn write_average_bits(&self, port: PortHandle, bits: u32) -> PortResult<()> {
        self.analog_port(MockOp::WriteAverageBits, port, |sim| {
            check_engine_bits(bits)?;
            sim.average_bits = bits;
            sim.restart_engine();
            Ok(())
        })
    }

    fn read_average_bits(&self, port: PortHandle) -> PortResult<u32> {
        self.analog_port(MockOp::ReadAverageBits, port, |sim| Ok(sim.average_bits))
    }

    fn write_oversample_bits(&self, port: PortHandle, bits: u32) -> PortResult<()> {
        self.analog_port(MockOp::WriteOversampleBits, port, |sim| {
            check_engine_bits(bits)?;
            sim.oversample_bits = bits;
            sim.restart_engine();
            Ok(())
        })
    }

    fn read_oversample_bits(&self, port: PortHandle) -> PortResult<u32> {
        self.analog_port(MockOp::ReadOversampleBits, port, |sim| {
            Ok(sim.oversample_bits)
        })
    }

    fn write_sample_rate(&self, module: u8, samples_per_second: f64) -> PortResult<()> {
        self.access(MockOp::WriteSampleRate, |s| {
            if !s.analog_modules.contains(&module) {
                return Err(StatusCode::PARAMETER_OUT_OF_RANGE);
            }
            if samples_per_second.is_nan() || samples_per_second <= 0.0 {
                return Err(StatusCode::PARAMETER_OUT_OF_RANGE);
            }
            if samples_per_second > MAX_SAMPLE_RATE {
                return Err(StatusCode::SAMPLE_RATE_TOO_HIGH);
            }
            s.sample_rates.insert(module, samples_per_second);
            Ok(())
        })
    }

    fn read_sample_rate(&self, module: u8) -> PortResult<f64> {
        self.access(MockOp::ReadSampleRate, |s| {
            if !s.analog_modules.contains(&module) {
                return Err(StatusCode::PARAMETER_OUT_OF_RANGE);
            }
            Ok(s.sample_rates
                .get(&module)
                .copied()
                .unwrap_or(DEFAULT_SAMPLE_RATE))
        })
    }

    fn accumulator_init(&self, port: PortHandle) -> PortResult<()> {
        self.accumulator_port(MockOp::AccumulatorInit, port, |sim| {
            sim.accumulator.armed = true;
            sim.accumulator.clear();
            Ok(())
        })
    }

    fn accumulator_reset(&self, port: PortHandle) -> PortResult<()> {
        self.accumulator_port(MockOp::AccumulatorReset, port, |sim| {
            sim.accumulator.clear();
            Ok(())
        })
    }

    fn accumulator_set_center(&self, port: PortHandle, center: i32) -> PortResult<()> {
        self.accumulator_port(MockOp::AccumulatorSetCenter, port, |sim| {
            sim.accumulator.center = center;
            Ok(())
        })
    }

    fn accumulator_set_deadband(&self, port: PortHandle, deadband: i32) -> PortResult<()> {
        self.accumulator_port(MockOp::AccumulatorSetDeadband, port, |sim| {
            if deadband < 0 {
                return Err(StatusCode::PARAMETER_OUT_OF_RANGE);
            }
            sim.accumulator.deadband = deadband;
            Ok(())
        })
    }

    fn accumulator_read_value(&self, port: PortHandle) -> PortResult<i64> {
        self.accumulator_port(MockOp::AccumulatorReadValue, port, |sim| {
            Ok(sim.accumulator.sum)
        })
    }

    fn accumulator_read_count(&self, port: PortHandle) -> PortResult<i64> {
        self.accumulator_port(MockOp::AccumulatorReadCount, port, |sim| {
            Ok(sim.accumulator.count)
        })
    }

    fn accumulator_read_joint(&self, port: PortHandle) -> PortResult<AccumulatorSnapshot> {
        self.accumulator_port(MockOp::AccumulatorReadJoint, port, |sim| {
            Ok(AccumulatorSnapshot {
                value: sim.accumulator.sum,
                count: sim.accumulator.count,
            })
        })
    }
}

impl DigitalPort for MockHardware {
    fn bind_digital(&self, module: u8, channel: u32) -> PortResult<PortHandle> {
        self.access(MockOp::BindDigital, |s| {
            if !s.digital_modules.contains(&module) || channel >= DIGITAL_CHANNELS {
                return Err(StatusCode::PARAMETER_OUT_OF_RANGE);
            }
            s.digital.entry((module, channel)).or_default();
            trace!(module, channel, "bound digital port");
            Ok(PortHandle::new(module, channel))
        })
    }

    fn allocate_dio(&self, port: PortHandle, input: bool) -> PortResult<()> {
        self.digital_port(MockOp::AllocateDio, port, |dio| {
            if dio.reserved.is_some() {
                return Err(StatusCode::RESOURCE_IS_ALLOCATED);
            }
            dio.reserved = Some(input);
            Ok(())
        })
    }

    fn free_dio(&self, port: PortHandle) -> PortResult<()> {
        self.digital_port(MockOp::FreeDio, port, |dio| {
            dio.reserved = None;
            Ok(())
        })
    }

    fn read_dio(&self, port: PortHandle) -> PortResult<bool> {
        self.digital_port(MockOp::ReadDio, port, |dio| match dio.reserved {
            Some(_) => Ok(dio.level),
            None => Err(StatusCode::INCOMPATIBLE_STATE),
        })
    }
}
