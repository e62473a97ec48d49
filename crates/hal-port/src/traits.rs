use crate::{AccumulatorSnapshot, PortHandle, PortResult};

/// Answers whether modules and channels physically exist.
pub trait PresenceOracle: Send + Sync {
    fn analog_module_exists(&self, module: u8) -> bool;
    fn analog_channel_exists(&self, channel: u32) -> bool;
    fn digital_module_exists(&self, module: u8) -> bool;
    fn digital_channel_exists(&self, channel: u32) -> bool;
}

/// Register-level access to analog inputs, their oversample/average engine,
/// and the accumulator attached behind that engine.
pub trait AnalogPort: Send + Sync {
    /// Bind and initialise the port for `(module, channel)`.
    fn bind_analog(&self, module: u8, channel: u32) -> PortResult<PortHandle>;

    /// Latest raw 12-bit conversion.
    fn read_raw(&self, port: PortHandle) -> PortResult<i16>;

    /// Latest output of the oversample/average engine.
    fn read_average(&self, port: PortHandle) -> PortResult<i32>;

    /// Factory LSB weight in nanovolts per code.
    fn read_lsb_weight(&self, port: PortHandle) -> PortResult<u32>;

    /// Factory offset in nanovolts.
    fn read_offset(&self, port: PortHandle) -> PortResult<i32>;

    fn write_average_bits(&self, port: PortHandle, bits: u32) -> PortResult<()>;
    fn read_average_bits(&self, port: PortHandle) -> PortResult<u32>;
    fn write_oversample_bits(&self, port: PortHandle, bits: u32) -> PortResult<()>;
    fn read_oversample_bits(&self, port: PortHandle) -> PortResult<u32>;

    /// Scan rate shared by every channel on `module`.
    fn write_sample_rate(&self, module: u8, samples_per_second: f64) -> PortResult<()>;
    fn read_sample_rate(&self, module: u8) -> PortResult<f64>;

    fn accumulator_init(&self, port: PortHandle) -> PortResult<()>;
    fn accumulator_reset(&self, port: PortHandle) -> PortResult<()>;
    fn accumulator_set_center(&self, port: PortHandle, center: i32) -> PortResult<()>;
    fn accumulator_set_deadband(&self, port: PortHandle, deadband: i32) -> PortResult<()>;
    fn accumulator_read_value(&self, port: PortHandle) -> PortResult<i64>;
    fn accumulator_read_count(&self, port: PortHandle) -> PortResult<i64>;

    /// Sum and count latched together; implementations must not compose this
    /// from two separate reads.
    fn accumulator_read_joint(&self, port: PortHandle) -> PortResult<AccumulatorSnapshot>;
}

/// Register-level access to digital I/O lines.
pub trait DigitalPort: Send + Sync {
    fn bind_digital(&self, module: u8, channel: u32) -> PortResult<PortHandle>;

    /// Reserve the line in the module as an input (`true`) or output.
    fn allocate_dio(&self, port: PortHandle, input: bool) -> PortResult<()>;
    fn free_dio(&self, port: PortHandle) -> PortResult<()>;
    fn read_dio(&self, port: PortHandle) -> PortResult<bool>;
}

/// Everything a channel object needs from the hardware layer.
pub trait Hardware: PresenceOracle + AnalogPort + DigitalPort {}

impl<T: PresenceOracle + AnalogPort + DigitalPort> Hardware for T {}
