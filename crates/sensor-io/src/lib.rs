//! sensor-io: channel objects for analog inputs, accumulators and digital lines
//!
//! Every channel object is created through a [`HalContext`], which carries
//! the per-kind [`ChannelRegistry`](channel_registry::ChannelRegistry), the
//! [`Hardware`](hal_port::Hardware) capability, and the outbound hooks. A
//! channel owns its registry slot for as long as it lives; dropping it
//! releases the slot.

mod error;
pub use error::{Result, SensorError};

mod context;
pub use context::{HalContext, HalContextBuilder};

mod hooks;
pub use hooks::{
    InMemoryTable, LiveValueTable, NoopHooks, RecordingHooks, SensorEntry, SensorRegistry,
    UsageEntry, UsageReporter,
};

mod calibration;
pub use calibration::Calibration;

mod analog;
pub use analog::{AnalogChannel, PidSource};

mod accumulator;
pub use accumulator::{
    is_accumulator_channel, AccumulatorOutput, AccumulatorState, ACCUMULATOR_CHANNELS,
    ACCUMULATOR_MODULE,
};

mod digital;
pub use digital::DigitalInput;

mod routing;
pub use routing::{AnalogTriggerOutput, RoutingSource, TriggerOutputType};

pub mod config;
pub use config::{load_chassis_file, ChassisConfig};
