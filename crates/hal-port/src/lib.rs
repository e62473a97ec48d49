//! hal-port: the raw hardware capability underneath channel objects
//!
//! Backends implement [`PresenceOracle`], [`AnalogPort`] and [`DigitalPort`];
//! anything implementing all three is a [`Hardware`]. Every primitive reports
//! failure as a [`StatusCode`] and leaves interpretation to the caller. The
//! default build enables an in-memory `mock` backend so the rest of the
//! workspace can run on any host.

mod types;
pub use types::{AccumulatorSnapshot, PortHandle, PortResult, StatusCode};

mod traits;
pub use traits::{AnalogPort, DigitalPort, Hardware, PresenceOracle};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockHardware, MockOp};
