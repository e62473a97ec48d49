//! channel-registry: exclusive ownership of physical I/O channels
//!
//! Each resource class (analog inputs, digital lines) gets one
//! [`ChannelRegistry`] sized from a [`ChannelLayout`]. A (module, channel)
//! pair is flattened into a single index and at most one owner may hold that
//! index at a time. Registries are plain values: construct them at startup,
//! share them behind an `Arc`, and drop them at shutdown.

mod types;
pub use types::{ChannelLayout, ResourceKind};

mod error;
pub use error::{RegistryError, Result};

mod registry;
pub use registry::{ChannelRegistry, ChannelSlot};

mod metrics;
pub use metrics::AllocationMetrics;
