use channel_registry::ResourceKind;
use hal_port::StatusCode;
use thiserror::Error;

pub type Result<T, E = SensorError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    #[error("{kind} channel {channel} on module {module} cannot be allocated: module is not present")]
    ModuleNotPresent {
        kind: ResourceKind,
        module: u8,
        channel: u32,
    },
    #[error("{kind} channel {channel} on module {module} cannot be allocated: channel is not present")]
    ChannelNotPresent {
        kind: ResourceKind,
        module: u8,
        channel: u32,
    },
    #[error("{kind} channel {channel} on module {module} is already allocated")]
    ChannelAlreadyAllocated {
        kind: ResourceKind,
        module: u8,
        channel: u32,
    },
    #[error("initialising {kind} channel {channel} on module {module} failed: {status}")]
    HardwareInit {
        kind: ResourceKind,
        module: u8,
        channel: u32,
        status: StatusCode,
    },
    #[error("hardware read `{op}` failed: {status}")]
    HardwareRead { op: &'static str, status: StatusCode },
    #[error("hardware write `{op}` failed: {status}")]
    HardwareWrite { op: &'static str, status: StatusCode },
    #[error(
        "channel {channel} on module {module} is not an accumulator channel \
         (accumulators exist on module 1, channels 0 and 1)"
    )]
    UnsupportedChannel { module: u8, channel: u32 },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
}

impl SensorError {
    /// Hardware status behind the error, if it came from the hardware layer.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SensorError::HardwareInit { status, .. }
            | SensorError::HardwareRead { status, .. }
            | SensorError::HardwareWrite { status, .. } => Some(*status),
            _ => None,
        }
    }
}
