use core::fmt;
use serde::{Deserialize, Serialize};

pub type PortResult<T> = core::result::Result<T, StatusCode>;

/// Handle to a bound hardware port. Issued by the backend; the holder only
/// borrows the port and never closes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PortHandle {
    module: u8,
    channel: u32,
}

impl PortHandle {
    pub fn new(module: u8, channel: u32) -> Self {
        Self { module, channel }
    }

    pub fn module(&self) -> u8 {
        self.module
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }
}

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}/{}", self.module, self.channel)
    }
}

/// Non-zero status word reported by a failed hardware primitive.
///
/// Negative codes are errors, positive codes are warnings raised by the
/// module firmware.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SAMPLE_RATE_TOO_HIGH: StatusCode = StatusCode(1001);
    pub const VOLTAGE_OUT_OF_RANGE: StatusCode = StatusCode(1002);
    pub const LOOP_TIMING_ERROR: StatusCode = StatusCode(1004);
    pub const INCOMPATIBLE_STATE: StatusCode = StatusCode(1015);
    pub const NO_AVAILABLE_RESOURCES: StatusCode = StatusCode(-104);
    pub const NULL_PARAMETER: StatusCode = StatusCode(-1005);
    pub const PARAMETER_OUT_OF_RANGE: StatusCode = StatusCode(-1028);
    pub const RESOURCE_IS_ALLOCATED: StatusCode = StatusCode(-1029);

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_warning(self) -> bool {
        self.0 > 0
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SAMPLE_RATE_TOO_HIGH => "analog module sample rate is too high",
            Self::VOLTAGE_OUT_OF_RANGE => "voltage to convert to raw value is out of range",
            Self::LOOP_TIMING_ERROR => "digital module loop timing is not the expected value",
            Self::INCOMPATIBLE_STATE => "incompatible state: the operation cannot be completed",
            Self::NO_AVAILABLE_RESOURCES => "no available resources to allocate",
            Self::NULL_PARAMETER => "a pointer parameter to a method is NULL",
            Self::PARAMETER_OUT_OF_RANGE => "a parameter is out of range",
            Self::RESOURCE_IS_ALLOCATED => "resource already allocated",
            _ => "unknown hardware status",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.description(), self.0)
    }
}

impl std::error::Error for StatusCode {}

/// Accumulated sum and sample count captured in one hardware transaction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorSnapshot {
    pub value: i64,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_descriptions() {
        assert!(StatusCode::NULL_PARAMETER
            .to_string()
            .contains("pointer parameter"));
        assert!(StatusCode::SAMPLE_RATE_TOO_HIGH.is_warning());
        assert!(!StatusCode::PARAMETER_OUT_OF_RANGE.is_warning());
    }

    #[test]
    fn unknown_code_falls_back() {
        let s = StatusCode(-7).to_string();
        assert!(s.contains("unknown"));
        assert!(s.contains("-7"));
    }
}
