//! Sources a counter or encoder can be routed from.

/// Routing coordinates of a signal source.
pub trait RoutingSource {
    fn channel_for_routing(&self) -> u32;
    /// Zero-based module index.
    fn module_for_routing(&self) -> u8;
    fn is_analog_trigger(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TriggerOutputType {
    InWindow = 0,
    State = 1,
    RisingPulse = 2,
    FallingPulse = 3,
}

/// One output of an analog trigger. Each trigger exposes four outputs, so
/// the output type occupies the low two bits of the routing channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalogTriggerOutput {
    trigger_index: u8,
    output: TriggerOutputType,
}

impl AnalogTriggerOutput {
    pub fn new(trigger_index: u8, output: TriggerOutputType) -> Self {
        Self {
            trigger_index,
            output,
        }
    }

    pub fn trigger_index(&self) -> u8 {
        self.trigger_index
    }

    pub fn output(&self) -> TriggerOutputType {
        self.output
    }
}

impl RoutingSource for AnalogTriggerOutput {
    fn channel_for_routing(&self) -> u32 {
        (u32::from(self.trigger_index) << 2) + self.output as u32
    }

    fn module_for_routing(&self) -> u8 {
        self.trigger_index >> 2
    }

    fn is_analog_trigger(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(src: &dyn RoutingSource) -> (u32, u8, bool) {
        (
            src.channel_for_routing(),
            src.module_for_routing(),
            src.is_analog_trigger(),
        )
    }

    #[test]
    fn trigger_output_packs_type_into_channel() {
        let out = AnalogTriggerOutput::new(5, TriggerOutputType::RisingPulse);
        assert_eq!(describe(&out), (22, 1, true));
    }

    #[test]
    fn last_trigger_stays_in_range() {
        let out = AnalogTriggerOutput::new(u8::MAX, TriggerOutputType::State);
        assert_eq!(describe(&out), (1021, 63, true));
    }

    #[test]
    fn first_trigger_routes_from_module_zero() {
        let out = AnalogTriggerOutput::new(0, TriggerOutputType::InWindow);
        assert_eq!(describe(&out), (0, 0, true));
        let out = AnalogTriggerOutput::new(3, TriggerOutputType::FallingPulse);
        assert_eq!(describe(&out), (15, 0, true));
    }
}
