use crate::analog::layout_index;
use crate::{HalContext, Result, RoutingSource, SensorError};
use channel_registry::{ChannelSlot, ResourceKind};
use hal_port::{Hardware, PortHandle};
use std::sync::Arc;
use tracing::{info, warn};

const SENSOR_KIND: &str = "Digital Input";

/// Exclusive handle on one digital line, reserved as an input.
pub struct DigitalInput {
    hardware: Arc<dyn Hardware>,
    port: PortHandle,
    module: u8,
    channel: u32,
    _slot: ChannelSlot,
}

impl DigitalInput {
    pub fn open(ctx: &HalContext, module: u8, channel: u32) -> Result<Self> {
        let hw = ctx.hardware();
        if !hw.digital_module_exists(module) {
            warn!(module, channel, "digital module not present");
            return Err(SensorError::ModuleNotPresent {
                kind: ResourceKind::Digital,
                module,
                channel,
            });
        }
        if !hw.digital_channel_exists(channel) {
            warn!(module, channel, "digital channel not present");
            return Err(SensorError::ChannelNotPresent {
                kind: ResourceKind::Digital,
                module,
                channel,
            });
        }

        let registry = ctx.registry(ResourceKind::Digital);
        let index = layout_index(registry.layout(), ResourceKind::Digital, module, channel)?;
        let slot = registry
            .claim(index)
            .map_err(|_| SensorError::ChannelAlreadyAllocated {
                kind: ResourceKind::Digital,
                module,
                channel,
            })?;

        let init_failed = |status| SensorError::HardwareInit {
            kind: ResourceKind::Digital,
            module,
            channel,
            status,
        };
        let port = hw.bind_digital(module, channel).map_err(init_failed)?;
        hw.allocate_dio(port, true).map_err(init_failed)?;

        ctx.sensors().add_sensor(SENSOR_KIND, module, channel);
        ctx.usage().report(ResourceKind::Digital, channel, module - 1);
        info!(module, channel, index, "digital input opened");

        Ok(Self {
            hardware: ctx.hardware_arc(),
            port,
            module,
            channel,
            _slot: slot,
        })
    }

    pub fn module_number(&self) -> u8 {
        self.module
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Current level of the line.
    pub fn get(&self) -> Result<bool> {
        self.hardware
            .read_dio(self.port)
            .map_err(|status| SensorError::HardwareRead {
                op: "read_dio",
                status,
            })
    }
}

impl RoutingSource for DigitalInput {
    fn channel_for_routing(&self) -> u32 {
        self.channel
    }

    fn module_for_routing(&self) -> u8 {
        self.module - 1
    }

    fn is_analog_trigger(&self) -> bool {
        false
    }
}

impl core::fmt::Debug for DigitalInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DigitalInput")
            .field("module", &self.module)
            .field("channel", &self.channel)
            .finish()
    }
}

impl Drop for DigitalInput {
    fn drop(&mut self) {
        if let Err(status) = self.hardware.free_dio(self.port) {
            warn!(module = self.module, channel = self.channel, %status, "freeing digital line failed");
        }
        info!(module = self.module, channel = self.channel, "digital input released");
    }
}
