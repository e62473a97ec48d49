use serde::{Deserialize, Serialize};

const NANO: f64 = 1e9;

/// Factory scaling constants stored in the module's EEPROM.
///
/// `volts = (lsb_weight * 1e-9) * raw - offset * 1e-9`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    /// Nanovolts per ADC code.
    pub lsb_weight: u32,
    /// Nanovolts subtracted after scaling.
    pub offset: i32,
}

impl Calibration {
    pub fn to_volts(&self, raw: f64) -> f64 {
        (f64::from(self.lsb_weight) * raw - f64::from(self.offset)) / NANO
    }

    /// Nearest ADC code for `volts`, or `None` when the weight is zero or the
    /// code would not fit.
    pub fn volts_to_raw(&self, volts: f64) -> Option<i32> {
        if self.lsb_weight == 0 || !volts.is_finite() {
            return None;
        }
        let raw = ((volts * NANO + f64::from(self.offset)) / f64::from(self.lsb_weight)).round();
        if raw < f64::from(i32::MIN) || raw > f64::from(i32::MAX) {
            return None;
        }
        Some(raw as i32)
    }
}
