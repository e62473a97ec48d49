use core::fmt;
use serde::{Deserialize, Serialize};

/// Resource class a registry arbitrates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Analog,
    Digital,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Analog => "analog",
            ResourceKind::Digital => "digital",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of one resource class: how many modules, and how many channels each.
///
/// Modules are numbered from 1, channels from 0.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub modules: u8,
    pub channels_per_module: u32,
}

impl ChannelLayout {
    pub const fn new(modules: u8, channels_per_module: u32) -> Self {
        Self {
            modules,
            channels_per_module,
        }
    }

    /// Two analog modules with eight inputs each.
    pub const fn analog_default() -> Self {
        Self::new(2, 8)
    }

    /// Two digital sidecars with fourteen GPIO lines each.
    pub const fn digital_default() -> Self {
        Self::new(2, 14)
    }

    pub fn capacity(&self) -> usize {
        usize::from(self.modules) * self.channels_per_module as usize
    }

    pub fn contains(&self, module: u8, channel: u32) -> bool {
        module >= 1 && module <= self.modules && channel < self.channels_per_module
    }

    /// Flattened index `(module - 1) * channels_per_module + channel`, or
    /// `None` when the pair lies outside the layout.
    pub fn index(&self, module: u8, channel: u32) -> Option<usize> {
        if !self.contains(module, channel) {
            return None;
        }
        Some(usize::from(module - 1) * self.channels_per_module as usize + channel as usize)
    }

    /// Inverse of [`ChannelLayout::index`].
    pub fn locate(&self, index: usize) -> Option<(u8, u32)> {
        if index >= self.capacity() || self.channels_per_module == 0 {
            return None;
        }
        let per = self.channels_per_module as usize;
        let module = u8::try_from(index / per + 1).ok()?;
        let channel = u32::try_from(index % per).ok()?;
        Some((module, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_flattens_module_major() {
        let layout = ChannelLayout::analog_default();
        assert_eq!(layout.capacity(), 16);
        assert_eq!(layout.index(1, 0), Some(0));
        assert_eq!(layout.index(1, 7), Some(7));
        assert_eq!(layout.index(2, 0), Some(8));
        assert_eq!(layout.index(2, 7), Some(15));
    }

    #[test]
    fn index_rejects_pairs_outside_layout() {
        let layout = ChannelLayout::analog_default();
        assert_eq!(layout.index(0, 0), None);
        assert_eq!(layout.index(3, 0), None);
        assert_eq!(layout.index(1, 8), None);
    }

    #[test]
    fn locate_inverts_index() {
        let layout = ChannelLayout::digital_default();
        for module in 1..=layout.modules {
            for channel in 0..layout.channels_per_module {
                let idx = layout.index(module, channel).unwrap();
                assert_eq!(layout.locate(idx), Some((module, channel)));
            }
        }
        assert_eq!(layout.locate(layout.capacity()), None);
    }
}
