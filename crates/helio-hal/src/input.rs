//! Video input sources
//!
//! Values written to the INPUT_SOURCE control. LG panels expose extra inputs
//! through a manufacturer-specific control and a different source address.

use crate::codec::{HOST_SOURCE, LG_SOURCE};
use crate::controls::ControlId;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! input_sources {
    ($($variant:ident = $value:literal => $label:literal [$($alias:literal),*],)*) => {
        /// Value of the INPUT_SOURCE control
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        #[repr(u16)]
        pub enum VideoInputSource {
            $($variant = $value,)*
        }

        impl VideoInputSource {
            /// Every known input source
            pub const ALL: &'static [VideoInputSource] = &[$(VideoInputSource::$variant),*];

            /// Label shown to users
            pub fn label(self) -> &'static str {
                match self {
                    $(VideoInputSource::$variant => $label,)*
                }
            }

            /// Look up a source by raw control value
            pub fn from_value(value: u16) -> Option<Self> {
                match value {
                    $($value => Some(VideoInputSource::$variant),)*
                    _ => None,
                }
            }

            fn from_compact(compact: &str) -> Option<Self> {
                match compact {
                    $($($alias)|* => Some(VideoInputSource::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

input_sources! {
    Vga1 = 0x01 => "VGA 1" ["vga", "vga1"],
    Vga2 = 0x02 => "VGA 2" ["vga2"],
    Dvi1 = 0x03 => "DVI 1" ["dvi", "dvi1"],
    Dvi2 = 0x04 => "DVI 2" ["dvi2"],
    Composite1 = 0x05 => "Composite 1" ["composite", "compositevideo", "compositevideo1"],
    Composite2 = 0x06 => "Composite 2" ["compositevideo2"],
    SVideo1 = 0x07 => "S-Video 1" ["svideo", "svideo1"],
    SVideo2 = 0x08 => "S-Video 2" ["svideo2"],
    Tuner1 = 0x09 => "Tuner 1" ["tuner", "tuner1"],
    Tuner2 = 0x0A => "Tuner 2" ["tuner2"],
    Tuner3 = 0x0B => "Tuner 3" ["tuner3"],
    Component1 = 0x0C => "Component 1" ["component", "componentvideo", "componentvideoyprpbycrcb", "componentvideoyprpbycrcb1"],
    Component2 = 0x0D => "Component 2" ["componentvideoyprpbycrcb2"],
    Component3 = 0x0E => "Component 3" ["componentvideoyprpbycrcb3"],
    DisplayPort1 = 0x0F => "DisplayPort 1" ["dp", "dp1", "minidp", "minidisplayport", "displayport", "displayport1"],
    DisplayPort2 = 0x10 => "DisplayPort 2" ["dp2", "minidp2", "minidisplayport2", "displayport2"],
    Hdmi1 = 0x11 => "HDMI 1" ["hdmi", "hdmi1"],
    Hdmi2 = 0x12 => "HDMI 2" ["hdmi2"],
    Hdmi3 = 0x13 => "HDMI 3" ["hdmi3"],
    Hdmi4 = 0x14 => "HDMI 4" ["hdmi4"],
    UsbC1 = 0x19 => "USB-C 1" ["thunderbolt1", "usbc1"],
    UsbC2 = 0x1B => "USB-C 2" ["thunderbolt", "thunderbolt2", "usbc", "usbc2"],
    UsbC3 = 0x1C => "USB-C 3" ["thunderbolt3", "usbc3"],
    LgHdmi1 = 0x90 => "LG HDMI 1" ["lghdmi", "lghdmi1"],
    LgHdmi2 = 0x91 => "LG HDMI 2" ["lghdmi2"],
    LgHdmi3 = 0x92 => "LG HDMI 3" ["lghdmi3"],
    LgHdmi4 = 0x93 => "LG HDMI 4" ["lghdmi4"],
    LgDisplayPort3 = 0xC0 => "LG DisplayPort 3" ["lgdp3", "lgminidp3", "lgminidisplayport3", "lgdisplayport3"],
    LgDisplayPort4 = 0xC1 => "LG DisplayPort 4" ["lgdp4", "lgminidp4", "lgminidisplayport4", "lgdisplayport4"],
    LgDisplayPort1 = 0xD0 => "LG DisplayPort 1" ["lgdp", "lgdp1", "lgminidp", "lgminidisplayport", "lgdisplayport", "lgdisplayport1"],
    LgDisplayPort2 = 0xD1 => "LG DisplayPort 2" ["lgdp2", "lgminidp2", "lgminidisplayport2", "lgdisplayport2"],
    LgUsbC1 = 0xD2 => "LG USB-C 1" ["lgusbc", "lgusbc1", "lgthunderbolt", "lgthunderbolt1"],
    LgUsbC2 = 0xD3 => "LG USB-C 2" ["lgusbc2", "lgthunderbolt2"],
    LgUsbC3 = 0xE0 => "LG USB-C 3" ["lgusbc3", "lgthunderbolt3"],
    LgUsbC4 = 0xE1 => "LG USB-C 4" ["lgusbc4", "lgthunderbolt4"],
    Unknown = 0xF6 => "Unknown" ["unknown"],
}

impl VideoInputSource {
    /// Inputs only reachable through LG's manufacturer-specific control
    pub fn is_lg_specific(self) -> bool {
        matches!(self as u16, 0x90..=0x93 | 0xC0 | 0xC1 | 0xD0..=0xD3 | 0xE0 | 0xE1)
    }

    /// Raw control value
    pub fn value(self) -> u16 {
        self as u16
    }

    /// Control and source address to use when selecting this input
    pub fn write_target(self) -> (ControlId, u8) {
        if self.is_lg_specific() {
            (ControlId::ManufacturerSpecificF4, LG_SOURCE)
        } else {
            (ControlId::InputSource, HOST_SOURCE)
        }
    }

    /// Parse user input such as "HDMI 2", "dp", "usb-c" or "0x11"
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"));
        if let Some(digits) = hex {
            return u16::from_str_radix(digits, 16)
                .ok()
                .and_then(Self::from_value);
        }

        let compact: String = trimmed
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        Self::from_compact(&compact)
    }
}

impl fmt::Display for VideoInputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_names() {
        assert_eq!(VideoInputSource::parse("HDMI"), Some(VideoInputSource::Hdmi1));
        assert_eq!(VideoInputSource::parse("hdmi 2"), Some(VideoInputSource::Hdmi2));
        assert_eq!(VideoInputSource::parse("DP"), Some(VideoInputSource::DisplayPort1));
        assert_eq!(VideoInputSource::parse("usb-c"), Some(VideoInputSource::UsbC2));
        assert_eq!(VideoInputSource::parse("LG HDMI 3"), Some(VideoInputSource::LgHdmi3));
        assert_eq!(VideoInputSource::parse("0x0f"), Some(VideoInputSource::DisplayPort1));
        assert_eq!(VideoInputSource::parse("nothing"), None);
    }

    #[test]
    fn test_lg_specific_write_target() {
        assert!(VideoInputSource::LgUsbC1.is_lg_specific());
        assert!(!VideoInputSource::Hdmi1.is_lg_specific());
        assert_eq!(
            VideoInputSource::LgHdmi1.write_target(),
            (ControlId::ManufacturerSpecificF4, 0x50)
        );
        assert_eq!(
            VideoInputSource::Hdmi1.write_target(),
            (ControlId::InputSource, 0x51)
        );
    }

    #[test]
    fn test_from_value() {
        for source in VideoInputSource::ALL {
            assert_eq!(VideoInputSource::from_value(source.value()), Some(*source));
        }
        assert_eq!(VideoInputSource::from_value(0x42), None);
    }

    #[test]
    fn test_lg_group_size() {
        let count = VideoInputSource::ALL
            .iter()
            .filter(|s| s.is_lg_specific())
            .count();
        assert_eq!(count, 12);
    }
}
