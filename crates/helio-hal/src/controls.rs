//! VCP control registry
//!
//! Static catalogue of the MCCS control codes understood by the DDC/CI layer,
//! with lookup from free-form strings (canonical names, aliases, hex literals
//! and a fuzzy fallback for typos).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! vcp_controls {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        /// One-byte VCP control code
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum ControlId {
            $(
                #[serde(rename = $name)]
                $variant = $code,
            )*
        }

        impl ControlId {
            /// Every known control, ordered by code
            pub const ALL: &'static [ControlId] = &[$(ControlId::$variant),*];

            /// Canonical SCREAMING_SNAKE name
            pub fn name(self) -> &'static str {
                match self {
                    $(ControlId::$variant => $name,)*
                }
            }

            /// Look up a control by its protocol code
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(ControlId::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

vcp_controls! {
    Degauss = 0x01 => "DEGAUSS",
    Reset = 0x04 => "RESET",
    ResetBrightnessAndContrast = 0x05 => "RESET_BRIGHTNESS_AND_CONTRAST",
    ResetGeometry = 0x06 => "RESET_GEOMETRY",
    ResetColor = 0x08 => "RESET_COLOR",
    RestoreFactoryTvDefaults = 0x0A => "RESTORE_FACTORY_TV_DEFAULTS",
    ColorTemperatureIncrement = 0x0B => "COLOR_TEMPERATURE_INCREMENT",
    ColorTemperatureRequest = 0x0C => "COLOR_TEMPERATURE_REQUEST",
    Clock = 0x0E => "CLOCK",
    Brightness = 0x10 => "BRIGHTNESS",
    FleshToneEnhancement = 0x11 => "FLESH_TONE_ENHANCEMENT",
    Contrast = 0x12 => "CONTRAST",
    ColorPresetA = 0x14 => "COLOR_PRESET_A",
    RedGain = 0x16 => "RED_GAIN",
    UserVisionCompensation = 0x17 => "USER_VISION_COMPENSATION",
    GreenGain = 0x18 => "GREEN_GAIN",
    BlueGain = 0x1A => "BLUE_GAIN",
    Focus = 0x1C => "FOCUS",
    AutoSizeCenter = 0x1E => "AUTO_SIZE_CENTER",
    AutoColorSetup = 0x1F => "AUTO_COLOR_SETUP",
    HorizontalPositionPhase = 0x20 => "HORIZONTAL_POSITION_PHASE",
    Width = 0x22 => "WIDTH",
    HorizontalPincushion = 0x24 => "HORIZONTAL_PINCUSHION",
    HorizontalPincushionBalance = 0x26 => "HORIZONTAL_PINCUSHION_BALANCE",
    HorizontalStaticConvergence = 0x28 => "HORIZONTAL_STATIC_CONVERGENCE",
    HorizontalConvergenceMg = 0x29 => "HORIZONTAL_CONVERGENCE_MG",
    HorizontalLinearity = 0x2A => "HORIZONTAL_LINEARITY",
    HorizontalLinearityBalance = 0x2C => "HORIZONTAL_LINEARITY_BALANCE",
    GreyScaleExpansion = 0x2E => "GREY_SCALE_EXPANSION",
    VerticalPositionPhase = 0x30 => "VERTICAL_POSITION_PHASE",
    Height = 0x32 => "HEIGHT",
    VerticalPincushion = 0x34 => "VERTICAL_PINCUSHION",
    VerticalPincushionBalance = 0x36 => "VERTICAL_PINCUSHION_BALANCE",
    VerticalStaticConvergence = 0x38 => "VERTICAL_STATIC_CONVERGENCE",
    VerticalLinearity = 0x3A => "VERTICAL_LINEARITY",
    VerticalLinearityBalance = 0x3C => "VERTICAL_LINEARITY_BALANCE",
    ClockPhase = 0x3E => "CLOCK_PHASE",
    HorizontalParallelogram = 0x40 => "HORIZONTAL_PARALLELOGRAM",
    VerticalParallelogram = 0x41 => "VERTICAL_PARALLELOGRAM",
    HorizontalKeystone = 0x42 => "HORIZONTAL_KEYSTONE",
    VerticalKeystone = 0x43 => "VERTICAL_KEYSTONE",
    VerticalRotation = 0x44 => "VERTICAL_ROTATION",
    TopPincushionAmp = 0x46 => "TOP_PINCUSHION_AMP",
    TopPincushionBalance = 0x48 => "TOP_PINCUSHION_BALANCE",
    BottomPincushionAmp = 0x4A => "BOTTOM_PINCUSHION_AMP",
    BottomPincushionBalance = 0x4C => "BOTTOM_PINCUSHION_BALANCE",
    ActiveControl = 0x52 => "ACTIVE_CONTROL",
    PerformancePreservation = 0x54 => "PERFORMANCE_PRESERVATION",
    HorizontalMoire = 0x56 => "HORIZONTAL_MOIRE",
    VerticalMoire = 0x58 => "VERTICAL_MOIRE",
    RedSaturation = 0x59 => "RED_SATURATION",
    YellowSaturation = 0x5A => "YELLOW_SATURATION",
    GreenSaturation = 0x5B => "GREEN_SATURATION",
    CyanSaturation = 0x5C => "CYAN_SATURATION",
    BlueSaturation = 0x5D => "BLUE_SATURATION",
    MagentaSaturation = 0x5E => "MAGENTA_SATURATION",
    InputSource = 0x60 => "INPUT_SOURCE",
    AudioSpeakerVolume = 0x62 => "AUDIO_SPEAKER_VOLUME",
    AudioSpeakerPairSelect = 0x63 => "AUDIO_SPEAKER_PAIR_SELECT",
    AudioMicrophoneVolume = 0x64 => "AUDIO_MICROPHONE_VOLUME",
    AudioJackConnectionStatus = 0x65 => "AUDIO_JACK_CONNECTION_STATUS",
    BacklightLevelWhite = 0x6B => "BACKLIGHT_LEVEL_WHITE",
    RedBlackLevel = 0x6C => "RED_BLACK_LEVEL",
    BacklightLevelRed = 0x6D => "BACKLIGHT_LEVEL_RED",
    GreenBlackLevel = 0x6E => "GREEN_BLACK_LEVEL",
    BacklightLevelGreen = 0x6F => "BACKLIGHT_LEVEL_GREEN",
    BlueBlackLevel = 0x70 => "BLUE_BLACK_LEVEL",
    BacklightLevelBlue = 0x71 => "BACKLIGHT_LEVEL_BLUE",
    Gamma = 0x72 => "GAMMA",
    AdjustZoom = 0x7C => "ADJUST_ZOOM",
    HorizontalMirrorFlip = 0x82 => "HORIZONTAL_MIRROR_FLIP",
    VerticalMirrorFlip = 0x84 => "VERTICAL_MIRROR_FLIP",
    DisplayScaling = 0x86 => "DISPLAY_SCALING",
    VelocityScanModulation = 0x88 => "VELOCITY_SCAN_MODULATION",
    ColorSaturation = 0x8A => "COLOR_SATURATION",
    TvChannelUpDown = 0x8B => "TV_CHANNEL_UP_DOWN",
    TvSharpness = 0x8C => "TV_SHARPNESS",
    AudioMute = 0x8D => "AUDIO_MUTE",
    TvContrast = 0x8E => "TV_CONTRAST",
    AudioTreble = 0x8F => "AUDIO_TREBLE",
    Hue = 0x90 => "HUE",
    AudioBass = 0x91 => "AUDIO_BASS",
    TvBlackLevelLuminance = 0x92 => "TV_BLACK_LEVEL_LUMINANCE",
    WindowPositionTlX = 0x95 => "WINDOW_POSITION_TL_X",
    WindowPositionTlY = 0x96 => "WINDOW_POSITION_TL_Y",
    WindowPositionBrX = 0x97 => "WINDOW_POSITION_BR_X",
    WindowPositionBrY = 0x98 => "WINDOW_POSITION_BR_Y",
    WindowBackground = 0x9A => "WINDOW_BACKGROUND",
    RedHue = 0x9B => "RED_HUE",
    YellowHue = 0x9C => "YELLOW_HUE",
    GreenHue = 0x9D => "GREEN_HUE",
    CyanHue = 0x9E => "CYAN_HUE",
    BlueHue = 0x9F => "BLUE_HUE",
    MagentaHue = 0xA0 => "MAGENTA_HUE",
    AutoSetupOnOff = 0xA2 => "AUTO_SETUP_ON_OFF",
    WindowMaskControl = 0xA4 => "WINDOW_MASK_CONTROL",
    WindowSelect = 0xA5 => "WINDOW_SELECT",
    Orientation = 0xAA => "ORIENTATION",
    StoreRestoreSettings = 0xB0 => "STORE_RESTORE_SETTINGS",
    MonitorStatus = 0xB7 => "MONITOR_STATUS",
    PacketCount = 0xB8 => "PACKET_COUNT",
    MonitorXOrigin = 0xB9 => "MONITOR_X_ORIGIN",
    MonitorYOrigin = 0xBA => "MONITOR_Y_ORIGIN",
    HeaderErrorCount = 0xBB => "HEADER_ERROR_COUNT",
    BadCrcErrorCount = 0xBC => "BAD_CRC_ERROR_COUNT",
    ClientId = 0xBD => "CLIENT_ID",
    LinkControl = 0xBE => "LINK_CONTROL",
    OnScreenDisplay = 0xCA => "ON_SCREEN_DISPLAY",
    OsdLanguage = 0xCC => "OSD_LANGUAGE",
    StereoVideoMode = 0xD4 => "STEREO_VIDEO_MODE",
    Dpms = 0xD6 => "DPMS",
    ScanMode = 0xDA => "SCAN_MODE",
    ImageMode = 0xDB => "IMAGE_MODE",
    ColorPresetB = 0xDC => "COLOR_PRESET_B",
    VcpVersion = 0xDF => "VCP_VERSION",
    ColorPresetC = 0xE0 => "COLOR_PRESET_C",
    PowerControl = 0xE1 => "POWER_CONTROL",
    ManufacturerSpecificE2 = 0xE2 => "MANUFACTURER_SPECIFIC_E2",
    ManufacturerSpecificE3 = 0xE3 => "MANUFACTURER_SPECIFIC_E3",
    ManufacturerSpecificE4 = 0xE4 => "MANUFACTURER_SPECIFIC_E4",
    ManufacturerSpecificE5 = 0xE5 => "MANUFACTURER_SPECIFIC_E5",
    ManufacturerSpecificE6 = 0xE6 => "MANUFACTURER_SPECIFIC_E6",
    ManufacturerSpecificE7 = 0xE7 => "MANUFACTURER_SPECIFIC_E7",
    ManufacturerSpecificE8 = 0xE8 => "MANUFACTURER_SPECIFIC_E8",
    ManufacturerSpecificE9 = 0xE9 => "MANUFACTURER_SPECIFIC_E9",
    ManufacturerSpecificEa = 0xEA => "MANUFACTURER_SPECIFIC_EA",
    ManufacturerSpecificEb = 0xEB => "MANUFACTURER_SPECIFIC_EB",
    ManufacturerSpecificEc = 0xEC => "MANUFACTURER_SPECIFIC_EC",
    ManufacturerSpecificEd = 0xED => "MANUFACTURER_SPECIFIC_ED",
    ManufacturerSpecificEe = 0xEE => "MANUFACTURER_SPECIFIC_EE",
    ManufacturerSpecificEf = 0xEF => "MANUFACTURER_SPECIFIC_EF",
    ManufacturerSpecificF1 = 0xF1 => "MANUFACTURER_SPECIFIC_F1",
    ManufacturerSpecificF2 = 0xF2 => "MANUFACTURER_SPECIFIC_F2",
    ManufacturerSpecificF3 = 0xF3 => "MANUFACTURER_SPECIFIC_F3",
    ManufacturerSpecificF4 = 0xF4 => "MANUFACTURER_SPECIFIC_F4",
    ManufacturerSpecificF5 = 0xF5 => "MANUFACTURER_SPECIFIC_F5",
    ManufacturerSpecificF6 = 0xF6 => "MANUFACTURER_SPECIFIC_F6",
    ManufacturerSpecificF7 = 0xF7 => "MANUFACTURER_SPECIFIC_F7",
    ManufacturerSpecificF8 = 0xF8 => "MANUFACTURER_SPECIFIC_F8",
    ManufacturerSpecificF9 = 0xF9 => "MANUFACTURER_SPECIFIC_F9",
    ManufacturerSpecificFa = 0xFA => "MANUFACTURER_SPECIFIC_FA",
    ManufacturerSpecificFb = 0xFB => "MANUFACTURER_SPECIFIC_FB",
    ManufacturerSpecificFc = 0xFC => "MANUFACTURER_SPECIFIC_FC",
    ManufacturerSpecificFd = 0xFD => "MANUFACTURER_SPECIFIC_FD",
    ManufacturerSpecificFe = 0xFE => "MANUFACTURER_SPECIFIC_FE",
    ManufacturerSpecificFf = 0xFF => "MANUFACTURER_SPECIFIC_FF",
}

/// Common shorthands that do not match a canonical name
const ALIASES: &[(&str, ControlId)] = &[
    ("volume", ControlId::AudioSpeakerVolume),
    ("vol", ControlId::AudioSpeakerVolume),
    ("speaker volume", ControlId::AudioSpeakerVolume),
    ("mute", ControlId::AudioMute),
    ("muted", ControlId::AudioMute),
    ("input", ControlId::InputSource),
    ("source", ControlId::InputSource),
    ("power", ControlId::Dpms),
    ("mic", ControlId::AudioMicrophoneVolume),
    ("microphone", ControlId::AudioMicrophoneVolume),
    ("treble", ControlId::AudioTreble),
    ("bass", ControlId::AudioBass),
    ("red", ControlId::RedGain),
    ("green", ControlId::GreenGain),
    ("blue", ControlId::BlueGain),
    ("osd", ControlId::OnScreenDisplay),
    ("sharpness", ControlId::TvSharpness),
    ("saturation", ControlId::ColorSaturation),
    ("factory reset", ControlId::Reset),
    ("reset brightness", ControlId::ResetBrightnessAndContrast),
];

impl ControlId {
    /// Controls exposed by most monitors
    pub const COMMON: &'static [ControlId] = &[
        ControlId::Brightness,
        ControlId::Contrast,
        ControlId::AudioSpeakerVolume,
        ControlId::AudioMute,
        ControlId::Dpms,
        ControlId::InputSource,
        ControlId::RedGain,
        ControlId::GreenGain,
        ControlId::BlueGain,
    ];

    /// Controls that restore factory state when written
    pub const RESETS: &'static [ControlId] = &[
        ControlId::Reset,
        ControlId::ResetBrightnessAndContrast,
        ControlId::ResetGeometry,
        ControlId::ResetColor,
    ];

    /// Protocol code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human readable name ("Audio Speaker Volume")
    pub fn display_name(self) -> String {
        self.name()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Resolve a free-form token to a control.
    ///
    /// Tries, in order: canonical name (case and separator insensitive),
    /// the alias table, a one or two digit hex literal, then the closest
    /// canonical name by edit distance when that match is unique.
    pub fn resolve(token: &str) -> Option<Self> {
        let normalized = normalize(token);
        if normalized.is_empty() {
            return None;
        }

        if let Some(control) = Self::ALL
            .iter()
            .copied()
            .find(|c| normalize(c.name()) == normalized)
        {
            return Some(control);
        }

        if let Some((_, control)) = ALIASES.iter().find(|(alias, _)| *alias == normalized) {
            return Some(*control);
        }

        if let Some(code) = parse_hex_code(token.trim()) {
            return Self::from_code(code);
        }

        fuzzy_match(&normalized)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize(token: &str) -> String {
    token
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_hex_code(token: &str) -> Option<u8> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .or_else(|| token.strip_prefix('x'))
        .or_else(|| token.strip_prefix('X'))
        .unwrap_or(token);

    if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

fn fuzzy_match(normalized: &str) -> Option<ControlId> {
    let threshold = normalized.chars().count() / 3 + 1;

    let mut best: Option<(usize, ControlId)> = None;
    let mut ambiguous = false;
    for control in ControlId::ALL.iter().copied() {
        let distance = edit_distance(normalized, &normalize(control.name()));
        match best {
            Some((best_distance, _)) if distance == best_distance => ambiguous = true,
            Some((best_distance, _)) if distance > best_distance => {}
            _ => {
                best = Some((distance, control));
                ambiguous = false;
            }
        }
    }

    match best {
        Some((distance, control)) if distance <= threshold && !ambiguous => {
            tracing::debug!("Fuzzy matched '{}' to {}", normalized, control);
            Some(control)
        }
        _ => None,
    }
}

/// Levenshtein distance over chars
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
