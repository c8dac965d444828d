/// Board profiles: camera pin routing and storage wiring per supported module.
/// Exactly one profile is active per firmware build; the selector comes from
/// a cargo feature and is validated by the firmware's build script.
use serde::Serialize;
use std::fmt;

/// GPIO number meaning "not connected" for the optional power-down/reset lines.
pub const UNUSED_PIN: i8 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChipFamily {
    Esp32,
    Esp32S3,
}

/// Camera connector routing. `data` holds D0..D7 (Y2..Y9 on most schematics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraPins {
    pub pwdn: i8,
    pub reset: i8,
    pub xclk: i8,
    pub sccb_sda: i8,
    pub sccb_scl: i8,
    pub data: [i8; 8],
    pub vsync: i8,
    pub href: i8,
    pub pclk: i8,
}

impl CameraPins {
    /// Pins the sensor cannot work without, labelled for diagnostics.
    pub fn required(&self) -> [(&'static str, i8); 14] {
        let d = self.data;
        [
            ("xclk", self.xclk),
            ("sccb_sda", self.sccb_sda),
            ("sccb_scl", self.sccb_scl),
            ("d0", d[0]),
            ("d1", d[1]),
            ("d2", d[2]),
            ("d3", d[3]),
            ("d4", d[4]),
            ("d5", d[5]),
            ("d6", d[6]),
            ("d7", d[7]),
            ("vsync", self.vsync),
            ("href", self.href),
            ("pclk", self.pclk),
        ]
    }

    /// Lines that may be left at [`UNUSED_PIN`].
    pub fn optional(&self) -> [(&'static str, i8); 2] {
        [("pwdn", self.pwdn), ("reset", self.reset)]
    }
}

/// How the removable card slot is wired to the SD/MMC host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SdCardWiring {
    /// No SD/MMC slot on this board.
    NotFitted,
    /// Slot uses the controller's default IO_MUX pins.
    DefaultSlot,
    /// 1-bit bus routed through the GPIO matrix.
    Pins { clk: i8, cmd: i8, d0: i8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HardwareProfile {
    pub board: BoardProfile,
    pub chip: ChipFamily,
    pub pins: CameraPins,
    pub sd_card: SdCardWiring,
}

/// Closed set of supported camera boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BoardProfile {
    WroverKit,
    Esp32s3Eye,
    Esp32s3CamLcd,
    M5stackCamS3Unit,
    XiaoEsp32s3,
    DfrobotFirebeetle2Esp32s3,
}

/// Cargo feature name and selector for every accepted board option,
/// including aliases.
pub const BOARD_FEATURES: [(&str, &str); 7] = [
    ("board-wrover-kit", "WROVER_KIT"),
    ("board-esp32s3-eye", "ESP32S3_EYE"),
    ("board-esp32s3-cam-lcd", "ESP32S3_CAM_LCD"),
    ("board-m5stack-cams3-unit", "M5STACK_CAMS3_UNIT"),
    ("board-xiao-esp32s3", "XIAO_ESP32S3"),
    ("board-dfrobot-firebeetle2-esp32s3", "DFRobot_FireBeetle2_ESP32S3"),
    ("board-dfrobot-romeo-esp32s3", "DFRobot_Romeo_ESP32S3"),
];

impl BoardProfile {
    pub const ALL: [BoardProfile; 6] = [
        BoardProfile::WroverKit,
        BoardProfile::Esp32s3Eye,
        BoardProfile::Esp32s3CamLcd,
        BoardProfile::M5stackCamS3Unit,
        BoardProfile::XiaoEsp32s3,
        BoardProfile::DfrobotFirebeetle2Esp32s3,
    ];

    pub fn selector(&self) -> &'static str {
        match self {
            BoardProfile::WroverKit => "WROVER_KIT",
            BoardProfile::Esp32s3Eye => "ESP32S3_EYE",
            BoardProfile::Esp32s3CamLcd => "ESP32S3_CAM_LCD",
            BoardProfile::M5stackCamS3Unit => "M5STACK_CAMS3_UNIT",
            BoardProfile::XiaoEsp32s3 => "XIAO_ESP32S3",
            BoardProfile::DfrobotFirebeetle2Esp32s3 => "DFRobot_FireBeetle2_ESP32S3",
        }
    }

    pub fn from_selector(selector: &str) -> Result<Self, ProfileError> {
        match selector {
            "WROVER_KIT" => Ok(BoardProfile::WroverKit),
            "ESP32S3_EYE" => Ok(BoardProfile::Esp32s3Eye),
            "ESP32S3_CAM_LCD" => Ok(BoardProfile::Esp32s3CamLcd),
            "M5STACK_CAMS3_UNIT" => Ok(BoardProfile::M5stackCamS3Unit),
            "XIAO_ESP32S3" => Ok(BoardProfile::XiaoEsp32s3),
            // The Romeo carries the FireBeetle 2 camera connector unchanged
            "DFRobot_FireBeetle2_ESP32S3" | "DFRobot_Romeo_ESP32S3" => {
                Ok(BoardProfile::DfrobotFirebeetle2Esp32s3)
            }
            other => Err(ProfileError::Unknown(other.to_string())),
        }
    }

    /// Resolve exactly one selector into its profile.
    pub fn resolve<S: AsRef<str>>(selected: &[S]) -> Result<HardwareProfile, ProfileError> {
        match selected {
            [] => Err(ProfileError::Missing),
            [one] => Ok(Self::from_selector(one.as_ref())?.profile()),
            many => Err(ProfileError::Ambiguous(
                many.iter().map(|s| s.as_ref().to_string()).collect(),
            )),
        }
    }

    pub fn profile(&self) -> HardwareProfile {
        let (chip, pins, sd_card) = match self {
            // Freenove FNK0060 extension board
            BoardProfile::WroverKit => (
                ChipFamily::Esp32,
                CameraPins {
                    pwdn: UNUSED_PIN,
                    reset: UNUSED_PIN,
                    xclk: 21,
                    sccb_sda: 26,
                    sccb_scl: 27,
                    data: [4, 5, 18, 19, 36, 39, 34, 35],
                    vsync: 25,
                    href: 23,
                    pclk: 22,
                },
                SdCardWiring::DefaultSlot,
            ),
            // Freenove ESP32-S3 CAM shares this pinout
            BoardProfile::Esp32s3Eye => (
                ChipFamily::Esp32S3,
                CameraPins {
                    pwdn: UNUSED_PIN,
                    reset: UNUSED_PIN,
                    xclk: 15,
                    sccb_sda: 4,
                    sccb_scl: 5,
                    data: [11, 9, 8, 10, 12, 18, 17, 16],
                    vsync: 6,
                    href: 7,
                    pclk: 13,
                },
                SdCardWiring::Pins {
                    clk: 39,
                    cmd: 38,
                    d0: 40,
                },
            ),
            BoardProfile::Esp32s3CamLcd => (
                ChipFamily::Esp32S3,
                CameraPins {
                    pwdn: UNUSED_PIN,
                    reset: UNUSED_PIN,
                    xclk: 40,
                    sccb_sda: 17,
                    sccb_scl: 18,
                    data: [13, 47, 14, 3, 12, 42, 41, 39],
                    vsync: 21,
                    href: 38,
                    pclk: 11,
                },
                SdCardWiring::NotFitted,
            ),
            BoardProfile::M5stackCamS3Unit => (
                ChipFamily::Esp32S3,
                CameraPins {
                    pwdn: UNUSED_PIN,
                    reset: 21,
                    xclk: 11,
                    sccb_sda: 17,
                    sccb_scl: 41,
                    data: [6, 15, 16, 7, 5, 10, 4, 13],
                    vsync: 42,
                    href: 18,
                    pclk: 12,
                },
                SdCardWiring::NotFitted,
            ),
            BoardProfile::XiaoEsp32s3 => (
                ChipFamily::Esp32S3,
                CameraPins {
                    pwdn: UNUSED_PIN,
                    reset: UNUSED_PIN,
                    xclk: 10,
                    sccb_sda: 40,
                    sccb_scl: 39,
                    data: [15, 17, 18, 16, 14, 12, 11, 48],
                    vsync: 38,
                    href: 47,
                    pclk: 13,
                },
                SdCardWiring::NotFitted,
            ),
            BoardProfile::DfrobotFirebeetle2Esp32s3 => (
                ChipFamily::Esp32S3,
                CameraPins {
                    pwdn: UNUSED_PIN,
                    reset: UNUSED_PIN,
                    xclk: 45,
                    sccb_sda: 1,
                    sccb_scl: 2,
                    data: [39, 40, 41, 4, 7, 8, 46, 48],
                    vsync: 6,
                    href: 42,
                    pclk: 5,
                },
                SdCardWiring::NotFitted,
            ),
        };

        HardwareProfile {
            board: *self,
            chip,
            pins,
            sd_card,
        }
    }
}

impl fmt::Display for BoardProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

impl HardwareProfile {
    pub fn log_pins(&self) {
        log::info!("Camera profile: {} ({:?})", self.board, self.chip);
        for (name, pin) in self.pins.required() {
            log::info!("  {:>8}: GPIO{}", name, pin);
        }
        for (name, pin) in self.pins.optional() {
            if pin == UNUSED_PIN {
                log::info!("  {:>8}: unused", name);
            } else {
                log::info!("  {:>8}: GPIO{}", name, pin);
            }
        }
        log::info!("  SD card: {:?}", self.sd_card);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    Missing,
    Ambiguous(Vec<String>),
    Unknown(String),
}

fn valid_selectors() -> String {
    BOARD_FEATURES
        .iter()
        .map(|(feature, selector)| format!("{} ({})", feature, selector))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::Missing => write!(
                f,
                "no camera board selected; enable exactly one of: {}",
                valid_selectors()
            ),
            ProfileError::Ambiguous(selected) => write!(
                f,
                "more than one camera board selected ({}); enable exactly one of: {}",
                selected.join(", "),
                valid_selectors()
            ),
            ProfileError::Unknown(selector) => write!(
                f,
                "unknown camera board '{}'; valid boards: {}",
                selector,
                valid_selectors()
            ),
        }
    }
}

impl std::error::Error for ProfileError {}
