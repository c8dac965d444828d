/// Camera bring-up: session planning from memory facts, clock-speed fallback
/// and post-init calibration. The sensor driver itself sits behind
/// [`SensorDriver`].
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::clock::Clock;
use crate::outcome::BringupOutcome;
use crate::profile::{CameraPins, HardwareProfile};
use crate::retry::RetryBudget;

/// Bus clock frequencies tried in order: the conservative default first,
/// then the sensor's nominal clock, then a value in between.
pub const XCLK_FALLBACK_HZ: [u32; 3] = [10_000_000, 20_000_000, 16_000_000];

/// Pause after a failed init so the sensor rails settle before the next try.
pub const POWER_SETTLE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameSize {
    Qvga,
    Cif,
    Vga,
    Svga,
    Xga,
    Uxga,
}

impl FrameSize {
    pub fn dimensions(&self) -> (u16, u16) {
        match self {
            FrameSize::Qvga => (320, 240),
            FrameSize::Cif => (400, 296),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Uxga => (1600, 1200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferLocation {
    /// External PSRAM pool.
    Psram,
    /// Internal DRAM.
    Dram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionPolicy {
    /// Drop stale frames so the consumer always gets the newest one.
    Latest,
    /// Block the capture path until a buffer is returned.
    WhenEmpty,
}

/// Memory facts sampled once at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryFacts {
    pub psram_present: bool,
    pub psram_total: usize,
    pub psram_free: usize,
    pub internal_free: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraSessionConfig {
    #[serde(skip)]
    pub pins: CameraPins,
    pub xclk_hz: u32,
    pub frame_size: FrameSize,
    pub fb_count: u8,
    pub fb_location: BufferLocation,
    pub jpeg_quality: u8,
    pub grab_policy: AcquisitionPolicy,
}

impl CameraSessionConfig {
    /// Initial session for this board and memory layout.
    pub fn plan(profile: &HardwareProfile, memory: &MemoryFacts) -> Self {
        if memory.psram_present {
            Self {
                pins: profile.pins,
                xclk_hz: XCLK_FALLBACK_HZ[0],
                frame_size: FrameSize::Svga,
                fb_count: 2,
                fb_location: BufferLocation::Psram,
                jpeg_quality: 10,
                grab_policy: AcquisitionPolicy::Latest,
            }
        } else {
            Self {
                pins: profile.pins,
                xclk_hz: XCLK_FALLBACK_HZ[0],
                frame_size: FrameSize::Vga,
                fb_count: 1,
                fb_location: BufferLocation::Dram,
                jpeg_quality: 12,
                grab_policy: AcquisitionPolicy::WhenEmpty,
            }
        }
    }

    pub fn with_xclk(self, xclk_hz: u32) -> Self {
        Self { xclk_hz, ..self }
    }
}

/// Raw driver error code (`esp_err_t` on target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorError {
    pub code: i32,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor error 0x{:x}", self.code)
    }
}

impl std::error::Error for SensorError {}

/// Image tuning knobs exposed by a live sensor.
pub trait SensorControls {
    fn set_vflip(&mut self, enabled: bool) -> Result<(), SensorError>;
    fn set_hmirror(&mut self, enabled: bool) -> Result<(), SensorError>;
    fn set_brightness(&mut self, level: i8) -> Result<(), SensorError>;
    fn set_saturation(&mut self, level: i8) -> Result<(), SensorError>;
}

/// The image sensor capability.
pub trait SensorDriver {
    type Handle;

    fn init(&mut self, config: &CameraSessionConfig) -> Result<Self::Handle, SensorError>;
    fn deinit(&mut self);
    fn controls(&mut self) -> Option<&mut dyn SensorControls>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Calibration {
    pub vflip: bool,
    pub hmirror: bool,
    pub brightness: i8,
    pub saturation: i8,
}

pub const CALIBRATION: Calibration = Calibration {
    vflip: false,
    hmirror: false,
    brightness: 1,
    saturation: -1,
};

impl Calibration {
    pub fn apply(&self, controls: &mut dyn SensorControls) -> Result<(), SensorError> {
        controls.set_vflip(self.vflip)?;
        controls.set_hmirror(self.hmirror)?;
        controls.set_brightness(self.brightness)?;
        controls.set_saturation(self.saturation)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub number: u32,
    pub xclk_hz: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
}

/// Everything the status sink needs to know about camera bring-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraReport {
    pub attempts: Vec<AttemptRecord>,
    /// Session that ended up live, if any.
    pub session: Option<CameraSessionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<i32>,
}

pub struct CameraBringup<H> {
    pub outcome: BringupOutcome<H>,
    pub report: CameraReport,
}

pub fn xclk_budget() -> RetryBudget<u32> {
    RetryBudget::new(
        XCLK_FALLBACK_HZ[0],
        XCLK_FALLBACK_HZ[1..].iter().copied(),
        POWER_SETTLE_DELAY,
    )
}

/// Bring the sensor online. Never fails the boot: exhausting the clock list
/// yields `Unavailable` with the last driver error.
pub fn bring_up<D, C>(
    driver: &mut D,
    profile: &HardwareProfile,
    memory: &MemoryFacts,
    clock: &C,
) -> CameraBringup<D::Handle>
where
    D: SensorDriver,
    C: Clock + ?Sized,
{
    let base = CameraSessionConfig::plan(profile, memory);
    log::info!(
        "Camera session: {:?} x{} in {:?}, quality {}, grab {:?}",
        base.frame_size,
        base.fb_count,
        base.fb_location,
        base.jpeg_quality,
        base.grab_policy
    );

    let budget = xclk_budget();
    let mut attempts = Vec::with_capacity(budget.attempts() as usize);
    // The driver is needed by both the attempt and the cleanup closure.
    let driver_cell = std::cell::RefCell::new(driver);

    let result = budget.run(
        clock,
        |attempt| {
            let config = base.with_xclk(*attempt.param);
            log::info!(
                "Camera init attempt {}/{} at {} MHz",
                attempt.number,
                attempt.total,
                config.xclk_hz / 1_000_000
            );
            driver_cell.borrow_mut().init(&config)
        },
        |attempt, err| {
            log::warn!(
                "Camera init attempt {}/{} failed: {}",
                attempt.number,
                attempt.total,
                err
            );
            attempts.push(AttemptRecord {
                number: attempt.number,
                xclk_hz: *attempt.param,
                error_code: Some(err.code),
            });
            driver_cell.borrow_mut().deinit();
        },
    );

    let driver = driver_cell.into_inner();

    match result {
        Ok((handle, number)) => {
            let session = base.with_xclk(XCLK_FALLBACK_HZ[number as usize - 1]);
            attempts.push(AttemptRecord {
                number,
                xclk_hz: session.xclk_hz,
                error_code: None,
            });
            log::info!(
                "Camera ready on attempt {} at {} MHz",
                number,
                session.xclk_hz / 1_000_000
            );

            let outcome = match driver.controls() {
                Some(controls) => match CALIBRATION.apply(controls) {
                    Ok(()) => BringupOutcome::Ready(handle),
                    Err(e) => {
                        log::warn!("Camera calibration failed: {}", e);
                        BringupOutcome::degraded(handle, format!("calibration failed: {}", e))
                    }
                },
                None => {
                    log::warn!("Camera controls unavailable, calibration skipped");
                    BringupOutcome::degraded(handle, "sensor controls unavailable")
                }
            };

            CameraBringup {
                outcome,
                report: CameraReport {
                    attempts,
                    session: Some(session),
                    last_error: None,
                },
            }
        }
        Err(exhausted) => {
            let code = exhausted.last_error.code;
            log::error!(
                "Camera unavailable after {} attempts (last error 0x{:x})",
                exhausted.attempts,
                code
            );
            CameraBringup {
                outcome: BringupOutcome::unavailable(format!(
                    "sensor init failed after {} attempts (last error 0x{:x})",
                    exhausted.attempts, code
                )),
                report: CameraReport {
                    attempts,
                    session: None,
                    last_error: Some(code),
                },
            }
        }
    }
}
