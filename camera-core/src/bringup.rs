/// Boot orchestration: camera, then network, then storage, strictly in that
/// order. Each stage's failure is folded into the report; only the access
/// point can abort the boot.
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;

use crate::camera::{self, MemoryFacts, SensorDriver};
use crate::clock::Clock;
use crate::network::{self, FatalBringup, NameService, NetworkPlan, NetworkState, Radio};
use crate::profile::HardwareProfile;
use crate::status::{BootReport, CameraStatus, StorageStatus};
use crate::storage::{self, Filesystem};

pub struct BootPlan {
    pub firmware: String,
    pub profile: HardwareProfile,
    pub memory: MemoryFacts,
    pub network: NetworkPlan,
}

/// The driver-side capabilities bring-up runs against.
pub struct Subsystems<S, R, Card, Flash> {
    pub sensor: S,
    pub radio: R,
    pub card: Card,
    pub flash: Flash,
}

pub struct Booted<H, N> {
    pub sensor: Option<H>,
    pub network: NetworkState,
    pub name_service: Option<N>,
    pub report: BootReport,
}

/// Network facts handed to the frame server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointFacts {
    pub ap_ssid: String,
    pub ap_address: Ipv4Addr,
    pub uplink_address: Option<Ipv4Addr>,
}

impl From<&NetworkState> for EndpointFacts {
    fn from(state: &NetworkState) -> Self {
        Self {
            ap_ssid: state.ap.ssid.clone(),
            ap_address: state.ap.address,
            uplink_address: state.uplink_address,
        }
    }
}

pub struct Handoff<H> {
    pub sensor: Option<H>,
    pub endpoints: EndpointFacts,
}

/// Consumer of the live sensor handle once bring-up is over. It owns frame
/// capture cadence and delivery.
pub trait FrameServer<H> {
    type Error: fmt::Display;

    fn start(&mut self, handoff: Handoff<H>) -> Result<(), Self::Error>;
}

impl<H, N> Booted<H, N> {
    /// Move the sensor handle out for the frame server.
    pub fn handoff(&mut self) -> Handoff<H> {
        Handoff {
            sensor: self.sensor.take(),
            endpoints: EndpointFacts::from(&self.network),
        }
    }
}

pub fn orchestrate<S, R, Card, Flash, N, C>(
    plan: &BootPlan,
    subsystems: &mut Subsystems<S, R, Card, Flash>,
    bind_dns: impl FnOnce(Ipv4Addr) -> io::Result<N>,
    clock: &C,
    cancel: &AtomicBool,
) -> Result<Booted<S::Handle, N>, FatalBringup>
where
    S: SensorDriver,
    R: Radio,
    Card: Filesystem,
    Flash: Filesystem,
    N: NameService,
    C: Clock + ?Sized,
{
    log::info!("Bring-up 1/3: camera");
    let camera = camera::bring_up(&mut subsystems.sensor, &plan.profile, &plan.memory, clock);
    let (sensor, camera_outcome) = camera.outcome.into_parts();

    log::info!("Bring-up 2/3: network");
    let network = network::bring_up(&mut subsystems.radio, &plan.network, bind_dns, clock, cancel)?;

    log::info!("Bring-up 3/3: storage");
    let storage = storage::bring_up(&mut subsystems.card, &mut subsystems.flash);

    let report = BootReport {
        firmware: plan.firmware.clone(),
        board: plan.profile.board.selector(),
        memory: plan.memory,
        camera: CameraStatus {
            outcome: camera_outcome,
            report: camera.report,
        },
        access_point: network.state.ap.clone(),
        uplink: BootReport::uplink_status(&network.state, network.uplink),
        storage: StorageStatus::from(&storage),
    };

    Ok(Booted {
        sensor,
        network: network.state,
        name_service: network.name_service,
        report,
    })
}
