use serde::Serialize;
use std::net::Ipv4Addr;

use crate::camera::{CameraReport, MemoryFacts};
use crate::network::{AccessPointState, NetworkState, UplinkOutcome};
use crate::outcome::OutcomeStatus;
use crate::storage::{FsUsage, StorageReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    #[serde(flatten)]
    pub outcome: OutcomeStatus,
    #[serde(flatten)]
    pub report: CameraReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UplinkStatus {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    pub joined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Ipv4Addr>,
    pub boot_result: UplinkOutcome,
    pub join_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    #[serde(flatten)]
    pub outcome: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<FsUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStatus {
    pub card: BackendStatus,
    pub flash: BackendStatus,
}

impl From<&StorageReport> for StorageStatus {
    fn from(report: &StorageReport) -> Self {
        Self {
            card: BackendStatus {
                outcome: report.card.status(),
                usage: report.card.value().copied(),
            },
            flash: BackendStatus {
                outcome: report.flash.status(),
                usage: report.flash.value().copied(),
            },
        }
    }
}

/// Structured status of the whole bring-up, kept current by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootReport {
    pub firmware: String,
    pub board: &'static str,
    pub memory: MemoryFacts,
    pub camera: CameraStatus,
    pub access_point: AccessPointState,
    pub uplink: UplinkStatus,
    pub storage: StorageStatus,
}

impl BootReport {
    pub fn uplink_status(state: &NetworkState, boot_result: UplinkOutcome) -> UplinkStatus {
        UplinkStatus {
            configured: state.uplink_configured(),
            ssid: state.uplink.as_ref().map(|c| c.ssid.clone()),
            joined: state.uplink_joined,
            address: state.uplink_address,
            boot_result,
            join_attempts: state.join_attempts,
        }
    }

    /// Bring the uplink section in line with the live network state.
    pub fn refresh_uplink(&mut self, state: &NetworkState) {
        self.uplink = Self::uplink_status(state, self.uplink.boot_result.clone());
        self.access_point = state.ap.clone();
    }

    /// One-line uplink description for the landing page.
    pub fn uplink_label(&self) -> String {
        match (&self.uplink.ssid, self.uplink.address) {
            (None, _) => "not configured".to_string(),
            (Some(ssid), Some(ip)) if self.uplink.joined => format!("{} ({})", ip, ssid),
            (Some(ssid), _) => format!("not connected ({})", ssid),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
    }

    /// Human-readable summary for the serial console.
    pub fn log_summary(&self) {
        log::info!("=== Bring-up summary ({}) ===", self.firmware);
        log::info!("Board: {}", self.board);
        match &self.camera.outcome.reason {
            Some(reason) => log::info!("Camera: {:?} ({})", self.camera.outcome.state, reason),
            None => log::info!("Camera: {:?}", self.camera.outcome.state),
        }
        log::info!(
            "Access point: '{}' at {} (captive DNS: {})",
            self.access_point.ssid,
            self.access_point.address,
            if self.access_point.captive_dns { "on" } else { "off" }
        );
        match (&self.uplink.ssid, self.uplink.address) {
            (None, _) => log::info!("Uplink: not configured"),
            (Some(ssid), Some(ip)) => log::info!("Uplink: joined '{}' as {}", ssid, ip),
            (Some(ssid), None) => {
                log::info!("Uplink: '{}' {:?}", ssid, self.uplink.boot_result)
            }
        }
        for (name, backend) in [("SD card", &self.storage.card), ("Flash FS", &self.storage.flash)] {
            match backend.usage {
                Some(usage) => log::info!(
                    "{}: {:?}, {}/{} KB used",
                    name,
                    backend.outcome.state,
                    usage.used_bytes / 1024,
                    usage.total_bytes / 1024
                ),
                None => log::info!("{}: {:?}", name, backend.outcome.state),
            }
        }
    }
}
