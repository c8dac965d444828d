//! Camera Core - Hardware-independent bring-up logic for the ESP32 camera portal
//!
//! This crate contains the orchestration that brings the camera, radio and
//! storage subsystems up and keeps the uplink alive. Every vendor driver is
//! reached through a trait, so the whole sequence can be tested on the host
//! platform without ESP32 hardware.

pub mod bringup;
pub mod camera;
pub mod clock;
pub mod dns;
pub mod network;
pub mod outcome;
pub mod profile;
pub mod retry;
pub mod status;
pub mod storage;
pub mod supervisor;

pub use bringup::{orchestrate, BootPlan, Booted, EndpointFacts, FrameServer, Handoff, Subsystems};
pub use outcome::{BringupOutcome, OutcomeState, OutcomeStatus};
pub use profile::{BoardProfile, HardwareProfile, ProfileError};
