/// Network bring-up: the always-on access point with its captive resolver,
/// and the optional best-effort uplink join.
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::clock::{Clock, Deadline};

/// Well-known access point address; the captive portal entry point.
pub const AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
pub const AP_SSID_PREFIX: &str = "ESP32-CAM-";
pub const DEFAULT_AP_PASSWORD: &str = "camportal";
pub const AP_CHANNEL: u8 = 1;
pub const AP_MAX_CONNECTIONS: u16 = 4;

/// Placeholder left in the credential slots when no uplink was configured.
pub const CREDENTIAL_SENTINEL: &str = "********";

pub const JOIN_TIMEOUT: Duration = Duration::from_secs(15);
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// SSID built from the last two bytes of the MAC, so boards on the same
/// bench are told apart.
pub fn derive_ap_ssid(mac: &[u8; 6]) -> String {
    format!("{}{:02X}{:02X}", AP_SSID_PREFIX, mac[4], mac[5])
}

/// WPA2 needs 8..=63 ASCII bytes; anything else falls back to
/// the default.
pub fn resolve_ap_password(candidate: &str) -> &str {
    let len = candidate.len();
    if candidate.is_ascii() && (8..=63).contains(&len) {
        candidate
    } else {
        if !candidate.is_empty() {
            log::warn!(
                "AP password must be 8-63 ASCII characters (got {} bytes), using default",
                len
            );
        }
        DEFAULT_AP_PASSWORD
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct UplinkCredentials {
    pub ssid: String,
    pub password: String,
}

impl UplinkCredentials {
    /// `None` when the slots are empty or still hold the sentinel.
    pub fn from_config(ssid: &str, password: &str) -> Option<Self> {
        if ssid.is_empty() || ssid == CREDENTIAL_SENTINEL || password == CREDENTIAL_SENTINEL {
            return None;
        }
        Some(Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for UplinkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UplinkCredentials")
            .field("ssid", &self.ssid)
            .field(
                "password",
                &if self.password.is_empty() { "<empty>" } else { "<set>" },
            )
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub password: String,
    pub address: Ipv4Addr,
    pub channel: u8,
    pub max_connections: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessPointState {
    pub ssid: String,
    pub address: Ipv4Addr,
    pub captive_dns: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UplinkOutcome {
    NotConfigured,
    Joined { address: Option<Ipv4Addr> },
    TimedOut,
    Cancelled,
    Failed { reason: String },
}

/// The dual-mode radio.
pub trait Radio {
    type Error: fmt::Display;

    /// Bring the access point up; returns the address it is serving on.
    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<Ipv4Addr, Self::Error>;
    /// Start joining the uplink without waiting for the outcome.
    fn begin_join(&mut self, credentials: &UplinkCredentials) -> Result<(), Self::Error>;
    fn is_joined(&mut self) -> bool;
    fn uplink_address(&self) -> Option<Ipv4Addr>;
}

/// Pending-request driven name resolver.
pub trait NameService {
    /// Answer at most one queued request; `Ok(false)` when none was waiting.
    fn service_one(&mut self) -> io::Result<bool>;
}

/// Process-wide network facts. Written by bring-up and the supervisor only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkState {
    pub ap: AccessPointState,
    pub uplink: Option<UplinkCredentials>,
    pub uplink_joined: bool,
    pub uplink_address: Option<Ipv4Addr>,
    /// Clock time at which the most recent join attempt started.
    pub last_join_attempt: Option<Duration>,
    pub join_attempts: u32,
}

impl NetworkState {
    pub fn uplink_configured(&self) -> bool {
        self.uplink.is_some()
    }
}

/// The one unrecoverable bring-up failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalBringup {
    pub subsystem: &'static str,
    pub reason: String,
}

impl fmt::Display for FatalBringup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed to start: {}", self.subsystem, self.reason)
    }
}

impl std::error::Error for FatalBringup {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
    pub mac: [u8; 6],
    pub ap_password: String,
    pub uplink: Option<UplinkCredentials>,
}

pub struct NetworkBringup<N> {
    pub state: NetworkState,
    pub uplink: UplinkOutcome,
    pub name_service: Option<N>,
}

/// Cooperative join wait with an explicit deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinWait {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for JoinWait {
    fn default() -> Self {
        Self {
            timeout: JOIN_TIMEOUT,
            poll: JOIN_POLL_INTERVAL,
        }
    }
}

impl JoinWait {
    pub fn wait<R, C>(&self, radio: &mut R, clock: &C, cancel: &AtomicBool) -> UplinkOutcome
    where
        R: Radio + ?Sized,
        C: Clock + ?Sized,
    {
        let deadline = Deadline::after(clock, self.timeout);
        loop {
            if radio.is_joined() {
                return UplinkOutcome::Joined {
                    address: radio.uplink_address(),
                };
            }
            if cancel.load(Ordering::Relaxed) {
                return UplinkOutcome::Cancelled;
            }
            if deadline.expired(clock) {
                return UplinkOutcome::TimedOut;
            }
            clock.sleep(self.poll.min(deadline.remaining(clock)));
        }
    }
}

/// Bring up the access point, its captive resolver and the optional uplink.
///
/// Must be called once per boot. Failing to start the access point is fatal;
/// a resolver that cannot bind leaves the AP up without captive redirects.
pub fn bring_up<R, N, C>(
    radio: &mut R,
    plan: &NetworkPlan,
    bind_dns: impl FnOnce(Ipv4Addr) -> io::Result<N>,
    clock: &C,
    cancel: &AtomicBool,
) -> Result<NetworkBringup<N>, FatalBringup>
where
    R: Radio + ?Sized,
    N: NameService,
    C: Clock + ?Sized,
{
    let ap_config = AccessPointConfig {
        ssid: derive_ap_ssid(&plan.mac),
        password: resolve_ap_password(&plan.ap_password).to_string(),
        address: AP_ADDRESS,
        channel: AP_CHANNEL,
        max_connections: AP_MAX_CONNECTIONS,
    };

    let address = radio
        .start_access_point(&ap_config)
        .map_err(|e| FatalBringup {
            subsystem: "access point",
            reason: e.to_string(),
        })?;
    if address != AP_ADDRESS {
        log::warn!("Access point came up at {} instead of {}", address, AP_ADDRESS);
    }
    log::info!("Access point '{}' up at {}", ap_config.ssid, address);

    let name_service = match bind_dns(address) {
        Ok(dns) => {
            log::info!("Captive DNS answering every query with {}", address);
            Some(dns)
        }
        Err(e) => {
            log::error!("Captive DNS failed to bind: {}", e);
            None
        }
    };

    let mut state = NetworkState {
        ap: AccessPointState {
            ssid: ap_config.ssid,
            address,
            captive_dns: name_service.is_some(),
        },
        uplink: plan.uplink.clone(),
        uplink_joined: false,
        uplink_address: None,
        last_join_attempt: None,
        join_attempts: 0,
    };

    let uplink = match &plan.uplink {
        None => {
            log::info!("No uplink configured, running access point only");
            UplinkOutcome::NotConfigured
        }
        Some(credentials) => {
            log::info!("Joining uplink '{}'...", credentials.ssid);
            state.last_join_attempt = Some(clock.now());
            state.join_attempts = 1;
            match radio.begin_join(credentials) {
                Ok(()) => JoinWait::default().wait(radio, clock, cancel),
                Err(e) => UplinkOutcome::Failed {
                    reason: e.to_string(),
                },
            }
        }
    };

    match &uplink {
        UplinkOutcome::Joined { address } => {
            state.uplink_joined = true;
            state.uplink_address = *address;
            match address {
                Some(ip) => log::info!("Uplink joined, address {}", ip),
                None => log::info!("Uplink joined"),
            }
        }
        UplinkOutcome::TimedOut => {
            log::warn!("Uplink join timed out after {}s", JOIN_TIMEOUT.as_secs());
        }
        UplinkOutcome::Cancelled => log::warn!("Uplink join cancelled"),
        UplinkOutcome::Failed { reason } => log::warn!("Uplink join failed: {}", reason),
        UplinkOutcome::NotConfigured => {}
    }

    Ok(NetworkBringup {
        state,
        uplink,
        name_service,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    /// Radio whose uplink comes up after a scripted number of polls.
    #[derive(Default)]
    pub(crate) struct FakeRadio {
        pub ap_fails: bool,
        pub ap_started: Option<AccessPointConfig>,
        /// `None` = the uplink never answers.
        pub joined_after_polls: Option<u32>,
        pub polls: u32,
        pub join_requests: u32,
        pub join_rejected: bool,
        pub joined: bool,
    }

    impl Radio for FakeRadio {
        type Error = String;

        fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<Ipv4Addr, String> {
            if self.ap_fails {
                return Err("radio init 0x3001".to_string());
            }
            self.ap_started = Some(config.clone());
            Ok(config.address)
        }

        fn begin_join(&mut self, _credentials: &UplinkCredentials) -> Result<(), String> {
            self.join_requests += 1;
            self.polls = 0;
            if self.join_rejected {
                return Err("sta connect 0x3007".to_string());
            }
            Ok(())
        }

        fn is_joined(&mut self) -> bool {
            if self.join_requests > 0 {
                if let Some(after) = self.joined_after_polls {
                    if self.polls >= after {
                        self.joined = true;
                    }
                }
            }
            self.polls += 1;
            self.joined
        }

        fn uplink_address(&self) -> Option<Ipv4Addr> {
            self.joined.then(|| Ipv4Addr::new(10, 0, 0, 42))
        }
    }

    #[derive(Default)]
    pub(crate) struct NullDns {
        pub pending: u32,
        pub served: u32,
    }

    impl NameService for NullDns {
        fn service_one(&mut self) -> io::Result<bool> {
            if self.pending > 0 {
                self.pending -= 1;
                self.served += 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    fn plan(uplink: Option<UplinkCredentials>) -> NetworkPlan {
        NetworkPlan {
            mac: [0x24, 0x6f, 0x28, 0x01, 0xab, 0x3c],
            ap_password: String::new(),
            uplink,
        }
    }

    fn creds() -> Option<UplinkCredentials> {
        UplinkCredentials::from_config("workshop", "hunter22")
    }

    #[test]
    fn test_ssid_uses_last_two_mac_bytes() {
        assert_eq!(
            derive_ap_ssid(&[0x24, 0x6f, 0x28, 0x01, 0xab, 0x3c]),
            "ESP32-CAM-AB3C"
        );
    }

    proptest! {
        #[test]
        fn prop_ssid_is_pure_function_of_suffix(mac in any::<[u8; 6]>(), head in any::<[u8; 4]>()) {
            let first = derive_ap_ssid(&mac);
            prop_assert_eq!(&first, &derive_ap_ssid(&mac));

            let mut other = mac;
            other[..4].copy_from_slice(&head);
            prop_assert_eq!(&first, &derive_ap_ssid(&other));
        }
    }

    #[test]
    fn test_sentinel_means_not_configured() {
        assert!(UplinkCredentials::from_config(CREDENTIAL_SENTINEL, CREDENTIAL_SENTINEL).is_none());
        assert!(UplinkCredentials::from_config("", "pw").is_none());
        assert!(UplinkCredentials::from_config("lab", CREDENTIAL_SENTINEL).is_none());
        // Open networks are allowed
        assert!(UplinkCredentials::from_config("cafe", "").is_some());
    }

    #[test]
    fn test_ap_password_validation() {
        assert_eq!(resolve_ap_password("short"), DEFAULT_AP_PASSWORD);
        assert_eq!(resolve_ap_password(""), DEFAULT_AP_PASSWORD);
        assert_eq!(resolve_ap_password("longenough"), "longenough");
        assert_eq!(resolve_ap_password(&"x".repeat(64)), DEFAULT_AP_PASSWORD);
        assert_eq!(resolve_ap_password(&"x".repeat(63)), "x".repeat(63));
    }

    #[test]
    fn test_multibyte_ap_password_falls_back() {
        // 40 characters but 80 bytes
        let wide = "é".repeat(40);
        assert_eq!(resolve_ap_password(&wide), DEFAULT_AP_PASSWORD);
        assert_eq!(resolve_ap_password("pässwörd"), DEFAULT_AP_PASSWORD);
        assert!(resolve_ap_password(&wide).len() <= 63);
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", creds().unwrap());
        assert!(!rendered.contains("hunter22"));
    }

    #[test]
    fn test_unconfigured_uplink_returns_without_waiting() {
        let clock = ManualClock::new();
        let mut radio = FakeRadio::default();
        let cancel = AtomicBool::new(false);

        let up = bring_up(&mut radio, &plan(None), |_| Ok(NullDns::default()), &clock, &cancel)
            .unwrap();

        assert_eq!(up.uplink, UplinkOutcome::NotConfigured);
        assert_eq!(radio.join_requests, 0);
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(up.state.ap.address, AP_ADDRESS);
        assert_eq!(up.state.ap.ssid, "ESP32-CAM-AB3C");
        assert!(up.state.ap.captive_dns);
        assert_eq!(
            radio.ap_started.unwrap().password,
            DEFAULT_AP_PASSWORD.to_string()
        );
    }

    #[test]
    fn test_join_within_timeout() {
        let clock = ManualClock::new();
        let mut radio = FakeRadio {
            joined_after_polls: Some(6),
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);

        let up = bring_up(&mut radio, &plan(creds()), |_| Ok(NullDns::default()), &clock, &cancel)
            .unwrap();

        assert_eq!(
            up.uplink,
            UplinkOutcome::Joined {
                address: Some(Ipv4Addr::new(10, 0, 0, 42))
            }
        );
        assert!(up.state.uplink_joined);
        assert_eq!(clock.now(), JOIN_POLL_INTERVAL * 6);
        assert_eq!(up.state.last_join_attempt, Some(Duration::ZERO));
    }

    #[test]
    fn test_join_times_out_at_fifteen_seconds() {
        let clock = ManualClock::new();
        let mut radio = FakeRadio::default();
        let cancel = AtomicBool::new(false);

        let up = bring_up(&mut radio, &plan(creds()), |_| Ok(NullDns::default()), &clock, &cancel)
            .unwrap();

        assert_eq!(up.uplink, UplinkOutcome::TimedOut);
        assert_eq!(clock.now(), JOIN_TIMEOUT);
        assert!(!up.state.uplink_joined);
        assert!(up.state.uplink_configured());
    }

    #[test]
    fn test_cancelled_join() {
        let clock = ManualClock::new();
        let mut radio = FakeRadio::default();
        let cancel = AtomicBool::new(true);
        radio.join_requests = 1;

        let outcome = JoinWait::default().wait(&mut radio, &clock, &cancel);

        assert_eq!(outcome, UplinkOutcome::Cancelled);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_access_point_failure_is_fatal() {
        let clock = ManualClock::new();
        let mut radio = FakeRadio {
            ap_fails: true,
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);

        let err = bring_up(&mut radio, &plan(creds()), |_| Ok(NullDns::default()), &clock, &cancel)
            .err()
            .unwrap();

        assert_eq!(err.subsystem, "access point");
        assert!(err.to_string().contains("0x3001"));
        assert_eq!(radio.join_requests, 0);
    }

    #[test]
    fn test_dns_bind_failure_keeps_ap() {
        let clock = ManualClock::new();
        let mut radio = FakeRadio::default();
        let cancel = AtomicBool::new(false);

        let up = bring_up(
            &mut radio,
            &plan(None),
            |_| Err::<NullDns, _>(io::Error::new(io::ErrorKind::AddrInUse, "port 53 busy")),
            &clock,
            &cancel,
        )
        .unwrap();

        assert!(!up.state.ap.captive_dns);
        assert!(up.name_service.is_none());
    }
}
