/// Long-running cooperative loop: services the captive resolver and paces
/// uplink reconnects. Reconnects are unbounded in total; loss of uplink is an
/// expected condition for a roaming device.
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::clock::Clock;
use crate::network::{NameService, NetworkState, Radio, RECONNECT_INTERVAL};
use crate::retry::RetryBudget;

/// Sleep at the end of every iteration so other tasks get the core.
pub const YIELD_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChange {
    Lost,
    Restored(Option<Ipv4Addr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub dns_serviced: bool,
    pub reconnect_attempted: bool,
    pub link_change: Option<LinkChange>,
}

impl TickReport {
    pub fn changed_state(&self) -> bool {
        self.reconnect_attempted || self.link_change.is_some()
    }
}

pub struct Supervisor<'a, R: ?Sized, N, C: ?Sized> {
    radio: &'a mut R,
    name_service: Option<N>,
    state: &'a mut NetworkState,
    clock: &'a C,
    /// One attempt per due reconnect; its delay is the reconnect interval.
    reconnect: RetryBudget<()>,
    yield_for: Duration,
}

impl<'a, R, N, C> Supervisor<'a, R, N, C>
where
    R: Radio + ?Sized,
    N: NameService,
    C: Clock + ?Sized,
{
    pub fn new(
        radio: &'a mut R,
        name_service: Option<N>,
        state: &'a mut NetworkState,
        clock: &'a C,
    ) -> Self {
        Self {
            radio,
            name_service,
            state,
            clock,
            reconnect: RetryBudget::single((), RECONNECT_INTERVAL),
            yield_for: YIELD_INTERVAL,
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect = RetryBudget::single((), interval);
        self
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect.delay()
    }

    pub fn state(&self) -> &NetworkState {
        self.state
    }

    fn reconnect_due(&self, now: Duration) -> bool {
        match self.state.last_join_attempt {
            None => true,
            Some(started) => now.saturating_sub(started) >= self.reconnect.delay(),
        }
    }

    /// One non-blocking iteration, without the trailing yield.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if let Some(dns) = self.name_service.as_mut() {
            match dns.service_one() {
                Ok(serviced) => report.dns_serviced = serviced,
                Err(e) => log::warn!("Captive DNS receive failed: {}", e),
            }
        }

        if !self.state.uplink_configured() {
            return report;
        }

        let joined = self.radio.is_joined();
        if joined != self.state.uplink_joined {
            self.state.uplink_joined = joined;
            if joined {
                self.state.uplink_address = self.radio.uplink_address();
                log::info!(
                    "Uplink restored after {} attempts, address {:?}",
                    self.state.join_attempts,
                    self.state.uplink_address
                );
                report.link_change = Some(LinkChange::Restored(self.state.uplink_address));
            } else {
                self.state.uplink_address = None;
                log::warn!("Uplink lost");
                report.link_change = Some(LinkChange::Lost);
            }
        }

        let now = self.clock.now();
        if !joined && self.reconnect_due(now) {
            self.state.last_join_attempt = Some(now);
            self.state.join_attempts += 1;
            report.reconnect_attempted = true;

            let Self {
                radio,
                state,
                clock,
                reconnect,
                ..
            } = self;
            if let Some(credentials) = state.uplink.as_ref() {
                log::info!(
                    "Uplink reconnect attempt #{} to '{}'",
                    state.join_attempts,
                    credentials.ssid
                );
                // A single-attempt budget never sleeps; the next try waits for the interval
                if let Err(e) = reconnect.run(*clock, |_| radio.begin_join(credentials), |_, _| {}) {
                    log::warn!("Uplink reconnect failed: {}", e.last_error);
                }
            }
        }

        report
    }

    /// Run forever. `on_tick` sees every iteration's report and the state
    /// (for publishing status snapshots).
    pub fn run(&mut self, mut on_tick: impl FnMut(&TickReport, &NetworkState)) -> ! {
        log::info!(
            "Supervisor running (reconnect every {}s)",
            self.reconnect.delay().as_secs()
        );
        loop {
            let report = self.tick();
            on_tick(&report, self.state);
            self.clock.sleep(self.yield_for);
        }
    }
}
