use serde::Serialize;
use std::fmt;

use crate::outcome::BringupOutcome;

/// A mounted backend at or above this fill level is reported as degraded.
pub const FULL_THRESHOLD_PERCENT: u64 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FsUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl FsUsage {
    pub fn percent_used(&self) -> u64 {
        if self.total_bytes == 0 {
            return 0;
        }
        self.used_bytes.saturating_mul(100) / self.total_bytes
    }
}

/// A mountable storage backend.
pub trait Filesystem {
    type Error: fmt::Display;

    fn name(&self) -> &'static str;
    fn mount_point(&self) -> &'static str;
    fn mount(&mut self) -> Result<FsUsage, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageReport {
    pub card: BringupOutcome<FsUsage>,
    pub flash: BringupOutcome<FsUsage>,
}

/// Mount one backend. Failures are expected on boards without a card and are
/// only ever reported at info level.
pub fn mount<F: Filesystem + ?Sized>(fs: &mut F) -> BringupOutcome<FsUsage> {
    match fs.mount() {
        Ok(usage) => {
            log::info!(
                "{} mounted at {}: {} KB used of {} KB ({}%)",
                fs.name(),
                fs.mount_point(),
                usage.used_bytes / 1024,
                usage.total_bytes / 1024,
                usage.percent_used()
            );
            if usage.total_bytes == 0 {
                BringupOutcome::degraded(usage, "mounted, capacity unknown")
            } else if usage.percent_used() >= FULL_THRESHOLD_PERCENT {
                BringupOutcome::degraded(usage, format!("{}% full", usage.percent_used()))
            } else {
                BringupOutcome::Ready(usage)
            }
        }
        Err(e) => {
            log::info!("{} not mounted: {}", fs.name(), e);
            BringupOutcome::unavailable(e.to_string())
        }
    }
}

/// Mount the removable card and the flash filesystem, each independently.
pub fn bring_up<Card, Flash>(card: &mut Card, flash: &mut Flash) -> StorageReport
where
    Card: Filesystem + ?Sized,
    Flash: Filesystem + ?Sized,
{
    let card = mount(card);
    let flash = mount(flash);
    StorageReport { card, flash }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::outcome::OutcomeState;

    pub(crate) struct FakeFs {
        pub name: &'static str,
        pub result: Result<FsUsage, String>,
        pub mounts: u32,
    }

    impl FakeFs {
        pub fn ok(name: &'static str, total: u64, used: u64) -> Self {
            Self {
                name,
                result: Ok(FsUsage {
                    total_bytes: total,
                    used_bytes: used,
                }),
                mounts: 0,
            }
        }

        pub fn failing(name: &'static str, reason: &str) -> Self {
            Self {
                name,
                result: Err(reason.to_string()),
                mounts: 0,
            }
        }
    }

    impl Filesystem for FakeFs {
        type Error = String;

        fn name(&self) -> &'static str {
            self.name
        }

        fn mount_point(&self) -> &'static str {
            "/fake"
        }

        fn mount(&mut self) -> Result<FsUsage, String> {
            self.mounts += 1;
            self.result.clone()
        }
    }

    #[test]
    fn test_each_backend_independent() {
        let ok = |name| FakeFs::ok(name, 1 << 20, 1 << 10);
        let bad = |name| FakeFs::failing(name, "no card");

        let isolated_card = mount(&mut ok("card"));
        let isolated_flash = mount(&mut ok("flash"));
        let isolated_bad_card = mount(&mut bad("card"));
        let isolated_bad_flash = mount(&mut bad("flash"));

        for (card_ok, flash_ok) in [(true, true), (true, false), (false, true), (false, false)] {
            let mut card = if card_ok { ok("card") } else { bad("card") };
            let mut flash = if flash_ok { ok("flash") } else { bad("flash") };

            let report = bring_up(&mut card, &mut flash);

            let expected_card = if card_ok { &isolated_card } else { &isolated_bad_card };
            let expected_flash = if flash_ok { &isolated_flash } else { &isolated_bad_flash };
            assert_eq!(&report.card, expected_card);
            assert_eq!(&report.flash, expected_flash);
            assert_eq!(card.mounts, 1);
            assert_eq!(flash.mounts, 1);
        }
    }

    #[test]
    fn test_nearly_full_is_degraded() {
        let outcome = mount(&mut FakeFs::ok("flash", 100_000, 96_000));
        assert_eq!(outcome.state(), OutcomeState::Degraded);
        assert_eq!(outcome.value().unwrap().used_bytes, 96_000);
    }

    #[test]
    fn test_mounted_without_usage_is_degraded_not_unavailable() {
        let outcome = mount(&mut FakeFs::ok("card", 0, 0));
        assert_eq!(outcome.state(), OutcomeState::Degraded);
        assert_eq!(outcome.value(), Some(&FsUsage::default()));
        assert_eq!(
            outcome.status().reason.as_deref(),
            Some("mounted, capacity unknown")
        );
    }

    #[test]
    fn test_percent_used_handles_empty_fs() {
        assert_eq!(FsUsage::default().percent_used(), 0);
    }
}
