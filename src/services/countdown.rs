use crate::config::GatePolicy;
use crate::models::AdSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Counting(u32),
    /// Reported once, on the tick that reaches zero.
    Finished,
    /// The countdown already finished or was skipped.
    Spent,
}

/// Seconds left before an ad view counts as complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Countdown {
    total: u32,
    remaining: u32,
    skip_after: Option<u32>,
    done: bool,
}

impl Countdown {
    pub fn new(total: u32, skip_after: Option<u32>) -> Self {
        Self {
            total,
            remaining: total,
            skip_after,
            done: total == 0,
        }
    }

    /// Every ad runs for at least one second, so the view always ends on a
    /// tick that issues verification.
    pub fn for_ad(settings: &AdSettings, policy: &GatePolicy) -> Self {
        let total = settings
            .countdown_secs()
            .unwrap_or(policy.default_countdown_secs)
            .max(1);
        let skip_after = settings.is_skippable().then(|| {
            settings
                .skip_after_secs()
                .unwrap_or(policy.skip_after_secs)
        });
        Self::new(total, skip_after)
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn elapsed(&self) -> u32 {
        self.total - self.remaining
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn can_skip(&self) -> bool {
        !self.done
            && self
                .skip_after
                .is_some_and(|threshold| self.elapsed() >= threshold)
    }

    pub fn tick(&mut self) -> Tick {
        if self.done {
            return Tick::Spent;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.done = true;
            Tick::Finished
        } else {
            Tick::Counting(self.remaining)
        }
    }

    /// Ends the countdown early. Returns `false` when skipping is not
    /// allowed yet or the countdown is already over.
    pub fn skip(&mut self) -> bool {
        if !self.can_skip() {
            return false;
        }
        self.done = true;
        true
    }
}
