//! Restart policy evaluation.
//!
//! A [`RestartLedger`] tracks one service's consecutive-restart count and
//! turns an exit into either a scheduled restart (with its backoff delay) or
//! a decision to leave the service stopped. Covers the four standard restart
//! policies instead of a single configured exit-code allowlist, and resets
//! on "time spent running before this exit" rather than "time since last
//! retry": a service that stayed up for a full stable window before failing
//! again starts its backoff sequence over.

use std::time::Duration;

use crate::config::{RestartConfig, RestartPolicyKind, DEFAULT_STABLE_WINDOW};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RestartDecision {
    Restart(Duration),
    Stop,
}

#[derive(Debug)]
pub struct RestartLedger {
    config: RestartConfig,
    consecutive_restarts: u32,
    stable_window: Duration,
}

impl RestartLedger {
    pub fn new(config: RestartConfig) -> Self {
        Self {
            config,
            consecutive_restarts: 0,
            stable_window: DEFAULT_STABLE_WINDOW,
        }
    }

    #[cfg(test)]
    fn with_stable_window(mut self, window: Duration) -> Self {
        self.stable_window = window;
        self
    }

    /// `exit_code` is `None` when the process died from a signal.
    /// `stopped_deliberately` is true when the supervisor itself asked the
    /// process to stop (shutdown, reload, dependency stop) rather than the
    /// process exiting on its own.
    pub fn record_exit(
        &mut self,
        exit_code: Option<i32>,
        uptime: Duration,
        stopped_deliberately: bool,
    ) -> RestartDecision {
        if uptime >= self.stable_window {
            self.consecutive_restarts = 0;
        }

        if !self.policy_permits(exit_code, stopped_deliberately) {
            return RestartDecision::Stop;
        }

        if self.config.max_retries > 0 && self.consecutive_restarts >= self.config.max_retries {
            return RestartDecision::Stop;
        }

        self.consecutive_restarts += 1;
        RestartDecision::Restart(self.delay())
    }

    fn policy_permits(&self, exit_code: Option<i32>, stopped_deliberately: bool) -> bool {
        match self.config.policy {
            RestartPolicyKind::Never => false,
            RestartPolicyKind::Always => true,
            RestartPolicyKind::UnlessStopped => !stopped_deliberately,
            RestartPolicyKind::OnFailure => !stopped_deliberately && exit_code != Some(0),
        }
    }

    fn delay(&self) -> Duration {
        let exponent = self.consecutive_restarts.saturating_sub(1).min(31);
        let delay = self.config.delay.saturating_mul(1u32 << exponent);
        let cap = if self.config.delay_max.is_zero() {
            self.config.delay.saturating_mul(10)
        } else {
            self.config.delay_max
        };
        delay.min(cap)
    }

    pub fn consecutive_restarts(&self) -> u32 {
        self.consecutive_restarts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(policy: RestartPolicyKind, max_retries: u32) -> RestartConfig {
        RestartConfig {
            policy,
            max_retries,
            delay: Duration::from_secs(1),
            delay_max: Duration::from_secs(30),
        }
    }

    #[test]
    fn never_policy_always_stops() {
        let mut ledger = RestartLedger::new(config(RestartPolicyKind::Never, 10));
        assert_eq!(
            ledger.record_exit(Some(1), Duration::from_secs(1), false),
            RestartDecision::Stop
        );
    }

    #[test]
    fn on_failure_does_not_restart_clean_exit() {
        let mut ledger = RestartLedger::new(config(RestartPolicyKind::OnFailure, 10));
        assert_eq!(
            ledger.record_exit(Some(0), Duration::from_secs(1), false),
            RestartDecision::Stop
        );
    }

    #[test]
    fn on_failure_restarts_nonzero_exit() {
        let mut ledger = RestartLedger::new(config(RestartPolicyKind::OnFailure, 10));
        assert!(matches!(
            ledger.record_exit(Some(1), Duration::from_secs(1), false),
            RestartDecision::Restart(_)
        ));
    }

    #[test]
    fn always_restarts_even_clean_exit() {
        let mut ledger = RestartLedger::new(config(RestartPolicyKind::Always, 10));
        assert!(matches!(
            ledger.record_exit(Some(0), Duration::from_secs(1), false),
            RestartDecision::Restart(_)
        ));
    }

    #[test]
    fn unless_stopped_does_not_restart_deliberate_stop() {
        let mut ledger = RestartLedger::new(config(RestartPolicyKind::UnlessStopped, 10));
        assert_eq!(
            ledger.record_exit(Some(0), Duration::from_secs(1), true),
            RestartDecision::Stop
        );
    }

    #[test]
    fn stops_after_max_retries_exhausted() {
        let mut ledger = RestartLedger::new(config(RestartPolicyKind::Always, 2));
        assert!(matches!(
            ledger.record_exit(Some(1), Duration::from_millis(1), false),
            RestartDecision::Restart(_)
        ));
        assert!(matches!(
            ledger.record_exit(Some(1), Duration::from_millis(1), false),
            RestartDecision::Restart(_)
        ));
        assert_eq!(
            ledger.record_exit(Some(1), Duration::from_millis(1), false),
            RestartDecision::Stop
        );
    }

    #[test]
    fn delay_grows_exponentially_until_capped() {
        let mut ledger = RestartLedger::new(RestartConfig {
            policy: RestartPolicyKind::Always,
            max_retries: 0,
            delay: Duration::from_secs(1),
            delay_max: Duration::from_secs(10),
        });
        let delays: Vec<Duration> = (0..5)
            .map(|_| match ledger.record_exit(Some(1), Duration::from_millis(1), false) {
                RestartDecision::Restart(d) => d,
                RestartDecision::Stop => panic!("expected restart"),
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn zero_delay_max_caps_at_ten_times_base_delay() {
        let mut ledger = RestartLedger::new(RestartConfig {
            policy: RestartPolicyKind::Always,
            max_retries: 0,
            delay: Duration::from_secs(1),
            delay_max: Duration::ZERO,
        });
        let delays: Vec<Duration> = (0..6)
            .map(|_| match ledger.record_exit(Some(1), Duration::from_millis(1), false) {
                RestartDecision::Restart(d) => d,
                RestartDecision::Stop => panic!("expected restart"),
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn stable_uptime_resets_the_sequence() {
        let mut ledger = RestartLedger::new(config(RestartPolicyKind::Always, 10))
            .with_stable_window(Duration::from_secs(60));
        ledger.record_exit(Some(1), Duration::from_millis(1), false);
        ledger.record_exit(Some(1), Duration::from_millis(1), false);
        assert_eq!(ledger.consecutive_restarts(), 2);

        let decision = ledger.record_exit(Some(1), Duration::from_secs(120), false);
        assert_eq!(decision, RestartDecision::Restart(Duration::from_secs(1)));
        assert_eq!(ledger.consecutive_restarts(), 1);
    }
}
