/// The decision loop: wait for the worker to warm up, then poll its log on a
/// fixed interval and reboot when any failure signature matches.
use crate::config::{DetectorConfig, TimingConfig};
use crate::detectors::{self, Verdict};
use crate::line_source::{LineSource, LineSourceError};
use crate::reboot::Rebooter;
use crate::signals::Shutdown;
use std::sync::Arc;
use std::time::Duration;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Waiting out the startup delay before trusting the worker log.
    Starting,
    Polling,
    /// A signature matched and the reboot action is in flight.
    Rebooting,
}

/// Result of a single poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The worker log could not be read; no detector ran.
    Unavailable,
    Healthy,
    /// Reboot issued. Only observable when the rebooter returns (dry run).
    Rebooted { reasons: Vec<String> },
    /// The reboot command failed; polling continues next cycle.
    RebootFailed { reasons: Vec<String> },
}

/// Monitors one worker log.
pub struct Watchdog {
    timing: TimingConfig,
    detectors: DetectorConfig,
    source: Box<dyn LineSource>,
    rebooter: Arc<dyn Rebooter>,
    state: WatchdogState,
    cycles: u64,
}

impl Watchdog {
    pub fn new(
        timing: TimingConfig,
        detectors: DetectorConfig,
        source: Box<dyn LineSource>,
        rebooter: Arc<dyn Rebooter>,
    ) -> Self {
        Self {
            timing,
            detectors,
            source,
            rebooter,
            state: WatchdogState::Starting,
            cycles: 0,
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Number of poll cycles started, including ones skipped as unavailable.
    #[allow(dead_code)]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Read a fresh snapshot and run every detector against it, without
    /// acting on the result.
    pub async fn check(&self) -> Result<Vec<Verdict>, LineSourceError> {
        let lines = self.source.read_lines().await?;
        Ok(detectors::evaluate(&lines, &self.detectors))
    }

    /// Run one poll cycle: snapshot, detect, and reboot at most once.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;
        tracing::debug!(cycle = self.cycles, "checking for errors");

        let verdicts = match self.check().await {
            Ok(v) => v,
            Err(e) => {
                tracing::info!(error = %e, "skipping cycle");
                return CycleOutcome::Unavailable;
            }
        };

        if verdicts.is_empty() {
            return CycleOutcome::Healthy;
        }

        let reasons: Vec<String> = verdicts.iter().map(Verdict::reason).collect();
        for reason in &reasons {
            tracing::info!(reason = %reason, "failure signature matched");
        }

        self.state = WatchdogState::Rebooting;
        let message = format!("{}, rebooting", reasons.join("; "));
        let outcome = match self.rebooter.reboot(&message).await {
            Ok(()) => CycleOutcome::Rebooted { reasons },
            Err(e) => {
                tracing::error!(error = %e, "reboot failed, will re-check next cycle");
                CycleOutcome::RebootFailed { reasons }
            }
        };
        // A real reboot never gets here; a dry run or a failed reboot keeps polling.
        self.state = WatchdogState::Polling;
        outcome
    }

    /// Run until shutdown is requested (or the machine reboots).
    pub async fn run(&mut self, mut shutdown: Shutdown) {
        self.state = WatchdogState::Starting;
        tracing::info!(
            delay_secs = self.timing.startup_delay_secs,
            "waiting for worker to start"
        );
        if sleep_or_shutdown(self.timing.startup_delay(), &mut shutdown).await {
            return;
        }

        tracing::info!("starting nanny");
        self.state = WatchdogState::Polling;

        while !shutdown.is_requested() {
            let delay = match self.run_cycle().await {
                CycleOutcome::Unavailable => self.timing.retry_delay(),
                _ => self.timing.poll_interval(),
            };
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        tracing::info!(cycles = self.cycles, "nanny stopped");
    }
}

/// Sleep for `delay`. Returns `true` if shutdown was requested first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.requested() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{STOP_MARKER, SUBMISSION_MARKER, WAITING_MARKER};
    use crate::line_source::{FileLineSource, MemoryLineSource};
    use crate::reboot::{NoopRebooter, RebootError};
    use async_trait::async_trait;

    struct FailingRebooter;

    #[async_trait]
    impl Rebooter for FailingRebooter {
        async fn reboot(&self, _reason: &str) -> Result<(), RebootError> {
            Err(RebootError::Failed {
                command: "/sbin/reboot".to_string(),
                code: Some(1),
            })
        }
    }

    /// Lets a test keep a handle on the source it hands to the watchdog.
    struct SharedSource(Arc<MemoryLineSource>);

    #[async_trait]
    impl LineSource for SharedSource {
        async fn read_lines(&self) -> Result<Vec<String>, LineSourceError> {
            self.0.read_lines().await
        }
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    fn watchdog(source: MemoryLineSource, rebooter: Arc<dyn Rebooter>) -> Watchdog {
        Watchdog::new(
            TimingConfig::default(),
            DetectorConfig::default(),
            Box::new(source),
            rebooter,
        )
    }

    #[tokio::test]
    async fn test_healthy_cycle_does_not_reboot() {
        let noop = Arc::new(NoopRebooter::new());
        let source = MemoryLineSource::new(lines(&["i  16:31:08|main  Got work package:"]));
        let mut dog = watchdog(source, noop.clone());
        assert_eq!(dog.run_cycle().await, CycleOutcome::Healthy);
        assert!(noop.reasons().is_empty());
        assert_eq!(dog.cycles(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_log_skips_detectors() {
        let noop = Arc::new(NoopRebooter::new());
        let mut dog = watchdog(MemoryLineSource::missing(), noop.clone());
        assert_eq!(dog.run_cycle().await, CycleOutcome::Unavailable);
        assert!(noop.reasons().is_empty());
    }

    #[tokio::test]
    async fn test_log_appearing_after_missing_cycle_is_checked() {
        let noop = Arc::new(NoopRebooter::new());
        let source = Arc::new(MemoryLineSource::missing());
        let mut dog = Watchdog::new(
            TimingConfig::default(),
            DetectorConfig::default(),
            Box::new(SharedSource(source.clone())),
            noop.clone(),
        );
        assert_eq!(dog.run_cycle().await, CycleOutcome::Unavailable);

        source.set(lines(&["Killed"]));
        assert_eq!(
            dog.run_cycle().await,
            CycleOutcome::Rebooted {
                reasons: vec!["Reboot triggered: killed".to_string()]
            }
        );
        assert_eq!(noop.reasons().len(), 1);
        assert_eq!(dog.cycles(), 2);
    }

    #[tokio::test]
    async fn test_trigger_reboots_once_and_returns_to_polling() {
        let noop = Arc::new(NoopRebooter::new());
        let source = MemoryLineSource::new(lines(&["Killed"]));
        let mut dog = watchdog(source, noop.clone());

        let outcome = dog.run_cycle().await;
        assert_eq!(
            outcome,
            CycleOutcome::Rebooted {
                reasons: vec!["Reboot triggered: killed".to_string()]
            }
        );
        assert_eq!(dog.state(), WatchdogState::Polling);
        assert_eq!(
            noop.reasons(),
            vec!["Reboot triggered: killed, rebooting".to_string()]
        );
    }

    #[tokio::test]
    async fn test_several_signatures_share_one_reboot() {
        let noop = Arc::new(NoopRebooter::new());
        let mut raw = vec!["stratum connection error"];
        raw.extend([SUBMISSION_MARKER; 4]);
        let mut dog = watchdog(MemoryLineSource::new(lines(&raw)), noop.clone());

        let outcome = dog.run_cycle().await;
        assert_eq!(
            outcome,
            CycleOutcome::Rebooted {
                reasons: vec![
                    "Stuck on submitting solution".to_string(),
                    "Reboot triggered: stratum connection error".to_string(),
                ]
            }
        );
        assert_eq!(noop.reasons().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_after_submissions_is_not_stuck_but_others_still_run() {
        let noop = Arc::new(NoopRebooter::new());
        let mut raw: Vec<&str> = vec![WAITING_MARKER; 30];
        raw.extend(vec!["i  16:45:11|main  Push: New work package received"; 14]);
        raw.extend([SUBMISSION_MARKER; 5]);
        raw.push(STOP_MARKER);
        let mut dog = watchdog(MemoryLineSource::new(lines(&raw)), noop.clone());

        // 50 newest lines hold 30 waiting markers: disconnect still fires.
        assert_eq!(
            dog.run_cycle().await,
            CycleOutcome::Rebooted {
                reasons: vec!["Disconnected from server".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_stop_after_submissions_alone_is_healthy() {
        let noop = Arc::new(NoopRebooter::new());
        let mut raw = vec![SUBMISSION_MARKER; 5];
        raw.push(STOP_MARKER);
        let mut dog = watchdog(MemoryLineSource::new(lines(&raw)), noop.clone());
        assert_eq!(dog.run_cycle().await, CycleOutcome::Healthy);
        assert!(noop.reasons().is_empty());
    }

    #[tokio::test]
    async fn test_reboot_failure_keeps_polling() {
        let source = MemoryLineSource::new(lines(&["Killed"]));
        let mut dog = watchdog(source, Arc::new(FailingRebooter));
        let outcome = dog.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::RebootFailed { .. }));
        assert_eq!(dog.state(), WatchdogState::Polling);
        // Condition persists; the next cycle tries again.
        assert!(matches!(
            dog.run_cycle().await,
            CycleOutcome::RebootFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_check_reads_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error");
        std::fs::write(&path, "ok\nStratum Connection Error: timeout\n").unwrap();
        let dog = Watchdog::new(
            TimingConfig::default(),
            DetectorConfig::default(),
            Box::new(FileLineSource::new(&path, None)),
            Arc::new(NoopRebooter::new()),
        );
        assert_eq!(
            dog.check().await.unwrap(),
            vec![Verdict::Triggered("stratum connection error".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_then_polls_on_interval() {
        let noop = Arc::new(NoopRebooter::new());
        let mut dog = watchdog(MemoryLineSource::new(lines(&["Killed"])), noop.clone());
        assert_eq!(dog.state(), WatchdogState::Starting);
        let (trigger, shutdown) = Shutdown::channel();

        // Cycles at t=25, 40, 55; shutdown at t=60.
        tokio::join!(dog.run(shutdown), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            trigger.fire();
        });

        assert_eq!(dog.cycles(), 3);
        assert_eq!(noop.reasons().len(), 3);
        assert_eq!(dog.state(), WatchdogState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_uses_retry_delay_when_log_missing() {
        let noop = Arc::new(NoopRebooter::new());
        let mut dog = watchdog(MemoryLineSource::missing(), noop.clone());
        let (trigger, shutdown) = Shutdown::channel();

        // Cycles at t=25, 35, 45, 55; shutdown at t=60.
        tokio::join!(dog.run(shutdown), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            trigger.fire();
        });

        assert_eq!(dog.cycles(), 4);
        assert!(noop.reasons().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_startup_runs_no_cycles() {
        let noop = Arc::new(NoopRebooter::new());
        let mut dog = watchdog(MemoryLineSource::new(lines(&["Killed"])), noop.clone());
        let (trigger, shutdown) = Shutdown::channel();

        tokio::join!(dog.run(shutdown), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.fire();
        });

        assert_eq!(dog.cycles(), 0);
        assert_eq!(dog.state(), WatchdogState::Starting);
    }
}
