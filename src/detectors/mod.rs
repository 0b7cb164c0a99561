//! Failure-signature detectors for the worker log.
//!
//! Each detector is a pure function over a snapshot of log lines ordered
//! oldest first. `evaluate` runs all four against the same snapshot.

pub mod disconnect;
pub mod hashrate;
pub mod stuck;
pub mod trigger;

use crate::config::DetectorConfig;

/// Worker believes it found a result and is submitting it.
pub const SUBMISSION_MARKER: &str = "Solution found; Submitting ...";
/// Worker cleanly halted after a submission.
pub const STOP_MARKER: &str = "Worker stopping";
/// Worker has no work assigned.
pub const WAITING_MARKER: &str = "Waiting for work package...";
/// Periodic hashrate report.
pub const MINING_MARKER: &str = "Mining on PoWhash";

const HASHES_PER_MH: f64 = 1024.0 * 1024.0;

/// Outcome of one detector against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Healthy,
    Stuck,
    Triggered(String),
    Underperforming { measured: f64, threshold: f64 },
    Disconnected,
}

impl Verdict {
    /// Human-readable reboot reason for this verdict.
    pub fn reason(&self) -> String {
        match self {
            Verdict::Healthy => "healthy".to_string(),
            Verdict::Stuck => "Stuck on submitting solution".to_string(),
            Verdict::Triggered(word) => format!("Reboot triggered: {word}"),
            Verdict::Underperforming {
                measured,
                threshold,
            } => format!(
                "Avg hashrate [{:.2} MH/s] below threshold [{:.2} MH/s]",
                measured / HASHES_PER_MH,
                threshold / HASHES_PER_MH
            ),
            Verdict::Disconnected => "Disconnected from server".to_string(),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason())
    }
}

/// Run every detector against `lines` and return the positive verdicts,
/// in the order stuck, trigger, hashrate, disconnect. Empty means healthy.
pub fn evaluate<S: AsRef<str>>(lines: &[S], config: &DetectorConfig) -> Vec<Verdict> {
    let mut verdicts = Vec::new();

    if stuck::stuck(lines, config.stuck_limit) {
        verdicts.push(Verdict::Stuck);
    }

    if let Some(word) = trigger::triggered(lines, &config.triggers) {
        verdicts.push(Verdict::Triggered(word.to_string()));
    }

    // An undetermined average is never compared against the threshold.
    if let Some(avg) = hashrate::avg_hashrate(
        lines,
        config.hashrate_samples,
        config.min_sample_duration_secs,
    ) {
        if avg < config.expected_hashrate {
            verdicts.push(Verdict::Underperforming {
                measured: avg,
                threshold: config.expected_hashrate,
            });
        }
    }

    if disconnect::disconnected(
        lines,
        config.disconnect_sample_size,
        config.disconnect_trigger_count,
    ) {
        verdicts.push(Verdict::Disconnected);
    }

    verdicts
}
