/// Hashrate estimation from the worker's periodic mining reports.
///
/// Typical input line:
/// `i  16:31:14|main  Mining on PoWhash #f2e7406b : 32505856 H/s = 65011712 hashes / 2.009 s`
use super::MINING_MARKER;
use regex::Regex;
use std::sync::LazyLock;

static HASHRATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) H/s").unwrap());

static DURATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?) s\b").unwrap());

/// One hashrate report: the rate and the measurement window it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashrateSample {
    pub hashrate: f64,
    pub duration_secs: f64,
}

/// Parse a mining report line.
///
/// Returns `None` for lines without the mining marker and for mining lines
/// whose rate or duration field is missing or unparsable.
pub fn parse_sample(line: &str) -> Option<HashrateSample> {
    if !line.contains(MINING_MARKER) {
        return None;
    }

    let hashrate = HASHRATE_PATTERN
        .captures(line)
        .and_then(|c| c[1].parse::<u64>().ok());
    let duration_secs = DURATION_PATTERN
        .captures(line)
        .and_then(|c| c[1].parse::<f64>().ok());

    match (hashrate, duration_secs) {
        (Some(hashrate), Some(duration_secs)) => Some(HashrateSample {
            hashrate: hashrate as f64,
            duration_secs,
        }),
        _ => {
            tracing::debug!(line, "skipping malformed mining line");
            None
        }
    }
}

/// Average hashrate over the newest `n` stable samples.
///
/// Samples whose window is not longer than `min_duration_secs` are dropped.
/// Returns `None` (undetermined) when fewer than `n` stable samples exist,
/// so a short log is never mistaken for a low reading.
pub fn avg_hashrate<S: AsRef<str>>(lines: &[S], n: usize, min_duration_secs: f64) -> Option<f64> {
    if n == 0 {
        return None;
    }

    let samples: Vec<f64> = lines
        .iter()
        .rev()
        .filter_map(|line| parse_sample(line.as_ref()))
        .filter(|s| s.duration_secs > min_duration_secs)
        .map(|s| s.hashrate)
        .take(n)
        .collect();

    if samples.len() < n {
        return None;
    }

    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}
