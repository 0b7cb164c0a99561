/// Pool-disconnect detection: the worker keeps asking for work and gets none.
use super::WAITING_MARKER;

/// Returns `true` if at least `trigger_count` of the newest `sample_size`
/// lines contain the waiting marker.
///
/// Exactly `sample_size` lines are inspected. Fewer than `sample_size`
/// lines in total is always `false`, so a fresh or rotated log cannot trip it.
pub fn disconnected<S: AsRef<str>>(lines: &[S], sample_size: usize, trigger_count: usize) -> bool {
    if lines.len() < sample_size {
        return false;
    }

    let waiting = lines
        .iter()
        .rev()
        .take(sample_size)
        .filter(|line| line.as_ref().contains(WAITING_MARKER))
        .count();

    waiting >= trigger_count
}
