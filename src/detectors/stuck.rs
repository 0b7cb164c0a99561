/// Submission-hang detection.
///
/// A worker that keeps logging "Solution found; Submitting ..." without a
/// "Worker stopping" in between is hung on the submit call.
use super::{STOP_MARKER, SUBMISSION_MARKER};

/// Returns `true` if more than `limit` submission markers appear, scanning
/// newest to oldest, before any stop marker.
///
/// The first stop marker reached ends the scan with `false`, so older
/// submissions behind it are never counted. Running out of lines is `false`.
pub fn stuck<S: AsRef<str>>(lines: &[S], limit: usize) -> bool {
    let mut submissions = 0usize;
    for line in lines.iter().rev() {
        let line = line.as_ref();
        if line.contains(SUBMISSION_MARKER) {
            submissions += 1;
        }
        if line.contains(STOP_MARKER) {
            return false;
        }
        if submissions > limit {
            return true;
        }
    }
    false
}
