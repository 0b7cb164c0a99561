//! Trigger-word detection: case-insensitive substring search over every line.

/// Returns the first configured trigger found, scanning lines newest to
/// oldest and triggers in configured order within each line.
///
/// Every line is inspected until a match is found; `None` means no line
/// mentions any trigger.
pub fn triggered<'t, S: AsRef<str>>(lines: &[S], triggers: &'t [String]) -> Option<&'t str> {
    let needles: Vec<(String, &str)> = triggers
        .iter()
        .map(|t| (t.to_lowercase(), t.as_str()))
        .collect();

    lines.iter().rev().find_map(|line| {
        let haystack = line.as_ref().to_lowercase();
        needles
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map(|(_, original)| *original)
    })
}
