//! Line-based diff for mismatch reports
//!
//! This is a positional walk, not a minimal-edit diff: lines are compared at
//! the same cursor positions and nothing is realigned after an insertion or
//! deletion. A single extra line in `actual` therefore shows every following
//! line as changed. Reports depend on this exact output.

/// Default cap on changed lines
pub const DEFAULT_MAX_CHANGED_LINES: usize = 50;

/// Marker appended when the cap is hit
pub const TRUNCATION_MARKER: &str = "...";

/// Produce a bounded unified-style diff of two texts.
///
/// Output starts with `--- expected` / `+++ actual`, followed by one line per
/// step prefixed with two spaces (context), `- ` (expected only) or `+ `
/// (actual only). At most `max_changed` `-`/`+` lines are emitted; once that
/// many have been written, [`TRUNCATION_MARKER`] is appended and the walk
/// stops, whether or not further changes remain.
pub fn unified_diff(expected: &str, actual: &str, max_changed: usize) -> String {
    let expected: Vec<&str> = expected.lines().collect();
    let actual: Vec<&str> = actual.lines().collect();

    let mut out = vec!["--- expected".to_string(), "+++ actual".to_string()];
    let mut changed = 0;
    let (mut i, mut j) = (0, 0);

    'walk: while i < expected.len() || j < actual.len() {
        if i < expected.len() && j < actual.len() && expected[i] == actual[j] {
            out.push(format!("  {}", expected[i]));
            i += 1;
            j += 1;
            continue;
        }

        let removed = expected.get(i).map(|line| format!("- {}", line));
        let added = actual.get(j).map(|line| format!("+ {}", line));
        for line in [removed, added].into_iter().flatten() {
            if changed >= max_changed {
                out.push(TRUNCATION_MARKER.to_string());
                break 'walk;
            }
            out.push(line);
            changed += 1;
            if changed == max_changed {
                out.push(TRUNCATION_MARKER.to_string());
                break 'walk;
            }
        }
        if i < expected.len() {
            i += 1;
        }
        if j < actual.len() {
            j += 1;
        }
    }

    out.join("\n")
}
