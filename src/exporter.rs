use crate::grouper::GroupedEntry;
use crate::utils::DedupMode;
use eyre::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Content written to a note that did not exist yet.
const NOTE_SEED: &str = "\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: usize,
    pub skipped: usize,
    pub bytes: usize,
}

/// Lines joined by newlines, terminated by a blank line.
pub fn render_entry(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push_str("\n\n");
    out
}

/// Whether `entry` is already recorded in `existing`.
pub fn is_recorded(existing: &str, entry: &str, mode: DedupMode) -> bool {
    match mode {
        DedupMode::Substring => existing.contains(entry),
        DedupMode::Strict => {
            existing.starts_with(entry) || existing.contains(&format!("\n{}", entry))
        }
    }
}

/// Concatenation of the rendered entries not yet present in `existing`, in order.
pub fn collect_new(
    existing: &str,
    entries: &[GroupedEntry],
    mode: DedupMode,
) -> (String, AppendOutcome) {
    let mut new_content = String::new();
    let mut outcome = AppendOutcome::default();

    for entry in entries {
        let rendered = render_entry(&entry.lines);
        if is_recorded(existing, &rendered, mode) {
            tracing::debug!(timestamp = %entry.timestamp, "already in note, skipping");
            outcome.skipped += 1;
        } else {
            new_content.push_str(&rendered);
            outcome.appended += 1;
        }
    }
    outcome.bytes = new_content.len();
    (new_content, outcome)
}

/// Create the note with its seed content if missing, then return its text.
pub fn read_or_create_note(path: &Path) -> Result<String> {
    if !path.exists() {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create notes directory: {}", parent.display())
            })?;
        }
        fs::write(path, NOTE_SEED)
            .wrap_err_with(|| format!("Failed to create note: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "created note");
    }
    fs::read_to_string(path).wrap_err_with(|| format!("Failed to read note: {}", path.display()))
}

/// Append the entries missing from the note at `path` in a single write.
///
/// Nothing is written when every entry is already recorded.
pub fn append_entries(
    path: &Path,
    entries: &[GroupedEntry],
    mode: DedupMode,
) -> Result<AppendOutcome> {
    let existing = read_or_create_note(path)?;
    let (new_content, outcome) = collect_new(&existing, entries, mode);

    if !new_content.is_empty() {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("Failed to open note for append: {}", path.display()))?;
        file.write_all(new_content.as_bytes())
            .wrap_err_with(|| format!("Failed to append to note: {}", path.display()))?;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(sec: u32, lines: &[&str]) -> GroupedEntry {
        GroupedEntry {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(14, 0, sec)
                .unwrap(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn render_joins_lines_and_ends_with_blank_line() {
        assert_eq!(
            render_entry(&["a".to_string(), "b".to_string()]),
            "a\nb\n\n"
        );
    }

    #[test]
    fn substring_mode_matches_anywhere() {
        assert!(is_recorded("\nSay Hello\n\n", "Hello\n\n", DedupMode::Substring));
        assert!(!is_recorded("\nHello\n", "Hello\n\n", DedupMode::Substring));
    }

    #[test]
    fn strict_mode_requires_line_start() {
        assert!(!is_recorded("\nSay Hello\n\n", "Hello\n\n", DedupMode::Strict));
        assert!(is_recorded("\nSay Hello\n\nHello\n\n", "Hello\n\n", DedupMode::Strict));
        assert!(is_recorded("Hello\n\n", "Hello\n\n", DedupMode::Strict));
    }

    #[test]
    fn strict_mode_sees_line_start_match_behind_an_overlapping_one() {
        let existing = "\nSay a\n\na\n\na\n\n";
        assert!(is_recorded(existing, "a\n\na\n\n", DedupMode::Strict));
    }

    #[test]
    fn strict_rerun_does_not_duplicate_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024.01.01.md");
        let entries = [entry(0, &["Say a"]), entry(1, &["a\n\na"])];

        append_entries(&path, &entries, DedupMode::Strict).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        assert_eq!(first, "\nSay a\n\na\n\na\n\n");

        let outcome = append_entries(&path, &entries, DedupMode::Strict).unwrap();
        assert_eq!(outcome.appended, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn entry_without_lines_renders_as_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024.01.01.md");

        append_entries(&path, &[entry(0, &[]), entry(1, &["Hi"])], DedupMode::Substring).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "\n\n\nHi\n\n");
    }

    #[test]
    fn collect_new_keeps_order_and_counts() {
        let entries = [entry(0, &["old"]), entry(1, &["new", "lines"]), entry(2, &["more"])];
        let (content, outcome) = collect_new("\nold\n\n", &entries, DedupMode::Substring);
        assert_eq!(content, "new\nlines\n\nmore\n\n");
        assert_eq!(
            outcome,
            AppendOutcome {
                appended: 2,
                skipped: 1,
                bytes: content.len(),
            }
        );
    }

    #[test]
    fn missing_note_is_seeded_before_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal/2024.01.01.md");

        let outcome = append_entries(&path, &[entry(0, &["Hello"])], DedupMode::Substring).unwrap();
        assert_eq!(outcome.appended, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "\nHello\n\n");
    }

    #[test]
    fn existing_entry_produces_no_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024.01.01.md");
        fs::write(&path, "# Today\n\nHello\n\n").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        let outcome = append_entries(&path, &[entry(0, &["Hello"])], DedupMode::Substring).unwrap();
        assert_eq!(outcome, AppendOutcome { appended: 0, skipped: 1, bytes: 0 });
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Today\n\nHello\n\n");
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn append_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024.01.01.md");
        fs::write(&path, "# Today\n").unwrap();

        append_entries(&path, &[entry(0, &["Hi"]), entry(5, &["Bye"])], DedupMode::Strict).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Today\nHi\n\nBye\n\n");
    }
}
