use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::Local;

use crate::practice::{ExitReason, PracticeMode, SessionResult};

pub const HEADER: &str = "date,mode,items,right,wrong,score,exit";

fn mode_label(mode: PracticeMode) -> String {
    match mode {
        PracticeMode::Untimed => "practice".to_string(),
        PracticeMode::Timed(limit) => format!("speed {:.1}s", limit.as_secs_f64()),
    }
}

fn exit_label(exit: &ExitReason) -> &'static str {
    match exit {
        ExitReason::Completed => "completed",
        ExitReason::Aborted => "aborted",
        ExitReason::Interrupted => "interrupted",
        ExitReason::LinkFailed(_) => "link-failed",
        ExitReason::TerminalFailed(_) => "terminal-failed",
    }
}

/// Append one line for `result` to the CSV at `path`, writing the header
/// when the file is new.
pub fn append(path: &Path, mode: PracticeMode, result: &SessionResult) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    // If the file doesn't exist yet, emit a header first
    let needs_header = !path.exists();

    let mut file = OpenOptions::new().append(true).create(true).open(path)?;

    if needs_header {
        writeln!(file, "{HEADER}")?;
    }

    writeln!(
        file,
        "{},{},{},{},{},{:.1},{}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        mode_label(mode),
        result.items_total,
        result.right,
        result.wrong,
        result.score_percent(),
        exit_label(&result.exit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn result(right: usize, wrong: usize, exit: ExitReason) -> SessionResult {
        SessionResult {
            items_total: right + wrong,
            right,
            wrong,
            attempts: vec![],
            missed: vec![],
            exit,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("history.csv");

        append(&path, PracticeMode::Untimed, &result(3, 1, ExitReason::Completed)).unwrap();
        append(
            &path,
            PracticeMode::Timed(Duration::from_millis(1500)),
            &result(0, 4, ExitReason::Aborted),
        )
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].ends_with(",practice,4,3,1,75.0,completed"));
        assert!(lines[2].ends_with(",speed 1.5s,4,0,4,0.0,aborted"));
    }
}
