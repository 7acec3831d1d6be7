//! Helpers for the command-line tools the providers shell out to.

use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::error::{QueryError, QueryResult};

/// Search PATH for an executable, honouring the platform's exe suffix.
pub fn find(name: &str) -> Option<PathBuf> {
    let file = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(&file))
            .find(|path| path.is_file())
    })
}

/// Run a program and return its stdout. A non-zero exit is an error.
pub fn run(program: impl AsRef<Path>, args: &[&str]) -> QueryResult<String> {
    let program = program.as_ref();
    let display = program.display().to_string();

    let output = Command::new(program)
        // Force C locale so numbers and dates parse the same everywhere.
        .env("LC_ALL", "C")
        .env("LANG", "C")
        .args(args)
        .output()
        .map_err(|e| QueryError::Command {
            program: display.clone(),
            reason: e.to_string(),
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(QueryError::Command {
            program: display,
            reason: format!("{} {}", output.status, stderr.trim()),
        })
    }
}

/// Run a program, discarding errors. Used for best-effort platform facts.
pub fn run_opt(program: &str, args: &[&str]) -> Option<String> {
    run(program, args)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Lines of a child's stdout, read as the child produces them.
/// Dropping the stream kills the child, so a consumer that stops early
/// also stops the enumeration behind it.
pub struct LineStream {
    program: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

/// Spawn a program with piped stdout. Only spawn failures are errors; the
/// exit status is not checked.
pub fn stream_lines(program: impl AsRef<Path>, args: &[&str]) -> QueryResult<LineStream> {
    let program = program.as_ref();
    let display = program.display().to_string();

    let mut child = Command::new(program)
        .env("LC_ALL", "C")
        .env("LANG", "C")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| QueryError::Command {
            program: display.clone(),
            reason: e.to_string(),
        })?;

    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(QueryError::Command {
            program: display,
            reason: "stdout not captured".into(),
        });
    };

    Ok(LineStream {
        program: display,
        child,
        lines: BufReader::new(stdout).lines(),
    })
}

impl Iterator for LineStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self.lines.next()? {
            Ok(line) => Some(line),
            Err(e) => {
                debug!(program = %self.program, error = %e, "output stream ended");
                None
            }
        }
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        // already exited is fine; either way reap it
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn read_file(path: &str) -> QueryResult<String> {
    std::fs::read_to_string(path).map_err(|e| QueryError::io(path, e))
}

/// Read a one-line sysfs/procfs attribute, trimmed.
pub fn read_attr(path: impl AsRef<Path>) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_misses_unknown_tool() {
        assert!(find("definitely-not-a-real-tool-4f1c").is_none());
    }

    #[test]
    fn run_reports_spawn_failure_as_command_error() {
        let err = run("definitely-not-a-real-tool-4f1c", &[]).unwrap_err();
        assert!(matches!(err, QueryError::Command { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn stream_yields_lines_in_order() {
        let lines: Vec<String> = stream_lines("sh", &["-c", "printf 'a\\tb\\nc\\n'"]).unwrap().collect();
        assert_eq!(lines, vec!["a\tb", "c"]);
    }

    #[cfg(unix)]
    #[test]
    fn dropping_a_stream_stops_an_endless_producer() {
        let stream = stream_lines("sh", &["-c", "i=0; while true; do echo item$i; i=$((i+1)); done"])
            .unwrap();
        let first: Vec<String> = stream.take(3).collect();
        assert_eq!(first, vec!["item0", "item1", "item2"]);
    }

    #[test]
    fn stream_reports_spawn_failure() {
        assert!(matches!(
            stream_lines("definitely-not-a-real-tool-4f1c", &[]),
            Err(QueryError::Command { .. })
        ));
    }

    #[test]
    fn read_attr_trims_and_drops_empty() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("bios_vendor");
        let empty = dir.path().join("empty");
        std::fs::write(&full, "American Megatrends Inc.\n").unwrap();
        std::fs::write(&empty, "\n").unwrap();

        assert_eq!(read_attr(&full).as_deref(), Some("American Megatrends Inc."));
        assert_eq!(read_attr(&empty), None);
        assert_eq!(read_attr(dir.path().join("missing")), None);
    }
}
