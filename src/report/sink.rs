//! Where report lines go.

use std::io::{self, Write};

use colored::Colorize;
use tracing::debug;

pub const RULE_WIDTH: usize = 80;

const BANNER: &str = r"
 ____  _   _ ____ ___ _   _ ____  ____  _____ ____ _____
/ ___|| | | / ___|_ _| \ | / ___||  _ \| ____/ ___|_   _|
\___ \| |_| \___ \| ||  \| \___ \| |_) |  _|| |     | |
 ___) |\__, |___) | || |\  |___) |  __/| |__| |___  | |
|____/ |___/|____/___|_| \_|____/|_|   |_____\____| |_|
";

const SUBTITLE: &str = "System Inspector: detailed console report";

/// Append-only line stream. Presentation (banner, rules, headings) has
/// plain-text defaults so every sink renders the same structure.
pub trait ReportSink {
    fn line(&mut self, text: &str);

    fn heading(&mut self, title: &str) {
        self.line(title);
    }

    fn rule(&mut self) {
        self.line(&"-".repeat(RULE_WIDTH));
    }

    fn banner(&mut self) {
        for l in BANNER.lines() {
            self.line(l);
        }
        self.line(SUBTITLE);
        self.line("");
    }
}

/// Console output. Write errors (e.g. a closed pipe) are logged and
/// otherwise ignored so the report still runs to completion.
pub struct ConsoleSink<W: Write> {
    out: W,
    color: bool,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout(color: bool) -> Self {
        Self::new(io::stdout(), color)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }
}

impl<W: Write> ReportSink for ConsoleSink<W> {
    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            debug!(error = %e, "dropping report line");
        }
    }

    fn heading(&mut self, title: &str) {
        if self.color {
            self.line(&title.yellow().bold().to_string());
        } else {
            self.line(title);
        }
    }

    fn banner(&mut self) {
        for l in BANNER.lines() {
            if self.color {
                self.line(&l.cyan().to_string());
            } else {
                self.line(l);
            }
        }
        self.line(SUBTITLE);
        self.line("");
    }
}

/// Collects lines in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

#[cfg(test)]
impl ReportSink for MemorySink {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_is_fixed_width() {
        let mut sink = MemorySink::default();
        sink.rule();
        assert_eq!(sink.lines, vec!["-".repeat(80)]);
    }

    #[test]
    fn plain_console_writes_lines_verbatim() {
        let mut buf = Vec::new();
        {
            let mut sink = ConsoleSink::new(&mut buf, false);
            sink.heading("MEMORY");
            sink.line("Total RAM (bytes): 42");
        }
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "MEMORY\nTotal RAM (bytes): 42\n"
        );
    }

    #[test]
    fn banner_ends_with_subtitle_and_blank_line() {
        let mut sink = MemorySink::default();
        sink.banner();
        let n = sink.lines.len();
        assert_eq!(sink.lines[n - 2], SUBTITLE);
        assert_eq!(sink.lines[n - 1], "");
    }

    #[test]
    fn write_failures_do_not_panic() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut sink = ConsoleSink::new(Closed, true);
        sink.banner();
        sink.line("still running");
    }
}
