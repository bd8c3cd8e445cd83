//! Run progress reporting.
//!
//! Reports how far `logmine run` has got: records stored, lines read and
//! templates known. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

/// A single progress event for a run.
#[derive(Clone, Debug)]
pub enum RunProgressEvent {
    /// Records are being stored.
    Mining {
        stored: u64,
        lines_read: u64,
        templates: usize,
    },
    /// The pipeline ended or the record limit was reached.
    Finished { stored: u64, lines_read: u64 },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait RunProgressReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "mining  1,024 records  5,000 lines  3 templates".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Mining {
                stored,
                lines_read,
                templates,
            } => format!(
                "mining  {} records  {} lines  {} templates\n",
                format_number(*stored),
                format_number(*lines_read),
                templates
            ),
            RunProgressEvent::Finished { stored, lines_read } => format!(
                "done  {} records from {} lines\n",
                format_number(*stored),
                format_number(*lines_read)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Mining {
                stored,
                lines_read,
                templates,
            } => serde_json::json!({
                "event": "progress",
                "phase": "mining",
                "stored": stored,
                "lines_read": lines_read,
                "templates": templates
            }),
            RunProgressEvent::Finished { stored, lines_read } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "stored": stored,
                "lines_read": lines_read
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
