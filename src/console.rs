//! User-facing progress output
//!
//! Every progress line carries a marker and a local `[HH:MM:SS]` timestamp,
//! e.g. `✅ [14:02:11] Model iris: 12.3ms`. Diagnostics go through
//! `tracing` instead; this is only what the operator watches scroll by.

use std::sync::Mutex;

use chrono::Local;

/// Severity of a progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn marker(&self) -> &'static str {
        match self {
            Level::Info => "ℹ️",
            Level::Success => "✅",
            Level::Warning => "⚠️",
            Level::Error => "❌",
        }
    }
}

enum Sink {
    Stdout,
    Captured(Mutex<Vec<(Level, String)>>),
}

/// Progress printer
pub struct Console {
    quiet: bool,
    sink: Sink,
}

impl Console {
    /// Print to stdout; `quiet` drops info lines
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            sink: Sink::Stdout,
        }
    }

    /// Keep lines in memory instead of printing
    pub fn captured() -> Self {
        Self {
            quiet: false,
            sink: Sink::Captured(Mutex::new(Vec::new())),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.emit(Level::Info, msg.as_ref());
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.emit(Level::Success, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.emit(Level::Warning, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.emit(Level::Error, msg.as_ref());
    }

    /// Unmarked line (command output, JSON bodies)
    pub fn raw(&self, text: impl AsRef<str>) {
        match &self.sink {
            Sink::Stdout => println!("{}", text.as_ref()),
            Sink::Captured(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push((Level::Info, text.as_ref().to_string()));
                }
            }
        }
    }

    /// `✅`/`❌` depending on `ok`
    pub fn outcome(&self, ok: bool, msg: impl AsRef<str>) {
        if ok {
            self.success(msg);
        } else {
            self.error(msg);
        }
    }

    fn emit(&self, level: Level, msg: &str) {
        if self.quiet && level == Level::Info {
            return;
        }
        match &self.sink {
            Sink::Stdout => {
                let timestamp = Local::now().format("%H:%M:%S").to_string();
                println!("{}", format_line(level, &timestamp, msg));
            }
            Sink::Captured(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push((level, msg.to_string()));
                }
            }
        }
    }

    /// Captured lines (empty when printing to stdout)
    pub fn lines(&self) -> Vec<(Level, String)> {
        match &self.sink {
            Sink::Stdout => Vec::new(),
            Sink::Captured(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
        }
    }

    /// Captured messages at one level
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

/// `<marker> [<timestamp>] <msg>`
pub fn format_line(level: Level, timestamp: &str, msg: &str) -> String {
    format!("{} [{}] {}", level.marker(), timestamp, msg)
}
