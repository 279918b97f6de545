use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn format_time(now: SystemTime) -> String {
    let duration = now.duration_since(UNIX_EPOCH).unwrap();
    let secs = duration.as_secs();

    let year = 1970 + (secs / 31_557_600); // Rough years
    let month = ((secs % 31_557_600) / 2_628_000) as u8 + 1;
    let day = ((secs % 2_628_000) / 86_400) as u8 + 1;
    let hour = ((secs % 86_400) / 3600) as u8;
    let minute = ((secs % 3600) / 60) as u8;
    let second = (secs % 60) as u8;

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn from_name(s: &str) -> Option<Level> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }

    fn from_env() -> Level {
        std::env::var("GATEKEEPD_LOG")
            .ok()
            .and_then(|v| Level::from_name(&v))
            .unwrap_or(Level::Info)
    }
}

enum Target {
    Stdout,
    File(File),
}

/// Where log lines go. A single process-wide sink, swapped in place so the
/// `info!`/`warn!`/... macros never need to carry a handle around.
pub struct LogSink {
    target: Target,
    path: Option<String>,
    level: Level,
}

impl LogSink {
    fn stdout() -> Self {
        LogSink {
            target: Target::Stdout,
            path: None,
            level: Level::from_env(),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    pub fn write_line(&mut self, line: &str) {
        match &mut self.target {
            Target::Stdout => println!("{line}"),
            Target::File(f) => {
                let _ = writeln!(f, "{line}");
            }
        }
    }

    /// Reopen the log file in place. Called on SIGHUP so log rotation
    /// (moving the old file aside) doesn't leave us writing to a deleted inode.
    pub fn reopen(&mut self) -> std::io::Result<()> {
        if let Some(path) = self.path.clone() {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.target = Target::File(file);
        }
        Ok(())
    }
}

static SINK: OnceLock<Mutex<LogSink>> = OnceLock::new();

pub fn sink() -> &'static Mutex<LogSink> {
    SINK.get_or_init(|| Mutex::new(LogSink::stdout()))
}

/// Redirect the global sink to an append-mode file. Call once at startup,
/// before any other thread or child has logged through the default stdout sink.
pub fn use_file(path: &str) -> std::io::Result<()> {
    let mut guard = sink().lock().unwrap();
    guard.path = Some(path.to_string());
    guard.reopen()
}

pub fn reopen() -> std::io::Result<()> {
    sink().lock().unwrap().reopen()
}

#[macro_export]
macro_rules! log {
    ($level_enum:expr, $level:expr, $color:expr, $($arg:tt)*) => {{
        let mut guard = $crate::sink().lock().unwrap();
        if guard.enabled($level_enum) {
            let ts = $crate::format_time(std::time::SystemTime::now());
            let line = format!(
                "[{}] \x1b[30m#|| gatekeepd ||#\x1b[0m \x1b[{}m{}\x1b[0m: {}",
                ts,
                $color,
                $level,
                format!($($arg)*)
            );
            guard.write_line(&line);
        }
    }};
}

#[macro_export]
macro_rules! info { ($($arg:tt)*) => { $crate::log!($crate::Level::Info, "INFO ", "32", $($arg)*); }; }
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { $crate::log!($crate::Level::Warn, "WARN ", "33", $($arg)*); }; }
#[macro_export]
macro_rules! errors { ($($arg:tt)*) => { $crate::log!($crate::Level::Error, "ERROR", "31", $($arg)*); }; }
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { $crate::log!($crate::Level::Debug, "DEBUG", "36", $($arg)*); }; }
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { $crate::log!($crate::Level::Trace, "TRACE", "34", $($arg)*); }; }
