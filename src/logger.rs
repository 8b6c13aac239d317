//! Session logger: all log output of one run goes to a single file.
//!
//! The file is truncated at every launch so it only holds the most recent
//! session. Until [`init`] (or [`init_at`]) is called every write is a silent
//! no-op, which keeps the library quiet when embedded or under test.
//!
//! Log location:
//!   Windows:  `%APPDATA%\PMIG\pmig.log`
//!   Linux:    `~/.local/share/PMIG/pmig.log`
//!   macOS:    `~/Library/Application Support/PMIG/pmig.log`
//!
//! `PMIG_LOG=warn` (or `error`) drops the chattier levels.
//! Use the `log_info!` / `log_warn!` / `log_err!` macros anywhere in the crate.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn parse(name: &str) -> Option<Level> {
        match name.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" | "err" => Some(Level::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

struct Session {
    file: Mutex<File>,
    path: PathBuf,
    started: Instant,
    min_level: Level,
}

static SESSION: OnceLock<Session> = OnceLock::new();

/// Path of the current session log, if one was opened.
pub fn log_path() -> Option<&'static Path> {
    SESSION.get().map(|s| s.path.as_path())
}

/// Write a raw line. I/O errors are ignored so logging never takes the
/// editor down with it.
pub fn write_line(line: &str) {
    if let Some(session) = SESSION.get()
        && let Ok(mut file) = session.file.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Write a line tagged with the level and the time since session start.
pub fn write(level: Level, msg: &str) {
    let Some(session) = SESSION.get() else { return };
    if level < session.min_level {
        return;
    }
    let elapsed = session.started.elapsed();
    write_line(&format!(
        "[+{:>4}.{:03}s] [{}] {}",
        elapsed.as_secs(),
        elapsed.subsec_millis(),
        level,
        msg
    ));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*));
    };
}

/// Open the session log in the platform data directory.
pub fn init() {
    init_at(&data_dir().join("PMIG").join("pmig.log"));
}

/// Open (truncate) the session log at `path` and mirror panics into it.
/// Only the first call in a process has any effect.
pub fn init_at(path: &Path) {
    if SESSION.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };

    let min_level = std::env::var("PMIG_LOG")
        .ok()
        .and_then(|v| Level::parse(&v))
        .unwrap_or(Level::Info);
    let session = Session {
        file: Mutex::new(file),
        path: path.to_path_buf(),
        started: Instant::now(),
        min_level,
    };
    if SESSION.set(session).is_err() {
        return;
    }

    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    write_line(&format!(
        "=== PMIG {} session (unix {}) ===",
        env!("CARGO_PKG_VERSION"),
        unix
    ));
    write_line(&format!("level >= {}, file {}", min_level, path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Error, &format!("PANIC {}", info));
        prev(info);
    }));
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".local").join("share")))
        .unwrap_or_else(|_| PathBuf::from("."))
}
