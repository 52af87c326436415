use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use chrono::Utc;
use once_cell::sync::Lazy;

/// Global session logger instance
static SESSION_LOGGER: Lazy<Mutex<Option<SessionLogger>>> = Lazy::new(|| Mutex::new(None));

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(true);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    fn is_error_stream(&self) -> bool {
        matches!(self, Level::Warn | Level::Error)
    }
}

/// File-backed logger shared by the engine, the collaborators and the CLI
pub struct SessionLogger {
    log_file_path: PathBuf,
    error_file_path: PathBuf,
}

impl SessionLogger {
    /// Initialize the session logger with file paths
    pub fn init(log_file_path: PathBuf, error_file_path: PathBuf) -> Result<(), String> {
        let logger = SessionLogger {
            log_file_path,
            error_file_path,
        };

        // Test write access to both files
        logger.ensure_files_writable()?;

        let mut slot = SESSION_LOGGER.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(logger);
        drop(slot);

        log_info("Session logger initialized");

        Ok(())
    }

    fn ensure_files_writable(&self) -> Result<(), String> {
        for path in [&self.log_file_path, &self.error_file_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create log directory: {}", e))?;
            }

            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Cannot write to log file {}: {}", path.display(), e))?;
        }

        Ok(())
    }

    fn write_log(&self, line: &str, level: Level) {
        let file_path = if level.is_error_stream() {
            &self.error_file_path
        } else {
            &self.log_file_path
        };

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(file_path) {
            let _ = file.write_all(line.as_bytes());
            let _ = file.write_all(b"\n");
            let _ = file.flush();
        }
    }
}

/// Toggle DEBUG output (console and file)
pub fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn format_line(level: Level, message: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    format!("[{}] [{}] {}", timestamp, level.as_str(), message)
}

pub fn log(level: Level, message: &str) {
    if level == Level::Debug && !DEBUG_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let line = format_line(level, message);
    if level.is_error_stream() {
        eprintln!("{}", line);
    } else {
        println!("{}", line);
    }

    if let Ok(logger_guard) = SESSION_LOGGER.lock() {
        if let Some(logger) = logger_guard.as_ref() {
            logger.write_log(&line, level);
        }
    }
}

pub fn log_info(message: &str) {
    log(Level::Info, message);
}

pub fn log_warn(message: &str) {
    log(Level::Warn, message);
}

pub fn log_error(message: &str) {
    log(Level::Error, message);
}

pub fn log_debug(message: &str) {
    log(Level::Debug, message);
}

/// Convenience macro for logging with format arguments
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_warn(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug(&format!($($arg)*))
    };
}
