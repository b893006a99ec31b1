//! Wicket logging.
//!
//! Small structured logger used by every wicket crate. Output goes to stderr
//! and is controlled entirely through the environment:
//!
//! - `WICKET_DEBUG=1` - shorthand for `WICKET_LOG_LEVEL=debug`
//! - `WICKET_LOG_LEVEL=trace|debug|info|warn|error|off`
//! - `WICKET_LOG_FORMAT=json|compact|pretty` (default `json`)
//! - `WICKET_LOG_TIMESTAMPS=0|1`
//!
//! # Usage
//!
//! ```rust
//! use wicket_log::{debug, info, redact, warn};
//!
//! info!("cache ready");
//! debug!(target: "wicket::session", "loaded {} entries", 3);
//!
//! // Structured fields follow a `;`
//! let id = "0d3c1f0e-9c53-4a8e-8d0f-3d2a8c1b7e55";
//! warn!("old session still present"; session = redact(id), attempts = 3);
//! ```
//!
//! Session identifiers and tokens are bearer credentials, so call sites pass
//! them through [`redact`] before logging.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::env;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// Levels and formats
// ============================================================================

/// Log level, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    /// Disables all output.
    Off = 5,
}

impl Level {
    /// Upper-case level name as printed in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Off,
        }
    }

    fn to_filter(self) -> log::LevelFilter {
        match self {
            Level::Trace => log::LevelFilter::Trace,
            Level::Debug => log::LevelFilter::Debug,
            Level::Info => log::LevelFilter::Info,
            Level::Warn => log::LevelFilter::Warn,
            Level::Error => log::LevelFilter::Error,
            Level::Off => log::LevelFilter::Off,
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "off" | "none" => Ok(Level::Off),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One JSON object per line.
    Json,
    /// `HH:MM:SS I target: message k=v`
    Compact,
    /// Human-oriented, full timestamp and padded level.
    Pretty,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "compact" => Ok(Format::Compact),
            "pretty" => Ok(Format::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logger configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: Format,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Json,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Build the configuration from `WICKET_*` environment variables.
    pub fn from_env() -> Self {
        let debug = env::var("WICKET_DEBUG")
            .map(|v| flag(&v))
            .unwrap_or(false);

        let level = env::var("WICKET_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("WICKET_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Format::Json);

        let timestamps = env::var("WICKET_LOG_TIMESTAMPS")
            .map(|v| flag(&v))
            .unwrap_or(true);

        Self {
            level,
            format,
            timestamps,
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<LogConfig> = Lazy::new(|| {
    let config = LogConfig::from_env();
    LOG_LEVEL.store(config.level as u8, Ordering::SeqCst);
    config
});

/// Force the environment to be read now rather than on first use.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// The active configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Current minimum level.
pub fn current_level() -> Level {
    init();
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Override the minimum level at runtime.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    log::set_max_level(level.to_filter());
}

/// Whether a message at `level` would be written.
#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    level != Level::Off && level >= current_level()
}

// ============================================================================
// Redaction
// ============================================================================

/// Shorten a credential-like identifier for logging.
///
/// Keeps the first eight characters, which is enough to correlate lines
/// without making the value usable.
pub fn redact(value: &str) -> String {
    if value.chars().count() <= 8 {
        return "***".to_string();
    }
    let prefix: String = value.chars().take(8).collect();
    format!("{}...", prefix)
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct JsonLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    level: &'a str,
    target: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    fields: serde_json::Map<String, serde_json::Value>,
}

/// Render one log line without writing it.
pub fn render(
    config: &LogConfig,
    level: Level,
    target: &str,
    message: &str,
    fields: &[(&str, String)],
) -> String {
    match config.format {
        Format::Json => {
            let line = JsonLine {
                timestamp: config
                    .timestamps
                    .then(|| chrono::Utc::now().to_rfc3339()),
                level: level.as_str(),
                target,
                message,
                fields: fields
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), serde_json::Value::String(v.clone())))
                    .collect(),
            };
            serde_json::to_string(&line).unwrap_or_else(|_| message.to_string())
        }
        Format::Compact => {
            let mut out = String::new();
            if config.timestamps {
                out.push_str(&chrono::Local::now().format("%H:%M:%S ").to_string());
            }
            out.push_str(&level.as_str()[..1]);
            out.push(' ');
            if !target.is_empty() {
                out.push_str(target);
                out.push_str(": ");
            }
            out.push_str(message);
            for (k, v) in fields {
                out.push_str(&format!(" {}={}", k, v));
            }
            out
        }
        Format::Pretty => {
            let mut out = String::new();
            if config.timestamps {
                out.push_str(
                    &chrono::Local::now()
                        .format("%Y-%m-%d %H:%M:%S%.3f ")
                        .to_string(),
                );
            }
            out.push_str(&format!("{:5} [{}] {}", level.as_str(), target, message));
            if !fields.is_empty() {
                let rendered: Vec<String> =
                    fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                out.push_str("  ");
                out.push_str(&rendered.join(" "));
            }
            out
        }
    }
}

/// Write a message with structured fields. Used by the macros.
#[doc(hidden)]
pub fn log_with_fields(level: Level, target: &str, message: &str, fields: &[(&str, String)]) {
    if !is_level_enabled(level) {
        return;
    }
    let line = render(config(), level, target, message, fields);
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{}", line);
}

// ============================================================================
// `log` crate bridge
// ============================================================================

struct Bridge;

impl log::Log for Bridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        is_level_enabled(metadata.level().into())
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            log_with_fields(
                record.level().into(),
                record.target(),
                &record.args().to_string(),
                &[],
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static BRIDGE: Bridge = Bridge;

/// Route records emitted through the `log` facade (by dependencies such as
/// the Redis client) into this logger.
///
/// Returns `false` when another logger was installed first.
pub fn install_log_bridge() -> bool {
    init();
    let installed = log::set_logger(&BRIDGE).is_ok();
    if installed {
        log::set_max_level(current_level().to_filter());
    }
    installed
}

// ============================================================================
// Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __log_at {
    ($level:expr, target: $target:expr, $fmt:literal $(, $arg:expr)* ; $($key:ident = $val:expr),+ $(,)?) => {
        if $crate::is_level_enabled($level) {
            $crate::log_with_fields(
                $level,
                $target,
                &format!($fmt $(, $arg)*),
                &[$((stringify!($key), format!("{}", $val))),+],
            );
        }
    };
    ($level:expr, target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($level) {
            $crate::log_with_fields($level, $target, &format!($($arg)+), &[]);
        }
    };
    ($level:expr, $fmt:literal $(, $arg:expr)* ; $($key:ident = $val:expr),+ $(,)?) => {
        $crate::__log_at!($level, target: module_path!(), $fmt $(, $arg)* ; $($key = $val),+)
    };
    ($level:expr, $($arg:tt)+) => {
        $crate::__log_at!($level, target: module_path!(), $($arg)+)
    };
}

/// Log at trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => { $crate::__log_at!($crate::Level::Trace, $($arg)+) };
}

/// Log at debug level.
///
/// ```rust
/// use wicket_log::debug;
///
/// let key = "lock:abc";
/// debug!("lock acquired"; key = key);
/// debug!(target: "wicket::cache", "evicted {} entries", 2);
/// ```
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => { $crate::__log_at!($crate::Level::Debug, $($arg)+) };
}

/// Log at info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => { $crate::__log_at!($crate::Level::Info, $($arg)+) };
}

/// Log at warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => { $crate::__log_at!($crate::Level::Warn, $($arg)+) };
}

/// Log at error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => { $crate::__log_at!($crate::Level::Error, $($arg)+) };
}
