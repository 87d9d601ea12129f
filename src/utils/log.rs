//! Leveled stderr logging with macros.
//!
//! Records look like `2024-01-01 12:00:00.000 [WARN ] message`. The timestamp
//! and the level tag can be switched off at runtime through [`SHOW_TIMESTAMP`]
//! and [`SHOW_TYPE`]. The macros compile to nothing under `cfg(test)`.

use std::fmt::Display;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    fn color(self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        match self {
            Level::Warn => {
                spec.set_fg(Some(Color::Yellow)).set_bold(true);
            }
            Level::Error => {
                spec.set_fg(Some(Color::Red)).set_bold(true);
            }
            Level::Info => {}
        }
        spec
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

/// Converts days since Unix epoch to (year, month, day).
fn days_to_date(days: u64) -> (u32, u32, u32) {
    // Howard Hinnant's civil_from_days
    let z = days as i64 + 719468;
    let era = z.div_euclid(146097);
    let doe = z.rem_euclid(146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as u32, m, d)
}

/// Formats a time since the Unix epoch as `YYYY-MM-DD HH:MM:SS.mmm` (UTC).
fn format_timestamp(since_epoch: Duration) -> String {
    let secs = since_epoch.as_secs();
    let (year, month, day) = days_to_date(secs / 86400);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
        year,
        month,
        day,
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        since_epoch.subsec_millis()
    )
}

pub static SHOW_TIMESTAMP: AtomicBool = AtomicBool::new(true);
pub static SHOW_TYPE: AtomicBool = AtomicBool::new(true);

/// Writes one log record to `out`.
fn write_record<W: WriteColor>(
    out: &mut W,
    level: Level,
    message: &str,
    since_epoch: Duration,
) -> io::Result<()> {
    out.set_color(&level.color())?;
    if SHOW_TIMESTAMP.load(Ordering::Relaxed) {
        write!(out, "{} ", format_timestamp(since_epoch))?;
    }
    if SHOW_TYPE.load(Ordering::Relaxed) {
        write!(out, "[{:5}] ", level)?;
    }
    writeln!(out, "{}", message)?;
    out.reset()
}

/// Internal logging function. Use the `info!`, `warn!`, or `error!` macros instead.
#[doc(hidden)]
pub fn log(level: Level, message: &str) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    // Nowhere left to report a failing stderr.
    let _ = write_record(&mut stderr, level, message, now);
}

/// Logs an info-level message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Info, &format!($($arg)*))
        }
    }};
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Warn, &format!($($arg)*))
        }
    }};
}

/// Logs an error-level message.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Error, &format!($($arg)*))
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    #[test]
    fn level_ordering() {
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_display_pads_to_five() {
        assert_eq!(format!("[{:5}]", Level::Info), "[INFO ]");
        assert_eq!(format!("[{:5}]", Level::Warn), "[WARN ]");
        assert_eq!(format!("[{:5}]", Level::Error), "[ERROR]");
    }

    #[test]
    fn days_to_date_epoch() {
        assert_eq!(days_to_date(0), (1970, 1, 1));
    }

    #[test]
    fn days_to_date_leap_day() {
        // 2024-02-29 is 19782 days after epoch
        assert_eq!(days_to_date(19782), (2024, 2, 29));
    }

    #[test]
    fn timestamp_has_millisecond_precision() {
        let t = Duration::from_millis(19723 * 86_400_000 + 3_723_045);
        assert_eq!(format_timestamp(t), "2024-01-01 01:02:03.045");
    }

    #[test]
    fn record_has_timestamp_level_and_message() {
        let mut out = Buffer::no_color();
        write_record(&mut out, Level::Warn, "unknown instruction", Duration::ZERO).unwrap();
        assert_eq!(
            String::from_utf8(out.into_inner()).unwrap(),
            "1970-01-01 00:00:00.000 [WARN ] unknown instruction\n"
        );
    }
}
