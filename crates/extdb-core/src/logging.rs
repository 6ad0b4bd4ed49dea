//! Logging pipeline.
//!
//! Log files live under `extDB/logs/<yyyy>/<mm>/<dd>/<HH-MM-SS>.log`, one
//! file per extension start, rotated once the file passes 10 MB. Writes go
//! through a non-blocking channel so worker and host threads never stall on
//! disk. The level filter comes from `Logging.Level` in the config file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::level_filters::LevelFilter;
use tracing::warn;

use crate::error::{ExtError, Result};

pub use tracing_appender::non_blocking::WorkerGuard;

/// Rotation threshold, matching the historical channel setting.
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Map a `Logging.Level` value onto a tracing filter.
///
/// Returns the filter and whether the value was recognised; unknown values
/// fall back to information and the caller logs a warning.
pub fn level_filter(level: &str) -> (LevelFilter, bool) {
    let l = level.trim();
    let filter = if l.eq_ignore_ascii_case("none") {
        LevelFilter::OFF
    } else if l.eq_ignore_ascii_case("fatal")
        || l.eq_ignore_ascii_case("critical")
        || l.eq_ignore_ascii_case("error")
    {
        LevelFilter::ERROR
    } else if l.eq_ignore_ascii_case("warning") {
        LevelFilter::WARN
    } else if l.eq_ignore_ascii_case("notice") || l.eq_ignore_ascii_case("information") {
        LevelFilter::INFO
    } else if l.eq_ignore_ascii_case("debug") {
        LevelFilter::DEBUG
    } else if l.eq_ignore_ascii_case("trace") {
        LevelFilter::TRACE
    } else {
        return (LevelFilter::INFO, false);
    };
    (filter, true)
}

/// The dated log file path for a fresh start under `base_dir`.
pub fn log_file_path(base_dir: &Path) -> PathBuf {
    let now = Local::now();
    base_dir
        .join("extDB")
        .join("logs")
        .join(now.format("%Y").to_string())
        .join(now.format("%m").to_string())
        .join(now.format("%d").to_string())
        .join(now.format("%H-%M-%S.log").to_string())
}

/// A writer that starts a new file once the current one passes `max_bytes`.
/// The previous file is kept beside it with a `.0` suffix.
struct RotatingWriter {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
}

impl RotatingWriter {
    fn create(path: PathBuf, max_bytes: u64) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
        })
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        let mut rotated = self.path.clone().into_os_string();
        rotated.push(".0");
        std::fs::rename(&self.path, rotated)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.written >= self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

/// Install the global logging pipeline and return the flush guard.
///
/// The guard must be kept alive for the lifetime of the extension; dropping
/// it flushes and closes the channel.
pub fn init(base_dir: &Path, level: &str) -> Result<WorkerGuard> {
    let (filter, recognised) = level_filter(level);
    let writer = RotatingWriter::create(log_file_path(base_dir), MAX_LOG_BYTES)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(filter)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| ExtError::Config(format!("logger init: {}", e)))?;

    if !recognised && !level.trim().is_empty() {
        warn!(value = %level, "unrecognised Logging.Level, using information");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_mapping() {
        assert_eq!(level_filter("none"), (LevelFilter::OFF, true));
        assert_eq!(level_filter("FATAL"), (LevelFilter::ERROR, true));
        assert_eq!(level_filter("critical"), (LevelFilter::ERROR, true));
        assert_eq!(level_filter("error"), (LevelFilter::ERROR, true));
        assert_eq!(level_filter("warning"), (LevelFilter::WARN, true));
        assert_eq!(level_filter("notice"), (LevelFilter::INFO, true));
        assert_eq!(level_filter("information"), (LevelFilter::INFO, true));
        assert_eq!(level_filter("debug"), (LevelFilter::DEBUG, true));
        assert_eq!(level_filter("trace"), (LevelFilter::TRACE, true));
        assert_eq!(level_filter("verbose"), (LevelFilter::INFO, false));
        assert_eq!(level_filter(""), (LevelFilter::INFO, false));
    }

    #[test]
    fn test_log_path_shape() {
        let path = log_file_path(Path::new("/srv/game"));
        let s = path.to_string_lossy().into_owned();
        assert!(s.starts_with("/srv/game/extDB/logs/"));
        assert!(s.ends_with(".log"));
        // yyyy/mm/dd between the prefix and the file name
        let tail = &s["/srv/game/extDB/logs/".len()..];
        assert_eq!(tail.split('/').count(), 4);
    }

    #[test]
    fn test_rotation_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut writer = RotatingWriter::create(path.clone(), 64).unwrap();
        let line = [b'x'; 32];
        writer.write_all(&line).unwrap();
        writer.write_all(&line).unwrap();
        // third write crosses the threshold and lands in a fresh file
        writer.write_all(&line).unwrap();
        writer.flush().unwrap();

        let rotated = dir.path().join("out.log.0");
        assert!(rotated.exists());
        assert_eq!(std::fs::metadata(&rotated).unwrap().len(), 64);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 32);
    }
}
