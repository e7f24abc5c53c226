// 📝 Logging
// Configured once at process start. Every line goes to stderr and to the log
// file as `timestamp - target - LEVEL - message`.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Rotate the log file once it grows past this size
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the log (`.1` is the newest)
pub const LOG_BACKUPS: usize = 5;

/// Copies every log line to stderr and the log file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // stderr is best effort, the file is the record
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

/// Install the global logger
pub fn init(config: &LoggingConfig) -> Result<()> {
    if let Some(parent) = config.file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    rotate_if_needed(&config.file, MAX_LOG_BYTES, LOG_BACKUPS)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)
        .with_context(|| format!("Failed to open log file: {}", config.file.display()))?;

    env_logger::Builder::new()
        .filter_level(config.level)
        .write_style(env_logger::WriteStyle::Never)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .try_init()
        .context("Logger already initialized")?;

    Ok(())
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

/// Shift `log` → `log.1` → … → `log.<backups>` when `log` exceeds `max_bytes`
///
/// Returns whether a rotation happened.
pub fn rotate_if_needed(path: &Path, max_bytes: u64, backups: usize) -> Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };
    if size <= max_bytes {
        return Ok(false);
    }

    if backups == 0 {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        return Ok(true);
    }

    let oldest = backup_path(path, backups);
    if oldest.exists() {
        fs::remove_file(&oldest).with_context(|| format!("Failed to remove {}", oldest.display()))?;
    }
    for index in (1..backups).rev() {
        let from = backup_path(path, index);
        if from.exists() {
            let to = backup_path(path, index + 1);
            fs::rename(&from, &to).with_context(|| format!("Failed to rotate {}", from.display()))?;
        }
    }
    fs::rename(path, backup_path(path, 1))
        .with_context(|| format!("Failed to rotate {}", path.display()))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_small_log_is_left_alone() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("parser_inn.log");
        fs::write(&log, "short").unwrap();

        assert!(!rotate_if_needed(&log, 100, 5).unwrap());
        assert!(log.exists());
        assert!(!rotate_if_needed(&dir.path().join("missing.log"), 100, 5).unwrap());
    }

    #[test]
    fn test_rotation_shifts_backups() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("parser_inn.log");
        fs::write(&log, "x".repeat(20)).unwrap();
        fs::write(backup_path(&log, 1), "one").unwrap();
        fs::write(backup_path(&log, 2), "two").unwrap();

        assert!(rotate_if_needed(&log, 10, 2).unwrap());

        assert!(!log.exists());
        assert_eq!(fs::read_to_string(backup_path(&log, 1)).unwrap(), "x".repeat(20));
        assert_eq!(fs::read_to_string(backup_path(&log, 2)).unwrap(), "one");
        assert!(!backup_path(&log, 3).exists());
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/var/log/parser_inn.log"), 3),
            PathBuf::from("/var/log/parser_inn.log.3")
        );
    }
}
