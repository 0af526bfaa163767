use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

/// Destination for timestamped run diagnostics.
///
/// Writes are best effort: a sink that fails to record a line must not
/// affect the run that produced it.
pub trait LogSink: Send + Sync {
    fn write(&self, text: &str);
}

/// Appends `[YYYY-mm-dd HH:MM:SS] text` lines to a file.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_write(&self, text: &str) -> std::io::Result<()> {
        let line = format_line(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), text);
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    pub fn clear(&self) -> std::io::Result<()> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        fs::write(&self.path, "")
    }

    pub fn read(&self) -> std::io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

impl LogSink for FileLog {
    fn write(&self, text: &str) {
        if let Err(error) = self.try_write(text) {
            tracing::warn!(path = %self.path.display(), error = %error, "failed to write run log");
        }
    }
}

fn format_line(timestamp: &str, text: &str) -> String {
    format!("[{timestamp}] {text}\n")
}

#[cfg(test)]
mod tests {
    use super::format_line;

    #[test]
    fn line_is_bracketed_timestamp_then_text() {
        assert_eq!(
            format_line("2024-01-02 03:04:05", "retrying row 3"),
            "[2024-01-02 03:04:05] retrying row 3\n"
        );
    }
}
