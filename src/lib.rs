pub mod agent_core;
pub mod fitness;
pub mod inference;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use agent_core::{CoachAgent, ConversationSession, TurnRequest, TurnResult};
pub use settings::AgentSettings;

/// Log file name inside the data directory.
const LOG_FILE: &str = "repcoach.log";

/// Rotated log files kept next to the current one.
const LOG_FILES_KEPT: u32 = 3;

/// Return the platform-standard data directory for RepCoach.
///
/// - macOS: `~/Library/Application Support/com.repcoach/`
/// - Windows: `{FOLDERID_RoamingAppData}\com.repcoach\`
/// - Linux: `$XDG_DATA_HOME/com.repcoach/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.repcoach/` only if none of the above can be resolved.
pub fn data_dir() -> std::path::PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("com.repcoach");
    }
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".repcoach")
}

/// Initialize the tracing subscriber, writing to `repcoach.log` in the data
/// directory.
///
/// On each start the existing logs are rotated (`repcoach.log` → `.1` → `.2`
/// → `.3`) and a fresh file is opened behind a line-flushing writer. With
/// `json` set, events are written as one JSON object per line.
pub fn init_tracing(json: bool) -> std::io::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(LOG_FILE);
    rotate_log_file(&log_path, LOG_FILES_KEPT);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let writer = FlushingWriter::new(log_file);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("repcoach=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== RepCoach starting ==="
    );
    Ok(())
}

/// Rotate log files: `repcoach.log` → `repcoach.log.1` → … → `.{keep}`.
///
/// The oldest file beyond `keep` is deleted. Missing files are skipped.
fn rotate_log_file(base_path: &std::path::Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A file writer that flushes after every write, so each log line is on disk
/// even if the process dies mid-turn.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_log_file_shifts_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(LOG_FILE);
        std::fs::write(&base, "current").unwrap();
        std::fs::write(format!("{}.1", base.display()), "one").unwrap();
        std::fs::write(format!("{}.3", base.display()), "three").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        let read = |suffix: u32| std::fs::read_to_string(format!("{}.{suffix}", base.display())).ok();
        assert_eq!(read(1).as_deref(), Some("current"));
        assert_eq!(read(2).as_deref(), Some("one"));
        assert_eq!(read(3), None);
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        use std::io::Write;

        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = FlushingWriter::new(file.reopen().unwrap());
        writer.write_all(b"line one\n").unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "line one\n");
    }
}
