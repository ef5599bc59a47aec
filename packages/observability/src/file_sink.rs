//! Append-only JSONL log file.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Shared handle to an open log file.
///
/// Writes go through a line buffer so each record lands as one append.
#[derive(Clone)]
pub struct LogFile {
    inner: Arc<Mutex<LineWriter<File>>>,
}

impl LogFile {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(LineWriter::new(file))),
        })
    }
}

/// Writer handed out per event by [`LogFile`].
pub struct LogFileWriter {
    inner: Arc<Mutex<LineWriter<File>>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("logs").join("confirms.jsonl");

        LogFile::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_writes_append_to_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("confirms.jsonl");
        std::fs::write(&path, "first\n").unwrap();

        let file = LogFile::open(&path).unwrap();
        file.make_writer().write_all(b"second\n").unwrap();
        file.make_writer().write_all(b"third\n").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\nthird\n");
    }
}
