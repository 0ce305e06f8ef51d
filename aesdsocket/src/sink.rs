//! The durable, append-only log that accepted packets are written to.
//!
//! A session only needs two things from the log: a writer positioned at the
//! end, and a fresh reader over the whole current contents.  [`AppendSink`]
//! captures exactly that so the session can run against the real data file
//! ([`FileSink`]) or an in-memory log in tests.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Permission bits for a newly created data file.
const DATA_FILE_MODE: u32 = 0o644;

/// An append-only log that can be re-read from the start.
pub trait AppendSink {
    /// Writer that appends to the end of the log.
    fn writer(&mut self) -> &mut dyn Write;

    /// A new reader positioned at the start of the log.
    fn reader(&self) -> io::Result<Box<dyn Read + '_>>;

    /// Current length of the log in bytes.
    fn size(&self) -> io::Result<u64>;
}

/// In-memory log; handy for tests and tools.
impl AppendSink for Vec<u8> {
    fn writer(&mut self) -> &mut dyn Write {
        self
    }

    fn reader(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.as_slice()))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

/// The data file on disk, opened with append and create semantics.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Open (creating if needed) the data file at `path` for appending.
    ///
    /// Existing contents are kept; the file is never truncated.  A relative
    /// path is resolved against the current directory now, so the file can
    /// still be re-read after the process changes directory.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = std::path::absolute(path)?;
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(DATA_FILE_MODE)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the file and delete it from disk.
    pub fn remove(self) -> io::Result<()> {
        let Self { path, file } = self;
        drop(file);
        fs::remove_file(path)
    }
}

impl AppendSink for FileSink {
    fn writer(&mut self) -> &mut dyn Write {
        &mut self.file
    }

    fn reader(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
