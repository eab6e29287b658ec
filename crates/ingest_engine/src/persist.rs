use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ingest_core::QueueSnapshot;
use ingest_logging::{ingest_debug, ingest_info};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const STATE_FILENAME: &str = "queue_state.ron";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode {what}: {message}")]
    Encode { what: &'static str, message: String },
    #[error("failed to decode {path:?}: {message}")]
    Decode { path: PathBuf, message: String },
}

/// Ensure a directory exists and is writable; create it if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: impl AsRef<[u8]>) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_ref())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        ingest_debug!("persist: wrote {:?}", target);
        Ok(target)
    }
}

/// Queue snapshot stored as RON next to the host's other state.
#[derive(Debug, Clone)]
pub struct StateFile {
    writer: AtomicFileWriter,
}

impl StateFile {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(state_dir),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.writer.dir().join(STATE_FILENAME)
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<QueueSnapshot>, PersistError> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot: QueueSnapshot =
            ron::from_str(&content).map_err(|err| PersistError::Decode {
                path: path.clone(),
                message: err.to_string(),
            })?;
        ingest_info!(
            "persist: loaded {} entries and {} file stubs from {:?}",
            snapshot.entries.len(),
            snapshot.stubs.len(),
            path
        );
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &QueueSnapshot) -> Result<PathBuf, PersistError> {
        let pretty = ron::ser::PrettyConfig::new();
        let content =
            ron::ser::to_string_pretty(snapshot, pretty).map_err(|err| PersistError::Encode {
                what: "queue snapshot",
                message: err.to_string(),
            })?;
        self.writer.write(STATE_FILENAME, content)
    }
}
