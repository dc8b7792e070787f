//! Size-triggered rotating file writer: `base.log` fills up to `max_size`,
//! then gets shifted to `base.log.1` (optionally gzip-compressed), bumping
//! every existing numbered file up by one and dropping anything past
//! `max_files`.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::size::parse_size;
use crate::config::RotationConfig;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to open log file `{path}`: `{source}`")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write log file `{path}`: `{source}`")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to rotate log file `{path}`: `{source}`")]
    Rotate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid rotation size: `{0}`")]
    InvalidSize(#[from] super::size::SizeParseError),
    #[error("failed to close log file `{path}`: `{source}`")]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct RotatingWriter {
    path: PathBuf,
    max_size: u64,
    max_files: u32,
    compress: bool,
    file: File,
    written: u64,
    /// Set on the first `close()` call; repeated calls replay the same
    /// outcome instead of fsyncing again.
    closed: Option<Option<String>>,
}

impl RotatingWriter {
    pub fn open(path: impl Into<PathBuf>, config: &RotationConfig) -> Result<Self, OutputError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| OutputError::Open {
                path: path.clone(),
                source,
            })?;
        }
        let max_size = parse_size(&config.max_size)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| OutputError::Open {
                path: path.clone(),
                source,
            })?;
        let written = file
            .metadata()
            .map_err(|source| OutputError::Open {
                path: path.clone(),
                source,
            })?
            .len();
        Ok(Self {
            path,
            max_size,
            max_files: config.max_files,
            compress: config.compress,
            file,
            written,
            closed: None,
        })
    }

    pub fn write_line(&mut self, line: &[u8]) -> Result<(), OutputError> {
        if self.max_size > 0 && self.written + line.len() as u64 > self.max_size {
            self.rotate()?;
        }
        self.file
            .write_all(line)
            .and_then(|_| self.file.write_all(b"\n"))
            .map_err(|source| OutputError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.written += line.len() as u64 + 1;
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), OutputError> {
        debug!(path = %self.path.display(), "rotating log file");
        self.shift_existing()?;

        let rotated = self.numbered_path(1);
        fs::rename(&self.path, &rotated).map_err(|source| OutputError::Rotate {
            path: self.path.clone(),
            source,
        })?;

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|source| OutputError::Open {
                path: self.path.clone(),
                source,
            })?;
        self.written = 0;

        if self.compress {
            // Compression never blocks the writer and never fails the
            // rotation: a logged failure just leaves `rotated` uncompressed.
            std::thread::spawn(move || {
                if let Err(err) = compress_in_place(&rotated) {
                    tracing::warn!(path = %rotated.display(), %err, "failed to compress rotated log file");
                }
            });
        }

        Ok(())
    }

    /// Renames `base.N` to `base.N+1` for every existing rotated file,
    /// walking from the highest index down so nothing gets clobbered, and
    /// deletes whatever falls off the end past `max_files`.
    fn shift_existing(&self) -> Result<(), OutputError> {
        if self.max_files == 0 {
            return Ok(());
        }
        let oldest = self.numbered_path(self.max_files);
        if oldest.exists() || oldest_compressed(&oldest).exists() {
            let _ = fs::remove_file(&oldest);
            let _ = fs::remove_file(oldest_compressed(&oldest));
        }
        for index in (1..self.max_files).rev() {
            let from = self.numbered_path(index);
            let to = self.numbered_path(index + 1);
            for (from, to) in [
                (from.clone(), to.clone()),
                (compressed_path(&from), compressed_path(&to)),
            ] {
                if from.exists() {
                    fs::rename(&from, &to).map_err(|source| OutputError::Rotate {
                        path: from,
                        source,
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Fsyncs the underlying file and marks the writer closed. Idempotent:
    /// a second call replays the first call's outcome instead of syncing
    /// again.
    pub fn close(&mut self) -> Result<(), OutputError> {
        if let Some(outcome) = &self.closed {
            return match outcome {
                None => Ok(()),
                Some(message) => Err(OutputError::Close {
                    path: self.path.clone(),
                    source: io::Error::new(io::ErrorKind::Other, message.clone()),
                }),
            };
        }
        let result = self.file.sync_all().map_err(|source| OutputError::Close {
            path: self.path.clone(),
            source,
        });
        self.closed = Some(result.as_ref().err().map(|err| err.to_string()));
        result
    }

    fn numbered_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }
}

fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

fn oldest_compressed(path: &Path) -> PathBuf {
    compressed_path(path)
}

fn compress_in_place(path: &Path) -> io::Result<()> {
    let data = fs::read(path)?;
    let gz_path = compressed_path(path);
    let gz_file = File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(gz_file, Compression::default());
    encoder.write_all(&data)?;
    encoder.finish()?;
    fs::remove_file(path)?;
    Ok(())
}
