use std::io::{Cursor, Read};

use async_trait::async_trait;
use tracing::debug;

use super::domain::ArchiveFile;
use crate::config::ArchiveConfig;

/// Source of decoded archive contents. The processor only depends on this seam
/// so tests can hand it in-memory archives.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Vec<ArchiveFile>, ArchiveLoadError>;
}

/// Transport-level failure while obtaining archive bytes.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to download archive from {location}: {source}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read archive at {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("archive at {location} is {size} bytes, above the {limit} byte limit")]
    TooLarge {
        location: String,
        size: u64,
        limit: u64,
    },
}

/// The fetched bytes could not be read as a zip archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive is not a valid zip file: {0}")]
    Invalid(#[from] zip::result::ZipError),
    #[error("archive expands beyond the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("archive decoding task failed: {0}")]
    Aborted(#[from] tokio::task::JoinError),
    #[error("failed to read archive entry {path}: {source}")]
    Entry {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveLoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Fetches zip archives over HTTP(S) or from the local filesystem.
#[derive(Debug, Clone)]
pub struct ArchiveLoader {
    client: reqwest::Client,
    max_bytes: Option<u64>,
}

impl ArchiveLoader {
    pub fn new(config: &ArchiveConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    pub async fn load(&self, location: &str) -> Result<Vec<ArchiveFile>, ArchiveLoadError> {
        let bytes = if is_remote(location) {
            self.download(location).await?
        } else {
            self.read_local(location).await?
        };

        debug!(location, size = bytes.len(), "archive fetched");
        let max_bytes = self.max_bytes;
        let files = tokio::task::spawn_blocking(move || unpack(&bytes, max_bytes))
            .await
            .map_err(ArchiveError::from)??;
        Ok(files)
    }

    async fn download(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let http_error = |source: reqwest::Error| FetchError::Http {
            location: location.to_string(),
            source,
        };

        let response = self
            .client
            .get(location)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(http_error)?;

        if let Some(size) = response.content_length() {
            self.check_size(location, size)?;
        }

        let bytes = response.bytes().await.map_err(http_error)?;
        self.check_size(location, bytes.len() as u64)?;
        Ok(bytes.to_vec())
    }

    async fn read_local(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let io_error = |source: std::io::Error| FetchError::Io {
            location: location.to_string(),
            source,
        };

        let metadata = tokio::fs::metadata(location).await.map_err(io_error)?;
        self.check_size(location, metadata.len())?;
        tokio::fs::read(location).await.map_err(io_error)
    }

    fn check_size(&self, location: &str, size: u64) -> Result<(), FetchError> {
        match self.max_bytes {
            Some(limit) if size > limit => Err(FetchError::TooLarge {
                location: location.to_string(),
                size,
                limit,
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ArchiveFetcher for ArchiveLoader {
    async fn fetch(&self, location: &str) -> Result<Vec<ArchiveFile>, ArchiveLoadError> {
        self.load(location).await
    }
}

fn is_remote(location: &str) -> bool {
    let lowered = location.trim_start().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

/// Upper bound on the buffer reserved up front for one entry. Declared entry
/// sizes come from the archive itself and are not trusted.
const ENTRY_PREALLOC_LIMIT: u64 = 64 * 1024;

/// Decodes every non-directory entry of a zip archive as lossy UTF-8 text.
/// `max_bytes` caps the total decompressed size across all entries.
pub fn unpack(bytes: &[u8], max_bytes: Option<u64>) -> Result<Vec<ArchiveFile>, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut files = Vec::new();
    let mut remaining = max_bytes.unwrap_or(u64::MAX);

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let path = entry.name().trim_start_matches("./").to_string();
        let mut buffer = Vec::with_capacity(entry.size().min(ENTRY_PREALLOC_LIMIT) as usize);
        let read = (&mut entry)
            .take(remaining.saturating_add(1))
            .read_to_end(&mut buffer)
            .map_err(|source| ArchiveError::Entry {
                path: path.clone(),
                source,
            })? as u64;
        if read > remaining {
            return Err(ArchiveError::TooLarge {
                limit: max_bytes.unwrap_or(u64::MAX),
            });
        }
        remaining -= read;

        files.push(ArchiveFile {
            path,
            content: String::from_utf8_lossy(&buffer).into_owned(),
        });
    }

    Ok(files)
}

#[cfg(test)]
pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, content) in entries {
        if path.ends_with('/') {
            writer
                .add_directory(*path, SimpleFileOptions::default())
                .expect("add directory");
        } else {
            writer
                .start_file(*path, SimpleFileOptions::default())
                .expect("start file");
            writer.write_all(content.as_bytes()).expect("write entry");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}
