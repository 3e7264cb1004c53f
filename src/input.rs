//! Reading the URL list file.
//!
//! One URL per line. Blank lines and lines starting with `#` are ignored and
//! surrounding whitespace is trimmed. Everything else is kept verbatim and
//! judged later by the URL filter, so a bad line still shows up in the report.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

/// Largest URL file accepted.
pub const MAX_URL_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// Errors that make the URL file unusable.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("URL file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("path is not a file: {path}")]
    NotAFile { path: PathBuf },

    #[error("URL file too large ({size} bytes, limit {limit}): {path}")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("URL file is not valid UTF-8: {path}\n  Suggestion: re-save the file with UTF-8 encoding")]
    Encoding { path: PathBuf },

    #[error("failed to read URL file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InputError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and parses a URL list file.
///
/// # Errors
///
/// Returns an [`InputError`] when the file is missing, not a regular file,
/// larger than [`MAX_URL_FILE_BYTES`], unreadable, or not UTF-8.
#[instrument(fields(path = %path.display()))]
pub fn read_url_file(path: &Path) -> Result<Vec<String>, InputError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InputError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(InputError::io(path, e)),
    };
    if !metadata.is_file() {
        return Err(InputError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    if metadata.len() > MAX_URL_FILE_BYTES {
        return Err(InputError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: MAX_URL_FILE_BYTES,
        });
    }

    let bytes = fs::read(path).map_err(|e| InputError::io(path, e))?;
    let text = String::from_utf8(bytes).map_err(|_| InputError::Encoding {
        path: path.to_path_buf(),
    })?;

    let urls = parse_url_list(&text);
    debug!(count = urls.len(), "loaded URL list");
    Ok(urls)
}

/// Extracts candidate URLs from file text, preserving order and duplicates.
#[must_use]
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
