//! Media library directory access.
//!
//! The library is a plain directory of media files. It is the authoritative
//! set of selectable content: every coordinator operation that names a file
//! validates it against this directory at the moment of the request. Nothing
//! here is cached beyond a single call.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Errors from library directory operations.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("path escapes the library: {0}")]
    Forbidden(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad media category, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Other,
}

impl MediaKind {
    /// Classify a filename by its extension.
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "mp4" | "avi" | "mov" | "wmv" | "webm" | "mkv" | "ogg" => MediaKind::Video,
            "mp3" | "wav" | "aac" | "flac" => MediaKind::Audio,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "svg" => MediaKind::Image,
            _ => MediaKind::Other,
        }
    }
}

/// MIME type for a filename, for the display endpoint.
pub fn mime_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "video/ogg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}

/// Strip any path components, keeping only the final name.
pub fn base_name(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

/// Sanitize an upload filename.
///
/// Drops path components, then keeps only letters, digits, dots, dashes,
/// underscores, spaces, and parentheses. The selection store's `|` delimiter
/// can therefore never appear in a stored name. Returns an empty string if
/// nothing survives.
pub fn sanitize_file_name(raw: &str) -> String {
    base_name(raw)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ' | '(' | ')'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize a preset slot key, keeping only identifier-safe characters.
pub fn sanitize_slot_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect()
}

/// One file in the library, computed on demand by [`Library::list`].
#[derive(Debug, Clone, Serialize)]
pub struct LibraryEntry {
    /// Filename relative to the library root.
    pub name: String,

    /// File size in bytes.
    pub size_bytes: u64,

    /// Last modification time (unix seconds).
    pub modified_at: u64,

    /// Media category derived from the extension.
    pub kind: MediaKind,
}

/// Handle to the library directory.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the library directory if it does not exist yet.
    pub async fn ensure_exists(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Resolve a filename to a path inside the library.
    ///
    /// The name must be a bare filename: anything still carrying a path
    /// separator or `..` is a traversal attempt and is rejected as
    /// [`LibraryError::Forbidden`]. Hidden (dot-prefixed) names and names
    /// that do not exist as a regular file are [`LibraryError::NotFound`].
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LibraryError> {
        if name.is_empty() {
            return Err(LibraryError::NotFound(name.to_string()));
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(LibraryError::Forbidden(name.to_string()));
        }
        // The selection store delimiter can never be stored in a record.
        if name.contains('|') {
            return Err(LibraryError::Forbidden(name.to_string()));
        }
        // Hidden entries are invisible to listings (OS markers, in-flight
        // upload partials) and must be unresolvable too, or a half-written
        // `.part` file could be selected mid-transfer.
        if name.starts_with('.') {
            return Err(LibraryError::NotFound(name.to_string()));
        }

        let path = self.root.join(name);
        if !path.is_file() {
            return Err(LibraryError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Whether a bare filename currently resolves to a library file.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// List the library, excluding hidden entries and non-files.
    ///
    /// Dotfiles cover both OS markers (`.DS_Store`) and in-flight upload
    /// partials (`.<name>.part`), so neither ever surfaces to callers.
    pub async fn list(&self) -> std::io::Result<Vec<LibraryEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.starts_with('.') {
                continue;
            }

            // A file can vanish between read_dir and stat; skip it rather
            // than failing the whole listing.
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !meta.is_file() {
                continue;
            }

            let modified_at = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);

            entries.push(LibraryEntry {
                kind: MediaKind::from_name(&name),
                size_bytes: meta.len(),
                modified_at,
                name,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Delete a file from the library.
    ///
    /// The name is validated exactly as [`Library::resolve`] does, so a
    /// traversal attempt fails before any filesystem mutation.
    pub async fn delete(&self, name: &str) -> Result<(), LibraryError> {
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path).await?;
        debug!(file = %name, "deleted library file");
        Ok(())
    }
}
