//! Update coordinator: the single mutation surface over the stores.
//!
//! Every control operation (select, preset activation, preset replace, file
//! deletion, upload) flows through here. The coordinator validates the
//! command against the library directory and the current stores, applies the
//! mutation atomically, and returns a typed result. A failed operation
//! leaves every store exactly as it was.
//!
//! Readers never come through the coordinator; they poll the stores (via the
//! API) on their own cadence.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::library::{base_name, sanitize_file_name, sanitize_slot_key, Library, LibraryError};
use crate::store::{PresetMap, PresetStore, SelectionRecord, SelectionStore, StoreError};

/// Default upload size ceiling: 500 MiB.
pub const DEFAULT_UPLOAD_LIMIT: u64 = 500 * 1024 * 1024;

/// Typed failure taxonomy for coordinator operations.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("no preset configured for slot {0:?}")]
    InvalidPreset(String),

    #[error("path escapes the library: {0}")]
    Forbidden(String),

    #[error("upload rejected: {0}")]
    UploadRejected(String),

    #[error("preset config is corrupt: {0}")]
    ConfigCorrupt(String),

    #[error("selection record is corrupt: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    /// Stable machine-readable code; callers branch on this, never on
    /// the message text.
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::NotFound(_) => "not_found",
            CoordinatorError::InvalidPreset(_) => "invalid_preset",
            CoordinatorError::Forbidden(_) => "forbidden",
            CoordinatorError::UploadRejected(_) => "upload_rejected",
            CoordinatorError::ConfigCorrupt(_) => "config_corrupt",
            CoordinatorError::Corrupt(_) => "corrupt",
            CoordinatorError::Io(_) => "io_error",
        }
    }
}

impl From<LibraryError> for CoordinatorError {
    fn from(e: LibraryError) -> Self {
        match e {
            LibraryError::NotFound(name) => CoordinatorError::NotFound(name),
            LibraryError::Forbidden(name) => CoordinatorError::Forbidden(name),
            LibraryError::Io(e) => CoordinatorError::Io(e),
        }
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => CoordinatorError::Io(e),
            StoreError::Corrupt(msg) => CoordinatorError::Corrupt(msg),
            StoreError::ConfigCorrupt(msg) => CoordinatorError::ConfigCorrupt(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Receipt for a committed upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Sanitized filename the file landed under.
    pub filename: String,

    /// Bytes written.
    pub size_bytes: u64,
}

/// The coordinator. Cheap to share: handlers hold it in an `Arc`.
pub struct Coordinator {
    library: Library,
    selection: SelectionStore,
    presets: PresetStore,
    upload_limit: u64,
}

impl Coordinator {
    pub fn new(
        library: Library,
        selection: SelectionStore,
        presets: PresetStore,
        upload_limit: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            library,
            selection,
            presets,
            upload_limit,
        })
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn upload_limit(&self) -> u64 {
        self.upload_limit
    }

    /// Current selection record (reader-side convenience; takes no lock).
    pub async fn current_selection(&self) -> Result<SelectionRecord> {
        Ok(self.selection.read().await?)
    }

    /// Current preset map.
    pub async fn current_presets(&self) -> Result<PresetMap> {
        Ok(self.presets.read().await?)
    }

    /// Select a file for display.
    ///
    /// Path components are stripped before validation, so only bare names
    /// inside the library can ever be selected. `requested_token` is an
    /// optional timestamp hint (milliseconds); the issued token always
    /// strictly advances regardless.
    pub async fn select_file(
        &self,
        filename: &str,
        requested_token: Option<u64>,
    ) -> Result<SelectionRecord> {
        let name = base_name(filename);
        self.library.resolve(name)?;

        let record = self.selection.write(name, requested_token).await?;
        info!(file = %record.filename, token = record.token, "selection changed");
        Ok(record)
    }

    /// Activate a named preset slot.
    ///
    /// An unknown slot is `InvalidPreset`; a slot pointing at a since-deleted
    /// file is `NotFound` naming the stale target. Stale slots are legal and
    /// stay configured (they may resolve again after a future upload).
    pub async fn activate_preset(&self, slot: &str) -> Result<SelectionRecord> {
        let presets = self.presets.read().await?;
        let target = presets
            .get(slot)
            .ok_or_else(|| CoordinatorError::InvalidPreset(slot.to_string()))?
            .to_string();

        match self.select_file(&target, None).await {
            Ok(record) => {
                info!(slot = %slot, file = %record.filename, "preset activated");
                Ok(record)
            }
            Err(e) => {
                warn!(slot = %slot, target = %target, error = %e, "preset activation failed");
                Err(e)
            }
        }
    }

    /// Replace the preset map from an arbitrary field set.
    ///
    /// Keys are sanitized to identifier-safe characters, values trimmed, and
    /// pairs empty after cleaning are dropped. This is a full replace: slots
    /// absent from `fields` are gone afterwards. Targets are deliberately not
    /// validated against the library, so presets can be configured ahead of
    /// the referenced file's upload.
    pub async fn update_presets(&self, fields: &BTreeMap<String, String>) -> Result<PresetMap> {
        let current = self.presets.read().await?;

        let mut next = PresetMap::new(current.base_path.clone());
        for (key, value) in fields {
            let slot = sanitize_slot_key(key);
            let target = value.trim();
            if slot.is_empty() || slot == "path" || target.is_empty() {
                continue;
            }
            next.set(slot, target);
        }

        self.presets.write_all(&next).await?;
        info!(slots = next.len(), "presets replaced");
        Ok(next)
    }

    /// Delete a file from the library.
    ///
    /// A current selection or preset slot pointing at the deleted file is
    /// left as-is; the stale reference surfaces as `NotFound` only if it is
    /// activated later.
    pub async fn delete_file(&self, filename: &str) -> Result<()> {
        self.library.delete(filename).await?;
        info!(file = %filename, "library file deleted");
        Ok(())
    }

    /// Start an upload into the library.
    ///
    /// All rejections (empty sanitized name, duplicate, declared size over
    /// the ceiling) happen before a single byte is committed. The returned
    /// sink streams into a hidden `.part` file and only renames it into
    /// place on [`UploadSink::finish`]; dropping the sink removes the
    /// partial, so an aborted transfer never leaves a selectable file.
    pub async fn begin_upload(
        &self,
        declared_name: &str,
        declared_size: Option<u64>,
    ) -> Result<UploadSink> {
        let filename = sanitize_file_name(declared_name);
        if filename.is_empty() {
            return Err(CoordinatorError::UploadRejected(format!(
                "no valid filename in {declared_name:?}"
            )));
        }

        if let Some(size) = declared_size {
            if size > self.upload_limit {
                return Err(CoordinatorError::UploadRejected(format!(
                    "{size} bytes exceeds the {} byte limit",
                    self.upload_limit
                )));
            }
        }

        let final_path = self.library.root().join(&filename);
        if final_path.exists() {
            return Err(CoordinatorError::UploadRejected(format!(
                "file {filename:?} already exists"
            )));
        }

        let part_path = self.library.root().join(format!(".{filename}.part"));
        let file = tokio::fs::File::create(&part_path).await?;

        Ok(UploadSink {
            file: Some(file),
            part_path,
            final_path,
            filename,
            limit: self.upload_limit,
            written: 0,
        })
    }
}

/// In-flight upload. Created by [`Coordinator::begin_upload`].
#[derive(Debug)]
pub struct UploadSink {
    file: Option<tokio::fs::File>,
    part_path: PathBuf,
    final_path: PathBuf,
    filename: String,
    limit: u64,
    written: u64,
}

impl UploadSink {
    /// Append a chunk, enforcing the size ceiling as bytes arrive.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.written += chunk.len() as u64;
        if self.written > self.limit {
            return Err(CoordinatorError::UploadRejected(format!(
                "stream exceeds the {} byte limit",
                self.limit
            )));
        }

        // File is present until finish() consumes the sink.
        let file = self.file.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "upload already finished")
        })?;
        file.write_all(chunk).await?;
        Ok(())
    }

    /// Commit: flush and rename the partial into place. Any commit failure
    /// removes the partial before the error surfaces.
    pub async fn finish(mut self) -> Result<UploadReceipt> {
        match self.commit().await {
            Ok(()) => Ok(UploadReceipt {
                filename: std::mem::take(&mut self.filename),
                size_bytes: self.written,
            }),
            Err(e) => {
                self.discard();
                Err(e)
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "upload already finished"))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        // Re-check under the final name; a concurrent upload of the same
        // name may have landed while we streamed.
        if self.final_path.exists() {
            return Err(CoordinatorError::UploadRejected(format!(
                "file {:?} already exists",
                self.filename
            )));
        }

        tokio::fs::rename(&self.part_path, &self.final_path).await?;
        info!(file = %self.filename, bytes = self.written, "upload committed");
        Ok(())
    }

    /// Drop the partial artifact.
    pub async fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        self.file = None;
        if let Err(e) = std::fs::remove_file(&self.part_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.part_path.display(), error = %e, "failed to remove upload partial");
            }
        }
    }
}

impl Drop for UploadSink {
    fn drop(&mut self) {
        // A client abort drops the request future mid-stream; the partial
        // must not survive to pass later exists checks.
        if self.file.is_some() {
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fixture(files: &[&str]) -> (tempfile::TempDir, Arc<Coordinator>) {
        let dir = tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir(&media).unwrap();
        for f in files {
            std::fs::write(media.join(f), b"media bytes").unwrap();
        }

        let library = Library::new(media.clone());
        let selection = SelectionStore::open(dir.path().join("selection.txt")).unwrap();
        let presets = PresetStore::open(
            dir.path().join("config.json"),
            media.to_string_lossy().into_owned(),
        );
        let coordinator = Coordinator::new(library, selection, presets, DEFAULT_UPLOAD_LIMIT);
        (dir, coordinator)
    }

    fn slot_fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn select_writes_record_with_fresh_token() {
        let (_dir, coord) = fixture(&["welcome.jpg"]);

        let before = coord.current_selection().await.unwrap();
        let record = coord.select_file("welcome.jpg", None).await.unwrap();
        assert_eq!(record.filename, "welcome.jpg");
        assert!(record.token > before.token);
        assert_eq!(coord.current_selection().await.unwrap(), record);
    }

    #[tokio::test]
    async fn select_missing_leaves_state_untouched() {
        let (_dir, coord) = fixture(&["welcome.jpg"]);
        coord.select_file("welcome.jpg", None).await.unwrap();
        let before = coord.current_selection().await.unwrap();

        let err = coord.select_file("ghost.png", None).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
        assert_eq!(coord.current_selection().await.unwrap(), before);
    }

    #[tokio::test]
    async fn select_strips_path_components() {
        let (_dir, coord) = fixture(&["welcome.jpg"]);

        let record = coord
            .select_file("../secret/../welcome.jpg", None)
            .await
            .unwrap();
        assert_eq!(record.filename, "welcome.jpg");
    }

    #[tokio::test]
    async fn repeated_select_advances_token() {
        let (_dir, coord) = fixture(&["a.jpg"]);

        let first = coord.select_file("a.jpg", None).await.unwrap();
        let second = coord.select_file("a.jpg", None).await.unwrap();
        assert_eq!(first.filename, second.filename);
        assert!(second.token > first.token);
    }

    #[tokio::test]
    async fn update_presets_is_full_replace() {
        let (_dir, coord) = fixture(&[]);
        coord
            .update_presets(&slot_fields(&[("old", "stale.mp4")]))
            .await
            .unwrap();

        let map = coord
            .update_presets(&slot_fields(&[
                ("a", "x.jpg"),
                ("b", ""),
                ("c", "  y.mp4  "),
                ("bad key!", "z.png"),
                ("path", "/elsewhere"),
            ]))
            .await
            .unwrap();

        assert_eq!(map.get("a"), Some("x.jpg"));
        assert_eq!(map.get("c"), Some("y.mp4"));
        assert_eq!(map.get("b"), None);
        assert_eq!(map.get("old"), None);
        // "bad key!" sanitizes to "badkey" and survives under that name.
        assert_eq!(map.get("badkey"), Some("z.png"));
        // The base path is preserved, never taken from the field set.
        assert_ne!(map.base_path, "/elsewhere");
        assert_eq!(coord.current_presets().await.unwrap(), map);
    }

    #[tokio::test]
    async fn activate_unknown_slot_is_invalid_preset() {
        let (_dir, coord) = fixture(&[]);
        let err = coord.activate_preset("nope").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidPreset(_)));
    }

    #[tokio::test]
    async fn stale_preset_is_not_found_and_selection_unmodified() {
        let (_dir, coord) = fixture(&["demo.mp4"]);
        coord
            .update_presets(&slot_fields(&[("1", "demo.mp4")]))
            .await
            .unwrap();
        coord.select_file("demo.mp4", None).await.unwrap();
        let before = coord.current_selection().await.unwrap();

        coord.delete_file("demo.mp4").await.unwrap();

        let err = coord.activate_preset("1").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(ref name) if name == "demo.mp4"));
        assert_eq!(coord.current_selection().await.unwrap(), before);
    }

    #[tokio::test]
    async fn delete_traversal_is_forbidden() {
        let (_dir, coord) = fixture(&["a.jpg"]);
        let err = coord.delete_file("../a.jpg").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Forbidden(_)));
    }

    #[tokio::test]
    async fn concurrent_selects_leave_one_coherent_winner() {
        let names = ["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"];
        let (_dir, coord) = fixture(&names);

        let mut handles = Vec::new();
        for name in names {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                coord.select_file(name, None).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let record = coord.current_selection().await.unwrap();
        assert!(names.contains(&record.filename.as_str()));
        assert!(record.token > 0);
    }

    #[tokio::test]
    async fn upload_streams_and_commits() {
        let (dir, coord) = fixture(&[]);

        let mut sink = coord.begin_upload("clips/new video.mp4", Some(10)).await.unwrap();
        sink.write_chunk(b"0123").await.unwrap();
        sink.write_chunk(b"456789").await.unwrap();
        let receipt = sink.finish().await.unwrap();

        assert_eq!(receipt.filename, "new video.mp4");
        assert_eq!(receipt.size_bytes, 10);
        let stored = dir.path().join("media").join("new video.mp4");
        assert_eq!(std::fs::read(stored).unwrap(), b"0123456789");
        // The committed file is now selectable.
        assert!(coord.select_file("new video.mp4", None).await.is_ok());
    }

    #[tokio::test]
    async fn upload_duplicate_rejected_and_original_intact() {
        let (dir, coord) = fixture(&["a.jpg"]);

        let err = coord.begin_upload("a.jpg", None).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UploadRejected(_)));
        assert_eq!(
            std::fs::read(dir.path().join("media").join("a.jpg")).unwrap(),
            b"media bytes"
        );
    }

    #[tokio::test]
    async fn upload_rejects_bad_name_and_oversize_before_bytes() {
        let (_dir, coord) = fixture(&[]);

        assert!(matches!(
            coord.begin_upload("///", None).await.unwrap_err(),
            CoordinatorError::UploadRejected(_)
        ));
        assert!(matches!(
            coord.begin_upload("big.mp4", Some(DEFAULT_UPLOAD_LIMIT + 1)).await.unwrap_err(),
            CoordinatorError::UploadRejected(_)
        ));
    }

    #[tokio::test]
    async fn aborted_upload_leaves_no_artifact() {
        let (dir, coord) = fixture(&[]);

        let mut sink = coord.begin_upload("half.mp4", None).await.unwrap();
        sink.write_chunk(b"partial").await.unwrap();
        sink.abort().await;

        let media = dir.path().join("media");
        assert!(!media.join("half.mp4").exists());
        assert!(!media.join(".half.mp4.part").exists());
        // A dropped sink (client disconnect) cleans up the same way.
        let mut sink = coord.begin_upload("drop.mp4", None).await.unwrap();
        sink.write_chunk(b"partial").await.unwrap();
        drop(sink);
        assert!(!media.join(".drop.mp4.part").exists());

        // Partial uploads never surface in listings either way.
        assert!(coord.library().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_flight_partial_is_not_selectable() {
        let (dir, coord) = fixture(&["welcome.jpg"]);
        coord.select_file("welcome.jpg", None).await.unwrap();
        let before = coord.current_selection().await.unwrap();

        let mut sink = coord.begin_upload("video.mp4", None).await.unwrap();
        sink.write_chunk(b"half of the bytes").await.unwrap();
        assert!(dir.path().join("media").join(".video.mp4.part").exists());

        // The partial exists on disk but must stay invisible to selection
        // until commit renames it into place.
        let err = coord.select_file(".video.mp4.part", None).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
        assert_eq!(coord.current_selection().await.unwrap(), before);

        sink.finish().await.unwrap();
        assert!(coord.select_file("video.mp4", None).await.is_ok());
    }

    #[tokio::test]
    async fn failed_commit_removes_partial() {
        let (dir, coord) = fixture(&[]);
        let media = dir.path().join("media");

        let mut sink = coord.begin_upload("x.mp4", None).await.unwrap();
        sink.write_chunk(b"streamed").await.unwrap();
        // A same-named file lands while the stream is in flight.
        std::fs::write(media.join("x.mp4"), b"winner").unwrap();

        let err = sink.finish().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UploadRejected(_)));
        assert!(!media.join(".x.mp4.part").exists());
        assert_eq!(std::fs::read(media.join("x.mp4")).unwrap(), b"winner");
    }

    #[tokio::test]
    async fn full_control_scenario() {
        let (_dir, coord) = fixture(&["welcome.jpg", "demo.mp4"]);

        let first = coord.select_file("welcome.jpg", None).await.unwrap();

        coord
            .update_presets(&slot_fields(&[("1", "demo.mp4")]))
            .await
            .unwrap();
        let second = coord.activate_preset("1").await.unwrap();
        assert!(second.token > first.token);
        assert_eq!(second.filename, "demo.mp4");

        coord.delete_file("demo.mp4").await.unwrap();

        let err = coord.activate_preset("1").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
        // Stale by design: the selection still names the deleted file.
        let current = coord.current_selection().await.unwrap();
        assert_eq!(current.filename, "demo.mp4");
        assert_eq!(current.token, second.token);
    }
}
