//! File-resident state stores.
//!
//! Two independent stores back the coordinator:
//!
//! - the **selection store**, a single `<filename>|<token>` text record
//!   naming the file currently designated for display, and
//! - the **preset store**, a JSON object mapping named slots to filenames
//!   plus the reserved `path` field holding the library base path.
//!
//! Both stores replace their file wholesale on every write (write to a
//! temp sibling, then rename into place), so a concurrent reader sees
//! either the old complete value or the new complete value, never a mix.
//! Writes are serialized by a per-store async mutex; reads never take the
//! lock.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Errors from store reads and writes.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("selection record is malformed: {0}")]
    Corrupt(String),

    #[error("preset config is malformed: {0}")]
    ConfigCorrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Reserved key in the preset file holding the library base path.
const PATH_KEY: &str = "path";

/// Write `contents` to `path` atomically via a temp sibling.
async fn replace_file(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// === Selection store ===

/// The current selection: which file, and a change token readers compare.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRecord {
    /// Filename inside the library; empty means nothing selected.
    pub filename: String,

    /// Opaque token that changes on every write (millisecond timestamp,
    /// bumped when the clock has not advanced).
    pub token: u64,
}

impl SelectionRecord {
    pub fn is_empty(&self) -> bool {
        self.filename.is_empty()
    }
}

/// Persistent store for the [`SelectionRecord`].
pub struct SelectionStore {
    path: PathBuf,
    /// Guards writes and the last-issued token. Held only for the duration
    /// of a write; reads go straight to the file.
    write_state: Mutex<u64>,
}

impl SelectionStore {
    /// Open the store, seeding the token watermark from any existing record.
    pub fn open(path: PathBuf) -> Result<Self> {
        let last = match std::fs::read_to_string(&path) {
            Ok(contents) => parse_record(&contents)?.token,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            write_state: Mutex::new(last),
        })
    }

    /// Read the current record.
    ///
    /// A missing or empty file is the well-defined empty record; malformed
    /// non-empty content is [`StoreError::Corrupt`].
    pub async fn read(&self) -> Result<SelectionRecord> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => parse_record(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SelectionRecord::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the record with `filename` and a fresh token.
    ///
    /// `requested` is a caller-supplied timestamp hint (milliseconds); the
    /// issued token is the maximum of the hint and the current clock, and
    /// always strictly exceeds the previously issued token so that pollers
    /// see every write as a distinct change.
    pub async fn write(&self, filename: &str, requested: Option<u64>) -> Result<SelectionRecord> {
        let mut last = self.write_state.lock().await;

        let base = now_millis().max(requested.unwrap_or(0));
        let token = if base > *last { base } else { *last + 1 };

        let record = SelectionRecord {
            filename: filename.to_string(),
            token,
        };
        replace_file(&self.path, &format!("{}|{}", record.filename, record.token)).await?;
        *last = token;

        debug!(file = %record.filename, token = record.token, "selection written");
        Ok(record)
    }
}

fn parse_record(contents: &str) -> Result<SelectionRecord> {
    let contents = contents.trim();
    if contents.is_empty() {
        return Ok(SelectionRecord::default());
    }

    let (filename, token) = contents
        .split_once('|')
        .ok_or_else(|| StoreError::Corrupt(format!("missing delimiter in {contents:?}")))?;

    let token = token
        .trim()
        .parse::<u64>()
        .map_err(|_| StoreError::Corrupt(format!("non-numeric token in {contents:?}")))?;

    Ok(SelectionRecord {
        filename: filename.trim().to_string(),
        token,
    })
}

// === Preset store ===

/// Named preset slots plus the library base path.
///
/// Slot order is display order only; a deterministic name ordering is used
/// in place of insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetMap {
    /// Library base path, stored alongside the presets for portability.
    pub base_path: String,
    slots: BTreeMap<String, String>,
}

impl PresetMap {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            slots: BTreeMap::new(),
        }
    }

    /// The first-run seed: default base path plus the three stock slots.
    /// Slot targets resolve lazily at activation, so these may legally
    /// point at files the operator has not uploaded yet.
    pub fn seed(base_path: impl Into<String>) -> Self {
        let mut map = Self::new(base_path);
        map.set("1", "welcome.jpg");
        map.set("2", "sample_video.mp4");
        map.set("3", "sample_audio.mp3");
        map
    }

    pub fn get(&self, slot: &str) -> Option<&str> {
        self.slots.get(slot).map(String::as_str)
    }

    pub fn set(&mut self, slot: impl Into<String>, filename: impl Into<String>) {
        self.slots.insert(slot.into(), filename.into());
    }

    pub fn slots(&self) -> impl Iterator<Item = (&str, &str)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(PATH_KEY.into(), self.base_path.clone().into());
        for (slot, file) in &self.slots {
            map.insert(slot.clone(), file.clone().into());
        }
        serde_json::Value::Object(map)
    }

    fn from_json(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(StoreError::ConfigCorrupt("not a JSON object".into()));
        };

        let mut presets = PresetMap::new("");
        for (key, value) in map {
            let serde_json::Value::String(value) = value else {
                return Err(StoreError::ConfigCorrupt(format!(
                    "field {key:?} is not a string"
                )));
            };
            if key == PATH_KEY {
                presets.base_path = value;
            } else {
                presets.set(key, value);
            }
        }

        if presets.base_path.is_empty() {
            return Err(StoreError::ConfigCorrupt(format!("missing {PATH_KEY:?} field")));
        }
        Ok(presets)
    }
}

/// Persistent store for the [`PresetMap`].
pub struct PresetStore {
    path: PathBuf,
    default_base: String,
    write_lock: Mutex<()>,
}

impl PresetStore {
    pub fn open(path: PathBuf, default_base: String) -> Self {
        Self {
            path,
            default_base,
            write_lock: Mutex::new(()),
        }
    }

    /// Seed the store with the default map if no file exists yet.
    ///
    /// Only a *missing* file is seeded. An unreadable or malformed file is
    /// an error: regenerating defaults over it would silently destroy the
    /// operator's configuration.
    pub async fn init(&self) -> Result<()> {
        match tokio::fs::try_exists(&self.path).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                let seed = PresetMap::seed(self.default_base.clone());
                self.write_all(&seed).await?;
                info!(path = %self.path.display(), "seeded default preset config");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the preset map.
    ///
    /// A missing file yields the default seed map; anything unparsable is
    /// [`StoreError::ConfigCorrupt`], surfaced rather than papered over.
    pub async fn read(&self) -> Result<PresetMap> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let value = serde_json::from_str(&contents)
                    .map_err(|e| StoreError::ConfigCorrupt(e.to_string()))?;
                PresetMap::from_json(value)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(PresetMap::seed(self.default_base.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the stored map wholesale.
    pub async fn write_all(&self, map: &PresetMap) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let contents = serde_json::to_string_pretty(&map.to_json())
            .map_err(|e| StoreError::ConfigCorrupt(e.to_string()))?;
        replace_file(&self.path, &contents).await?;

        debug!(slots = map.len(), "preset config written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn selection_empty_until_first_write() {
        let dir = tempdir().unwrap();
        let store = SelectionStore::open(dir.path().join("selection.txt")).unwrap();

        let record = store.read().await.unwrap();
        assert!(record.is_empty());
        assert_eq!(record.token, 0);
    }

    #[tokio::test]
    async fn selection_round_trip() {
        let dir = tempdir().unwrap();
        let store = SelectionStore::open(dir.path().join("selection.txt")).unwrap();

        let written = store.write("welcome.jpg", None).await.unwrap();
        let read = store.read().await.unwrap();
        assert_eq!(read, written);
        assert_eq!(read.filename, "welcome.jpg");
        assert!(read.token > 0);
    }

    #[tokio::test]
    async fn selection_token_always_advances() {
        let dir = tempdir().unwrap();
        let store = SelectionStore::open(dir.path().join("selection.txt")).unwrap();

        let first = store.write("a.jpg", None).await.unwrap();
        let second = store.write("a.jpg", None).await.unwrap();
        assert!(second.token > first.token);
    }

    #[tokio::test]
    async fn selection_token_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("selection.txt");

        let first = {
            let store = SelectionStore::open(path.clone()).unwrap();
            store.write("a.jpg", Some(u64::MAX / 2)).await.unwrap()
        };

        let store = SelectionStore::open(path).unwrap();
        let second = store.write("b.jpg", None).await.unwrap();
        assert!(second.token > first.token);
    }

    #[tokio::test]
    async fn selection_rejects_malformed_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("selection.txt");
        std::fs::write(&path, "no delimiter here").unwrap();

        assert!(SelectionStore::open(path.clone()).is_err());

        std::fs::write(&path, "a.jpg|not-a-number").unwrap();
        assert!(SelectionStore::open(path).is_err());
    }

    #[tokio::test]
    async fn preset_round_trip() {
        let dir = tempdir().unwrap();
        let store = PresetStore::open(dir.path().join("config.json"), "./media".into());

        let mut map = PresetMap::new("./media");
        map.set("1", "x.jpg");
        map.set("evening", "y.mp4");

        store.write_all(&map).await.unwrap();
        assert_eq!(store.read().await.unwrap(), map);
    }

    #[tokio::test]
    async fn preset_missing_file_yields_seed() {
        let dir = tempdir().unwrap();
        let store = PresetStore::open(dir.path().join("config.json"), "./media".into());

        let map = store.read().await.unwrap();
        assert_eq!(map.base_path, "./media");
        assert_eq!(map.get("1"), Some("welcome.jpg"));
    }

    #[tokio::test]
    async fn preset_init_seeds_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = PresetStore::open(path.clone(), "./media".into());

        store.init().await.unwrap();
        assert!(path.exists());

        // A second init must not overwrite operator edits.
        let mut map = store.read().await.unwrap();
        map.set("1", "custom.png");
        store.write_all(&map).await.unwrap();
        store.init().await.unwrap();
        assert_eq!(store.read().await.unwrap().get("1"), Some("custom.png"));
    }

    #[tokio::test]
    async fn preset_corruption_is_surfaced_not_defaulted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = PresetStore::open(path.clone(), "./media".into());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(store.read().await, Err(StoreError::ConfigCorrupt(_))));

        std::fs::write(&path, r#"{"path": "./media", "1": 42}"#).unwrap();
        assert!(matches!(store.read().await, Err(StoreError::ConfigCorrupt(_))));

        std::fs::write(&path, r#"{"1": "a.jpg"}"#).unwrap();
        assert!(matches!(store.read().await, Err(StoreError::ConfigCorrupt(_))));
    }
}
