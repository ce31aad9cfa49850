//! File-backed cursor store.
//!
//! Each collection's cursor lives in its own CBOR file inside one
//! directory. Writes go to a temporary sibling first, are synced, and then
//! renamed over the old file, so a crash leaves either the old cursor or the
//! new one, never a torn write. The directory is synced after the rename.
//!
//! The async [`CursorStore`] methods run the file I/O on tokio's blocking
//! pool.

use crate::error::{SyncError, SyncResult};
use crate::store::CursorStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tidemark_protocol::Cursor;
use tracing::debug;

const EXTENSION: &str = "cursor";
const FORMAT_VERSION: u16 = 1;

/// On-disk envelope. Keeps the real collection name, since file names are
/// sanitized.
#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    format: u16,
    collection: String,
    cursor: Cursor,
}

/// Cursor store keeping one file per collection.
///
/// Clones share the same directory and write lock.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileCursorStore {
    /// Opens a store in an existing directory.
    pub fn open(dir: &Path) -> SyncResult<Self> {
        if !dir.is_dir() {
            return Err(SyncError::CursorStore(format!(
                "cursor directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Opens a store, creating the directory if needed.
    pub fn open_with_create_dirs(dir: &Path) -> SyncResult<Self> {
        fs::create_dir_all(dir)?;
        Self::open(dir)
    }

    /// Returns the directory holding the cursor files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path used for a collection.
    pub fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", file_stem(collection)))
    }

    /// Loads a cursor without going through the async trait.
    pub fn load_sync(&self, collection: &str) -> SyncResult<Option<Cursor>> {
        let path = self.path_for(collection);
        match read_file(&path) {
            Ok(file) if file.collection == collection => Ok(Some(file.cursor)),
            Ok(file) => Err(SyncError::CursorStore(format!(
                "{} holds the cursor of '{}', not '{collection}'",
                path.display(),
                file.collection
            ))),
            Err(SyncError::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Saves a cursor atomically without going through the async trait.
    pub fn save_sync(&self, collection: &str, cursor: &Cursor) -> SyncResult<()> {
        let _lock = self.write_lock.lock();
        let path = self.path_for(collection);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let envelope = CursorFile {
            format: FORMAT_VERSION,
            collection: collection.to_string(),
            cursor: cursor.clone(),
        };

        let mut bytes = Vec::new();
        ciborium::into_writer(&envelope, &mut bytes)
            .map_err(|err| SyncError::Codec(err.to_string()))?;

        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        self.sync_directory()?;

        debug!(collection, path = %path.display(), last_seen = %cursor.last_seen, "saved cursor");
        Ok(())
    }

    /// Lists every stored cursor, ordered by collection name.
    pub fn list_sync(&self) -> SyncResult<Vec<(String, Cursor)>> {
        let mut cursors = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let file = read_file(&path)?;
            cursors.push((file.collection, file.cursor));
        }
        cursors.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(cursors)
    }

    /// Removes a collection's cursor. Returns false if there was none.
    pub fn remove_sync(&self, collection: &str) -> SyncResult<bool> {
        let _lock = self.write_lock.lock();
        match fs::remove_file(self.path_for(collection)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Makes the rename of a cursor file durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> SyncResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    // NTFS journals metadata; directories cannot be opened for fsync.
    #[cfg(not(unix))]
    fn sync_directory(&self) -> SyncResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self, collection: &str) -> SyncResult<Option<Cursor>> {
        let store = self.clone();
        let collection = collection.to_string();
        tokio::task::spawn_blocking(move || store.load_sync(&collection))
            .await
            .map_err(|err| SyncError::CursorStore(format!("cursor load task failed: {err}")))?
    }

    async fn save(&self, collection: &str, cursor: &Cursor) -> SyncResult<()> {
        let store = self.clone();
        let collection = collection.to_string();
        let cursor = cursor.clone();
        tokio::task::spawn_blocking(move || store.save_sync(&collection, &cursor))
            .await
            .map_err(|err| SyncError::CursorStore(format!("cursor save task failed: {err}")))?
    }
}

fn read_file(path: &Path) -> SyncResult<CursorFile> {
    let reader = BufReader::new(File::open(path)?);
    let file: CursorFile =
        ciborium::from_reader(reader).map_err(|err| SyncError::Codec(err.to_string()))?;
    if file.format != FORMAT_VERSION {
        return Err(SyncError::Codec(format!(
            "{}: unsupported cursor format {}",
            path.display(),
            file.format
        )));
    }
    Ok(file)
}

fn file_stem(collection: &str) -> String {
    collection
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tidemark_protocol::Timestamp;

    fn cursor(secs: i64, id: &str) -> Cursor {
        Cursor {
            last_seen: Timestamp::new(secs, 42),
            last_seen_id: id.into(),
            last_success: Some(Timestamp::from_secs(secs + 5)),
        }
    }

    #[test]
    fn missing_cursor_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = FileCursorStore::open(dir.path()).unwrap();
        assert_eq!(store.load_sync("events").unwrap(), None);
    }

    #[test]
    fn open_requires_directory() {
        let dir = tempdir().unwrap();
        assert!(FileCursorStore::open(&dir.path().join("missing")).is_err());
        let store = FileCursorStore::open_with_create_dirs(&dir.path().join("a/b")).unwrap();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn save_then_load_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileCursorStore::open(dir.path()).unwrap();
            store.save_sync("events", &cursor(100, "e1")).unwrap();
            store.save_sync("events", &cursor(200, "e2")).unwrap();
        }
        let store = FileCursorStore::open(dir.path()).unwrap();
        assert_eq!(store.load_sync("events").unwrap(), Some(cursor(200, "e2")));
        assert!(!dir.path().join("events.cursor.tmp").exists());
    }

    #[tokio::test]
    async fn async_store_shares_files_with_clones() {
        let dir = tempdir().unwrap();
        let store = FileCursorStore::open(dir.path()).unwrap();
        let other = store.clone();

        CursorStore::save(&store, "events", &cursor(300, "e3"))
            .await
            .unwrap();
        assert_eq!(
            CursorStore::load(&other, "events").await.unwrap(),
            Some(cursor(300, "e3"))
        );
        assert_eq!(CursorStore::load(&other, "attendance").await.unwrap(), None);
        assert!(!dir.path().join("events.cursor.tmp").exists());
    }

    #[test]
    fn list_returns_real_collection_names() {
        let dir = tempdir().unwrap();
        let store = FileCursorStore::open(dir.path()).unwrap();
        store.save_sync("users/profile", &cursor(1, "u")).unwrap();
        store.save_sync("attendance", &cursor(2, "a")).unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let listed = store.list_sync().unwrap();
        let names: Vec<&str> = listed.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["attendance", "users/profile"]);
    }

    #[test]
    fn sanitized_name_collision_is_detected() {
        let dir = tempdir().unwrap();
        let store = FileCursorStore::open(dir.path()).unwrap();
        store.save_sync("a/b", &cursor(1, "x")).unwrap();
        assert!(store.load_sync("a_b").is_err());
    }

    #[test]
    fn corrupt_file_is_a_codec_error() {
        let dir = tempdir().unwrap();
        let store = FileCursorStore::open(dir.path()).unwrap();
        fs::write(store.path_for("events"), b"\xff\x00not cbor").unwrap();
        assert!(matches!(
            store.load_sync("events"),
            Err(SyncError::Codec(_))
        ));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempdir().unwrap();
        let store = FileCursorStore::open(dir.path()).unwrap();
        store.save_sync("events", &cursor(1, "x")).unwrap();
        assert!(store.remove_sync("events").unwrap());
        assert!(!store.remove_sync("events").unwrap());
    }

    #[tokio::test]
    async fn trait_methods_delegate() {
        let dir = tempdir().unwrap();
        let store = FileCursorStore::open(dir.path()).unwrap();
        CursorStore::save(&store, "events", &cursor(7, "z")).await.unwrap();
        assert_eq!(
            CursorStore::load(&store, "events").await.unwrap(),
            Some(cursor(7, "z"))
        );
    }
}
