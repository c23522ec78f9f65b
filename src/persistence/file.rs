//! File-backed snapshot store.
//!
//! ## File Layout
//!
//! ```text
//! ┌──────────────┬─────────────┬────────────────┬──────────────────────┐
//! │ magic (8)    │ crc32 (4)   │ length (8)     │ bincode payload      │
//! │ "BOLTKV01"   │ LE, payload │ LE, payload    │ (Snapshot)           │
//! └──────────────┴─────────────┴────────────────┴──────────────────────┘
//! ```
//!
//! Saves write to `<path>.tmp` and rename it over `<path>`, so a crash mid-save
//! leaves the previous snapshot intact.

use super::{PersistError, SnapshotStore};
use crate::storage::Snapshot;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Identifies a BoltKV snapshot file and its format version.
pub const MAGIC: &[u8; 8] = b"BOLTKV01";

const HEADER_LEN: usize = 8 + 4 + 8;

/// Stores snapshots in a single file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let payload = bincode::serialize(snapshot)?;
        let checksum = crc32fast::hash(&payload);

        let tmp = self.temp_path();
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(MAGIC)?;
            writer.write_all(&checksum.to_le_bytes())?;
            writer.write_all(&(payload.len() as u64).to_le_bytes())?;
            writer.write_all(&payload)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        info!(
            path = %self.path.display(),
            keys = snapshot.len(),
            bytes = HEADER_LEN + payload.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot = decode(&data)?;
        info!(
            path = %self.path.display(),
            keys = snapshot.len(),
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }
}

fn decode(data: &[u8]) -> Result<Snapshot, PersistError> {
    if data.len() < HEADER_LEN {
        return Err(PersistError::Corrupt(format!(
            "file is {} bytes, shorter than the header",
            data.len()
        )));
    }

    let (magic, rest) = data.split_at(8);
    if magic != MAGIC {
        return Err(PersistError::Corrupt("bad magic".to_string()));
    }

    let (crc_bytes, rest) = rest.split_at(4);
    let (len_bytes, payload) = rest.split_at(8);
    let expected_crc = u32::from_le_bytes(crc_bytes.try_into().map_err(corrupt)?);
    let expected_len = u64::from_le_bytes(len_bytes.try_into().map_err(corrupt)?);

    if payload.len() as u64 != expected_len {
        return Err(PersistError::Corrupt(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            expected_len
        )));
    }

    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(PersistError::Corrupt(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    bincode::deserialize(payload).map_err(corrupt)
}

fn corrupt(e: impl std::fmt::Display) -> PersistError {
    PersistError::Corrupt(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot
            .strings
            .insert(Bytes::from("name"), Bytes::from("Ariz"));
        snapshot.lists.insert(
            Bytes::from("queue"),
            vec![Bytes::from("a"), Bytes::from("b")],
        );
        snapshot.hashes.insert(
            Bytes::from("user"),
            HashMap::from([(Bytes::from("lang"), Bytes::from("rust"))]),
        );
        snapshot.sets.insert(
            Bytes::from("tags"),
            HashSet::from([Bytes::from("kv"), Bytes::from("db")]),
        );
        snapshot.expiry.insert(Bytes::from("name"), 4_102_444_800_000);
        snapshot
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("dump.bkv"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("dump.bkv"));

        let snapshot = sample();
        store.save(&snapshot).unwrap();

        assert!(store.path().exists());
        assert!(!store.temp_path().exists());
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_save_overwrites_previous() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("dump.bkv"));

        store.save(&sample()).unwrap();
        store.save(&Snapshot::default()).unwrap();

        assert_eq!(store.load().unwrap(), Some(Snapshot::default()));
    }

    #[test]
    fn test_file_starts_with_magic() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("dump.bkv"));
        store.save(&sample()).unwrap();

        let data = fs::read(store.path()).unwrap();
        assert_eq!(&data[..8], MAGIC);
    }

    #[test]
    fn test_flipped_byte_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("dump.bkv"));
        store.save(&sample()).unwrap();

        let mut data = fs::read(store.path()).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        fs::write(store.path(), &data).unwrap();

        assert!(matches!(store.load(), Err(PersistError::Corrupt(_))));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("dump.bkv"));
        store.save(&sample()).unwrap();

        let data = fs::read(store.path()).unwrap();
        fs::write(store.path(), &data[..data.len() - 3]).unwrap();
        assert!(matches!(store.load(), Err(PersistError::Corrupt(_))));

        fs::write(store.path(), &data[..5]).unwrap();
        assert!(matches!(store.load(), Err(PersistError::Corrupt(_))));
    }

    #[test]
    fn test_wrong_magic_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.bkv");
        fs::write(&path, b"NOTBOLT!xxxxxxxxxxxxxxxxxxxx").unwrap();

        let store = FileSnapshotStore::new(path);
        assert!(matches!(store.load(), Err(PersistError::Corrupt(_))));
    }
}
