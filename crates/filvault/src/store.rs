//! Persistent key-value store
//!
//! Keys are strings namespaced as `"{tag}-{subkey}"` (see [`KeyTag`]); values
//! are opaque bytes. A missing key is `Ok(None)`, never an error, so callers
//! can treat first use as the normal case.
//!
//! [`FileStore`] keeps one file per key under a directory. Every write goes to
//! a temp file that is fsynced and renamed over the target, so a write is
//! either fully visible after a restart or not at all.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Result;

const TEMP_EXTENSION: &str = "tmp";

/// Namespaces used by the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTag {
    /// The encrypted mnemonic (`commonKey-encryptText`)
    CommonKey,
    /// The shared derivation counter (`filIndex-next`)
    FilIndex,
    /// Address records keyed by address
    FilAddr,
    /// Encrypted imported private keys keyed by address
    FilPriKey,
}

impl KeyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyTag::CommonKey => "commonKey",
            KeyTag::FilIndex => "filIndex",
            KeyTag::FilAddr => "filAddr",
            KeyTag::FilPriKey => "filPriKey",
        }
    }

    /// Full store key for `subkey` under this tag
    pub fn key(&self, subkey: &str) -> String {
        format!("{}-{}", self.as_str(), subkey)
    }

    fn prefix(&self) -> String {
        format!("{}-", self.as_str())
    }
}

/// Durable byte-valued map with prefix iteration
pub trait KeyValueStore: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removing a missing key is not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// All entries whose key starts with `prefix`, ordered by key
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    fn put_tagged(&self, tag: KeyTag, subkey: &str, value: &[u8]) -> Result<()> {
        self.put(&tag.key(subkey), value)
    }

    fn get_tagged(&self, tag: KeyTag, subkey: &str) -> Result<Option<Vec<u8>>> {
        self.get(&tag.key(subkey))
    }

    fn delete_tagged(&self, tag: KeyTag, subkey: &str) -> Result<()> {
        self.delete(&tag.key(subkey))
    }

    /// Entries under `tag` with the tag stripped back off the keys
    fn scan_tag(&self, tag: KeyTag) -> Result<Vec<(String, Vec<u8>)>> {
        let prefix = tag.prefix();
        Ok(self
            .scan_prefix(&prefix)?
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .map(|subkey| (subkey.to_string(), value))
            })
            .collect())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        (**self).scan_prefix(prefix)
    }
}

/// One file per key in a single directory
///
/// File names are the hex encoding of the key so any key string is a valid
/// name.
#[derive(Debug)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `base_path`
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&base_path, fs::Permissions::from_mode(0o700))?;
        }

        debug!(path = %base_path.display(), "Opened file store");
        Ok(Self { base_path })
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.base_path.join(hex::encode(key.as_bytes()))
    }

    fn sync_dir(&self) -> Result<()> {
        #[cfg(unix)]
        {
            File::open(&self.base_path)?.sync_all()?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.entry_path(key);
        let temp_path = path.with_extension(TEMP_EXTENSION);

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(value)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        self.sync_dir()
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => self.sync_dir(),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if Path::new(name).extension().is_some() {
                continue;
            }
            let Some(key) = hex::decode(name)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            else {
                continue;
            };
            if key.starts_with(prefix) {
                entries.push((key, fs::read(entry.path())?));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

/// Volatile store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
