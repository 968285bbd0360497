use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::errors::StorageError;
use crate::store::StorageBackend;

/// File-based key/value storage
///
/// Keeps every entry in a single JSON object so a write is one atomic
/// replace.
///
/// # Directory Structure
/// ```text
/// ~/.config/wallet-portal/storage/
/// ├── lock                   # Advisory lock file
/// └── storage.json           # {"wallet_portal_access_token": "..."}
/// ```
#[derive(Debug)]
pub struct FileStorage {
    data_file: PathBuf,
    lock_file: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `storage_dir`, creating it if needed
    pub fn new(storage_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&storage_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&storage_dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self {
            data_file: storage_dir.join("storage.json"),
            lock_file: storage_dir.join("lock"),
        })
    }

    /// Get default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf, StorageError> {
        let project_dirs = directories::ProjectDirs::from("", "", "wallet-portal").ok_or_else(|| {
            StorageError::Unavailable("Could not determine config directory".to_string())
        })?;

        Ok(project_dirs.config_dir().join("storage"))
    }

    fn acquire_lock(&self) -> Result<File, StorageError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        // Wait for a concurrent writer rather than dropping this write
        lock_file.lock_exclusive()?;

        Ok(lock_file)
    }

    fn load_entries(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.data_file.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.data_file)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)?;

        // Write to a temp file, then rename over the original
        let temp_path = self.data_file.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&temp_path, &self.data_file)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _lock = self.acquire_lock()?;
        let mut entries = self.load_entries()?;
        apply(&mut entries);
        self.save_entries(&entries)
    }
}

impl StorageBackend for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load_entries()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
