use crate::core::models::Session;
use crate::core::storage::{SessionStorage, StorageError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Keeps the session as a JSON file so a restart resumes signed in.
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Corruption(format!("{}: {e}", self.path.display())))
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        // Write-then-rename so a crash never leaves half a file behind.
        let mut tmp = NamedTempFile::new_in(self.dir())?;
        serde_json::to_writer(&mut tmp, session)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        serde_json::from_value(json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "refresh_token": "ref",
            "user": { "id": "7f0c2f4e-7c1a-4c55-9a59-0e6bb1d3b9a1", "email": "ada@example.com" },
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_file_means_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path().join("session.json")).unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        FileSessionStorage::new(&path).unwrap().save(&session()).unwrap();
        let loaded = FileSessionStorage::new(&path).unwrap().load().unwrap();

        assert_eq!(loaded, Some(session()));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path().join("session.json")).unwrap();
        storage.save(&session()).unwrap();

        storage.clear().unwrap();
        storage.clear().unwrap();

        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_garbage_file_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileSessionStorage::new(&path).unwrap().load().unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }
}
