use crate::config::{ApiKey, CREDENTIAL_KEY};
use crate::credential::{CredentialError, CredentialStore};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const LOG_TARGET: &str = "credential::file";

type Entries = BTreeMap<String, String>;

/// Durable key-value file holding the credential under
/// [`CREDENTIAL_KEY`]. Other entries in the file are left untouched.
///
/// The file is read on first use and cached; `set` and `clear` write
/// through to disk.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: RwLock<Option<Entries>>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Entries, CredentialError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Entries::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|source| CredentialError::Format {
                path: self.path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn persist(&self, entries: &Entries) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let text = serde_json::to_string_pretty(entries).map_err(|source| CredentialError::Format {
            path: self.path.display().to_string(),
            source,
        })?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).map_err(|e| self.io_error(e))?;
        restrict_permissions(&tmp).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut Entries)) -> Result<(), CredentialError> {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut entries = match guard.take() {
            Some(entries) => entries,
            None => match self.load() {
                Ok(entries) => entries,
                // An unreadable file must not block overwriting or removing the key.
                Err(e @ CredentialError::Format { .. }) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "discarding corrupt store");
                    Entries::new()
                }
                Err(e) => return Err(e),
            },
        };
        apply(&mut entries);
        self.persist(&entries)?;
        *guard = Some(entries);
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<ApiKey>, CredentialError> {
        {
            let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entries) = guard.as_ref() {
                return Ok(credential_from(entries));
            }
        }

        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let loaded = self.load()?;
            tracing::debug!(target: LOG_TARGET, path = %self.path.display(), entries = loaded.len(), "store loaded");
            *guard = Some(loaded);
        }
        Ok(guard.as_ref().and_then(credential_from))
    }

    fn set(&self, key: ApiKey) -> Result<(), CredentialError> {
        self.update(|entries| {
            entries.insert(CREDENTIAL_KEY.to_owned(), key.expose().to_owned());
        })?;
        tracing::info!(target: LOG_TARGET, path = %self.path.display(), "credential saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        self.update(|entries| {
            entries.remove(CREDENTIAL_KEY);
        })?;
        tracing::info!(target: LOG_TARGET, path = %self.path.display(), "credential removed");
        Ok(())
    }
}

fn credential_from(entries: &Entries) -> Option<ApiKey> {
    entries
        .get(CREDENTIAL_KEY)
        .and_then(|value| ApiKey::new(value.as_str()).ok())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_no_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("store.json"));
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn set_then_get_survives_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileCredentialStore::new(&path);
        store.set(ApiKey::new("sk-durable").unwrap()).unwrap();
        assert_eq!(store.get().unwrap().unwrap().expose(), "sk-durable");

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.get().unwrap().unwrap().expose(), "sk-durable");

        let raw: Entries = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get("openai_api_key").map(String::as_str), Some("sk-durable"));
    }

    #[test]
    fn clear_removes_only_the_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"openai_api_key":"sk-old","theme":"rose"}"#).unwrap();

        let store = FileCredentialStore::new(&path);
        assert_eq!(store.get().unwrap().unwrap().expose(), "sk-old");
        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());

        let raw: Entries = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(!raw.contains_key("openai_api_key"));
        assert_eq!(raw.get("theme").map(String::as_str), Some("rose"));
    }

    #[test]
    fn blank_stored_value_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"openai_api_key":"  "}"#).unwrap();
        assert!(FileCredentialStore::new(&path).get().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileCredentialStore::new(&path).get().unwrap_err();
        assert!(matches!(err, CredentialError::Format { .. }), "{err}");
    }

    #[test]
    fn corrupt_file_can_still_be_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileCredentialStore::new(&path);
        store.set(ApiKey::new("sk-new").unwrap()).unwrap();
        assert_eq!(store.get().unwrap().unwrap().expose(), "sk-new");
        assert_eq!(
            FileCredentialStore::new(&path).get().unwrap().unwrap().expose(),
            "sk-new"
        );
    }

    #[test]
    fn corrupt_file_can_still_be_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileCredentialStore::new(&path);
        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
        let raw: Entries = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        FileCredentialStore::new(&path)
            .set(ApiKey::new("sk-private").unwrap())
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
