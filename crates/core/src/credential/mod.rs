mod file;

use crate::config::ApiKey;
use std::sync::{Arc, RwLock};

pub use file::FileCredentialStore;

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("credential store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("credential store at {path} is not a valid key-value file: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Holds at most one API credential.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Result<Option<ApiKey>, CredentialError>;

    fn set(&self, key: ApiKey) -> Result<(), CredentialError>;

    fn clear(&self) -> Result<(), CredentialError>;
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn get(&self) -> Result<Option<ApiKey>, CredentialError> {
        (**self).get()
    }

    fn set(&self, key: ApiKey) -> Result<(), CredentialError> {
        (**self).set(key)
    }

    fn clear(&self) -> Result<(), CredentialError> {
        (**self).clear()
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: RwLock<Option<ApiKey>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: ApiKey) -> Self {
        Self {
            key: RwLock::new(Some(key)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<ApiKey>, CredentialError> {
        Ok(self.key.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn set(&self, key: ApiKey) -> Result<(), CredentialError> {
        *self.key.write().unwrap_or_else(|e| e.into_inner()) = Some(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.key.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
