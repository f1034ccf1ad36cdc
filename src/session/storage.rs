//! Durable storage for the single bearer token.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use secrecy::{ExposeSecret, SecretString};

use crate::error::StorageError;

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<SecretString>, StorageError>;
    fn save(&self, token: &SecretString) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// Token kept in one owner-only file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }

    #[cfg(unix)]
    fn check_mode(&self, file: &std::fs::File) -> Result<(), StorageError> {
        let mode = file.metadata().map_err(|e| self.io_error(e))?.permissions().mode() & 0o777;
        if mode != 0o600 {
            return Err(StorageError::InsecurePermissions {
                path: self.path.clone(),
                mode,
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_mode(&self, _file: &std::fs::File) -> Result<(), StorageError> {
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<SecretString>, StorageError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        // Fail closed on a token file other users can read.
        self.check_mode(&file)?;

        let raw = std::io::read_to_string(file).map_err(|e| self.io_error(e))?;
        let token = raw.trim();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(SecretString::from(token.to_string())))
    }

    fn save(&self, token: &SecretString) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut open_opts = OpenOptions::new();
        open_opts.create(true).write(true).truncate(true);
        #[cfg(unix)]
        open_opts.mode(0o600);
        let mut file = open_opts.open(&self.path).map_err(|e| self.io_error(e))?;
        self.check_mode(&file)?;
        file.write_all(token.expose_secret().as_bytes())
            .map_err(|e| self.io_error(e))?;
        tracing::debug!("Saved session token to {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Token kept for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<SecretString>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(SecretString::from(token.into()))),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<SecretString>, StorageError> {
        Ok(self
            .token
            .lock()
            .map(|t| t.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone()))
    }

    fn save(&self, token: &SecretString) -> Result<(), StorageError> {
        match self.token.lock() {
            Ok(mut slot) => *slot = Some(token.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(token.clone()),
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match self.token.lock() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        Ok(())
    }
}
