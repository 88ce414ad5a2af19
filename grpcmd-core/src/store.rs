//! # Config Store
//!
//! A small key/value store persisting each key as one `<key>.json` file under the
//! per-application config directory, plus a watcher notifying changes made to it by any
//! process.
use directories::ProjectDirs;
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RemoveKind},
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

const EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("Could not determine the config directory")]
    NoConfigDir,
    #[error("Failed to create config directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid config key '{0}'")]
    InvalidKey(String),
    #[error("key not found: '{0}'")]
    NotFound(String),
    #[error("Failed to access config key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to watch config directory: {0}")]
    Watch(#[from] notify::Error),
}

/// File-backed key/value store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Opens the store in the platform config directory of grpcmd.
    pub fn open_default() -> Result<Self, ConfigStoreError> {
        let dirs = ProjectDirs::from("com", "grpcmd", "grpcmd").ok_or(ConfigStoreError::NoConfigDir)?;
        Self::open(dirs.config_dir())
    }

    /// Opens the store in `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConfigStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ConfigStoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, key: &str) -> Result<String, ConfigStoreError> {
        match fs::read_to_string(self.path(key)?) {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ConfigStoreError::NotFound(key.to_string()))
            }
            Err(source) => Err(ConfigStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), ConfigStoreError> {
        fs::write(self.path(key)?, value).map_err(|source| ConfigStoreError::Io {
            key: key.to_string(),
            source,
        })
    }

    /// Removes `key`. Removing a missing key succeeds.
    pub fn remove(&self, key: &str) -> Result<(), ConfigStoreError> {
        match fs::remove_file(self.path(key)?) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(ConfigStoreError::Io {
                key: key.to_string(),
                source: err,
            }),
            _ => Ok(()),
        }
    }

    /// Calls `on_change` with the key of every file created, written or removed in the store
    /// until the returned watcher is dropped.
    pub fn watch<F>(&self, on_change: F) -> Result<ConfigWatcher, ConfigStoreError>
    where
        F: Fn(&str) + Send + 'static,
    {
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            match event {
                Ok(event) if is_change(&event.kind) => {
                    for key in event.paths.iter().filter_map(|path| key_of(path)) {
                        on_change(key);
                    }
                }
                Ok(_) => {}
                Err(err) => tracing::warn!("Error watching config directory: {err}"),
            }
        })?;

        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %self.dir.display(), "watching config directory");

        Ok(ConfigWatcher { watcher })
    }

    fn path(&self, key: &str) -> Result<PathBuf, ConfigStoreError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(ConfigStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }
}

/// Handle on a running config watcher. Dropping it stops the watcher.
pub struct ConfigWatcher {
    watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn stop(self) {
        drop(self.watcher);
        tracing::debug!("stopped config watcher");
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
            | EventKind::Remove(RemoveKind::File | RemoveKind::Any)
    )
}

fn key_of(path: &Path) -> Option<&str> {
    if path.extension()? != EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()
}
