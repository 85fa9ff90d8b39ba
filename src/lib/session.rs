//! Per-invocation context handed to every command.
//!
//! A session owns the store connection and the working directory, so commands
//! never reach for process-wide state.

use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::store::{SqliteStore, StoreError};

/// Settings needed to open a session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
  /// Path of the secret database.
  pub database: Option<PathBuf>,
  /// Email of the user recorded as creator of new secrets.
  pub user: Option<String>,
  /// Directory commands operate on. If None, the current directory.
  pub root: Option<PathBuf>,
}

pub struct Session {
  store: SqliteStore,
  root: PathBuf,
}

impl Session {
  pub fn open(config: SessionConfig) -> Result<Self, SessionError> {
    let SessionConfig {
      database,
      user,
      root,
    } = config;

    let database = database.ok_or(SessionError::MissingDatabase)?;
    let root = match root {
      Some(root) => root,
      None => std::env::current_dir().map_err(SessionError::CurrentDir)?,
    };

    #[cfg(feature = "tracing")]
    debug!(?database, ?root, "Opening session");

    let mut store = SqliteStore::open(&database)?;
    if let Some(email) = user {
      store = store.acting_as(&email)?;
    }

    Ok(Self { store, root })
  }

  /// Wraps an already opened store, mainly for tests.
  pub fn with_store(store: SqliteStore, root: PathBuf) -> Self {
    Self { store, root }
  }

  pub fn store(&self) -> &SqliteStore {
    &self.store
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// The explicit name if given, otherwise the base name of the root
  /// directory. The flag tells whether the fallback was used.
  pub fn project_name(&self, explicit: Option<String>) -> Result<(String, bool), SessionError> {
    if let Some(name) = explicit.filter(|name| !name.is_empty()) {
      return Ok((name, false));
    }

    self
      .root
      .file_name()
      .map(|name| (name.to_string_lossy().into_owned(), true))
      .ok_or_else(|| SessionError::NoProjectName(self.root.clone()))
  }
}

/// Errors that prevent a session from starting or resolving its defaults.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
  #[error("No database configured, set SECRETBASE_DATABASE or pass --database")]
  MissingDatabase,
  #[error("Failed to determine current directory: {0}")]
  CurrentDir(std::io::Error),
  #[error("Cannot derive a project name from {0}")]
  NoProjectName(PathBuf),
  #[error(transparent)]
  Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_open_requires_database() {
    assert!(matches!(
      Session::open(SessionConfig::default()),
      Err(SessionError::MissingDatabase)
    ));
  }

  #[test]
  fn test_project_name_defaults_to_root_name() {
    let store = SqliteStore::open_in_memory().unwrap();
    let session = Session::with_store(store, PathBuf::from("/work/my-app"));

    assert_eq!(
      session.project_name(None).unwrap(),
      ("my-app".to_string(), true)
    );
    assert_eq!(
      session.project_name(Some("other".into())).unwrap(),
      ("other".to_string(), false)
    );
    assert_eq!(
      session.project_name(Some(String::new())).unwrap(),
      ("my-app".to_string(), true)
    );
  }

  #[test]
  fn test_open_with_unknown_user_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = SessionConfig {
      database: Some(temp_dir.path().join("secrets.db")),
      user: Some("ghost@example.com".into()),
      root: Some(temp_dir.path().to_path_buf()),
    };

    assert!(matches!(
      Session::open(config),
      Err(SessionError::Store(StoreError::UnknownUser(_)))
    ));
  }
}
