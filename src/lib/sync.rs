//! Secret synchronization between a store and local `.env` files.
//!
//! Every sync is scoped to one project environment, resolved once when the
//! [`SecretSync`] is built.
//!
//! # Sync Logic
//!
//! Grab (store → files):
//! 1. Fetch every secret of the environment
//! 2. Group them by location; `.` is the root `.env`, anything else `<location>/.env`
//! 3. Rewrite each file with one `KEY=VALUE` line per secret, sorted by key
//!
//! Share (files → store):
//! 1. Walk the root for `.env` files
//! 2. Create or update a secret for each variable, located at the file's directory
//! 3. Delete stored secrets that no walked file defines
//!
//! Nothing is wrapped in a transaction: a failure midway leaves the secrets
//! already written in place.
//!
//! # Examples
//!
//! ```rust,no_run
//! use secretbase::model::EnvironmentType;
//! use secretbase::store::SqliteStore;
//! use secretbase::sync::SecretSync;
//! use std::path::Path;
//!
//! let store = SqliteStore::open(Path::new("secrets.db")).unwrap();
//! let sync = SecretSync::new(&store, "my-app", EnvironmentType::Development).unwrap();
//!
//! sync.share_dir(Path::new(".")).unwrap();
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::{debug, info, trace};

use crate::model::{EnvironmentType, ROOT_LOCATION};
use crate::parse::{EnvFile, EnvVariable};
use crate::store::{SecretStore, StoreError};
use crate::walk::{self, ENV_FILE_SUFFIX, WalkError};

/// What a single create-or-update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
  Created,
  Updated,
}

/// Outcome of a directory share.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ShareReport {
  pub files: Vec<PathBuf>,
  pub created: Vec<String>,
  pub updated: Vec<String>,
  pub deleted: Vec<String>,
}

impl ShareReport {
  fn record(&mut self, key: &str, change: Change) {
    match change {
      Change::Created => self.created.push(key.to_string()),
      Change::Updated => self.updated.push(key.to_string()),
    }
  }
}

/// Synchronizes one project environment with the local filesystem.
pub struct SecretSync<'s, S: SecretStore> {
  store: &'s S,
  project: String,
  environment: EnvironmentType,
}

impl<'s, S: SecretStore> SecretSync<'s, S> {
  /// Binds the sync to a project environment, failing if the project does not
  /// exist.
  pub fn new(
    store: &'s S,
    project: impl Into<String>,
    environment: EnvironmentType,
  ) -> Result<Self, SyncError> {
    let project = project.into();
    if !store.project_exists(&project)? {
      return Err(SyncError::ProjectNotFound(project));
    }

    #[cfg(feature = "tracing")]
    debug!("Syncing {} ({})", project, environment);

    Ok(Self {
      store,
      project,
      environment,
    })
  }

  pub fn project(&self) -> &str {
    &self.project
  }

  pub fn environment(&self) -> EnvironmentType {
    self.environment
  }

  /// Writes every stored secret into the `.env` file of its location below
  /// `root`. Returns the files written, in location order.
  pub fn grab(&self, root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    #[cfg(feature = "tracing")]
    info!("Grabbing secrets for {}", self.project);

    let secrets = self.store.list_secrets(&self.project, self.environment)?;

    let mut by_location: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for secret in secrets {
      by_location
        .entry(secret.location)
        .or_default()
        .insert(secret.key, secret.value);
    }

    let mut written = Vec::with_capacity(by_location.len());
    for (location, pairs) in by_location {
      let path = env_path(root, &location)?;

      if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| SyncError::Io {
          path: dir.to_path_buf(),
          source,
        })?;
      }

      let mut file = EnvFile::default();
      for (key, value) in pairs {
        file.push(EnvVariable::new(key, value));
      }

      #[cfg(feature = "tracing")]
      debug!("Writing {} secrets to {:?}", file.entries.len(), path);

      std::fs::write(&path, file.to_string()).map_err(|source| SyncError::Io {
        path: path.clone(),
        source,
      })?;
      written.push(path);
    }

    Ok(written)
  }

  /// Creates or updates a single secret from a literal `key=value`, located
  /// at the project root. Never deletes anything.
  pub fn share_pair(&self, pair: &str) -> Result<(String, Change), SyncError> {
    let (key, value) = parse_pair(pair)?;
    let change = self.upsert(key, value, ROOT_LOCATION)?;
    Ok((key.to_string(), change))
  }

  /// Pushes every `.env` file below `root` and deletes stored secrets that
  /// none of them define.
  pub fn share_dir(&self, root: &Path) -> Result<ShareReport, SyncError> {
    #[cfg(feature = "tracing")]
    info!("Sharing secrets from {:?}", root);

    let mut report = ShareReport::default();
    let mut local_keys = BTreeSet::new();

    for source in walk::env_files(root) {
      let source = source?;

      #[cfg(feature = "tracing")]
      debug!("Processing file: {:?}", source.path);

      let env = EnvFile::from(source.contents.as_str());
      for var in env.variables() {
        local_keys.insert(var.key.to_string());
        let change = self.upsert(&var.key, &var.value, &source.location)?;
        report.record(&var.key, change);
      }
      report.files.push(source.path);
    }

    report.deleted = self.delete_unseen(&local_keys)?;

    #[cfg(feature = "tracing")]
    info!(
      "Shared {} files: {} created, {} updated, {} deleted",
      report.files.len(),
      report.created.len(),
      report.updated.len(),
      report.deleted.len()
    );

    Ok(report)
  }

  fn upsert(&self, key: &str, value: &str, location: &str) -> Result<Change, SyncError> {
    if self
      .store
      .secret_exists(key, &self.project, self.environment)?
    {
      #[cfg(feature = "tracing")]
      trace!("Updating secret {} at {}", key, location);

      self
        .store
        .update_secret(key, value, location, &self.project, self.environment)?;
      Ok(Change::Updated)
    } else {
      #[cfg(feature = "tracing")]
      trace!("Creating secret {} at {}", key, location);

      self
        .store
        .create_secret(key, value, location, &self.project, self.environment)?;
      Ok(Change::Created)
    }
  }

  fn delete_unseen(&self, local_keys: &BTreeSet<String>) -> Result<Vec<String>, SyncError> {
    let stored = self
      .store
      .list_secret_keys(&self.project, self.environment)?;

    let mut deleted = Vec::new();
    for key in stored.difference(local_keys) {
      #[cfg(feature = "tracing")]
      trace!("Deleting unused secret {}", key);

      self
        .store
        .delete_secret(key, &self.project, self.environment)?;
      deleted.push(key.clone());
    }
    Ok(deleted)
  }
}

/// Splits a literal `key=value`, trimming both sides.
pub fn parse_pair(pair: &str) -> Result<(&str, &str), SyncError> {
  match pair.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
    _ => Err(SyncError::InvalidPair(pair.to_string())),
  }
}

/// Resolves a stored location to the `.env` path it is written to.
pub fn env_path(root: &Path, location: &str) -> Result<PathBuf, SyncError> {
  if location == ROOT_LOCATION {
    return Ok(root.join(ENV_FILE_SUFFIX));
  }

  let relative = Path::new(location);
  let escapes = relative
    .components()
    .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
  if escapes {
    return Err(SyncError::InvalidLocation(location.to_string()));
  }

  Ok(root.join(relative).join(ENV_FILE_SUFFIX))
}

/// Errors that can occur while syncing secrets.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  #[error("Project '{0}' does not exist")]
  ProjectNotFound(String),
  /// The `--secret` value was not a `key=value` pair
  #[error("Invalid secret '{0}', expected key=value")]
  InvalidPair(String),
  /// A stored location points outside the project root
  #[error("Invalid secret location: {0}")]
  InvalidLocation(String),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Walk(#[from] WalkError),
  #[error("File IO error at {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Secret;
  use crate::store::SqliteStore;
  use std::fs;
  use tempfile::TempDir;

  const DEV: EnvironmentType = EnvironmentType::Development;

  fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.create_project("app").unwrap();
    store
  }

  #[test]
  fn test_new_requires_existing_project() {
    let store = store();
    match SecretSync::new(&store, "missing", DEV) {
      Err(SyncError::ProjectNotFound(name)) => assert_eq!(name, "missing"),
      _ => panic!("Expected ProjectNotFound"),
    }
  }

  #[test]
  fn test_share_pair_creates_then_updates() {
    let store = store();
    let sync = SecretSync::new(&store, "app", DEV).unwrap();

    assert_eq!(
      sync.share_pair("FOO=bar").unwrap(),
      ("FOO".to_string(), Change::Created)
    );
    assert_eq!(
      sync.share_pair(" FOO = baz ").unwrap(),
      ("FOO".to_string(), Change::Updated)
    );

    assert_eq!(
      store.list_secrets("app", DEV).unwrap(),
      vec![Secret {
        key: "FOO".into(),
        value: "baz".into(),
        location: ".".into(),
      }]
    );
  }

  #[test]
  fn test_share_pair_rejects_malformed_input() {
    let store = store();
    let sync = SecretSync::new(&store, "app", DEV).unwrap();

    assert!(matches!(sync.share_pair("novalue"), Err(SyncError::InvalidPair(_))));
    assert!(matches!(sync.share_pair("=value"), Err(SyncError::InvalidPair(_))));
    assert!(store.list_secrets("app", DEV).unwrap().is_empty());
  }

  #[test]
  fn test_parse_pair_keeps_later_equals() {
    assert_eq!(parse_pair("URL=a=b").unwrap(), ("URL", "a=b"));
    assert_eq!(parse_pair("EMPTY=").unwrap(), ("EMPTY", ""));
  }

  #[test]
  fn test_share_dir_reconciles_store() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("api")).unwrap();
    fs::write(root.join(".env"), "# root\nA=1 # first\nB=2\n").unwrap();
    fs::write(root.join("api/.env"), "C=3").unwrap();

    let store = store();
    store.create_secret("STALE", "x", ".", "app", DEV).unwrap();
    store.create_secret("B", "old", ".", "app", DEV).unwrap();

    let sync = SecretSync::new(&store, "app", DEV).unwrap();
    let report = sync.share_dir(root).unwrap();

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.created, vec!["A", "C"]);
    assert_eq!(report.updated, vec!["B"]);
    assert_eq!(report.deleted, vec!["STALE"]);

    let secrets = store.list_secrets("app", DEV).unwrap();
    let rows: Vec<_> = secrets
      .iter()
      .map(|s| (s.key.as_str(), s.value.as_str(), s.location.as_str()))
      .collect();
    assert_eq!(rows, vec![("A", "1", "."), ("B", "2", "."), ("C", "3", "api")]);
  }

  #[cfg(unix)]
  #[test]
  fn test_share_dir_keeps_keys_from_symlinked_env() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join(".env.local"), "KEEP=1\n").unwrap();
    std::os::unix::fs::symlink(".env.local", root.join(".env")).unwrap();

    let store = store();
    store.create_secret("KEEP", "0", ".", "app", DEV).unwrap();

    let report = SecretSync::new(&store, "app", DEV)
      .unwrap()
      .share_dir(root)
      .unwrap();

    assert_eq!(report.files, vec![root.join(".env")]);
    assert_eq!(report.updated, vec!["KEEP"]);
    assert!(report.deleted.is_empty());
    assert!(store.secret_exists("KEEP", "app", DEV).unwrap());
  }

  #[test]
  fn test_share_dir_leaves_other_environments_alone() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(".env"), "A=1").unwrap();

    let store = store();
    store
      .create_secret("PROD_ONLY", "x", ".", "app", EnvironmentType::Production)
      .unwrap();

    SecretSync::new(&store, "app", DEV)
      .unwrap()
      .share_dir(temp_dir.path())
      .unwrap();

    assert!(
      store
        .secret_exists("PROD_ONLY", "app", EnvironmentType::Production)
        .unwrap()
    );
  }

  #[test]
  fn test_grab_writes_sorted_files_per_location() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join(".env"), "OLD=content\n").unwrap();

    let store = store();
    store.create_secret("ZED", "26", ".", "app", DEV).unwrap();
    store.create_secret("ALPHA", "1", ".", "app", DEV).unwrap();
    store
      .create_secret("TOKEN", "abc", "services/api", "app", DEV)
      .unwrap();

    let sync = SecretSync::new(&store, "app", DEV).unwrap();
    let written = sync.grab(root).unwrap();

    assert_eq!(
      written,
      vec![root.join(".env"), root.join("services/api/.env")]
    );
    assert_eq!(
      fs::read_to_string(root.join(".env")).unwrap(),
      "ALPHA=1\nZED=26\n"
    );
    assert_eq!(
      fs::read_to_string(root.join("services/api/.env")).unwrap(),
      "TOKEN=abc\n"
    );
  }

  #[test]
  fn test_grab_with_no_secrets_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = store();

    let written = SecretSync::new(&store, "app", DEV)
      .unwrap()
      .grab(temp_dir.path())
      .unwrap();

    assert!(written.is_empty());
    assert!(!temp_dir.path().join(".env").exists());
  }

  #[test]
  fn test_env_path_rejects_escaping_locations() {
    let root = Path::new("/project");
    assert_eq!(env_path(root, ".").unwrap(), root.join(".env"));
    assert_eq!(env_path(root, "a/b").unwrap(), root.join("a/b/.env"));
    assert!(matches!(
      env_path(root, "../elsewhere"),
      Err(SyncError::InvalidLocation(_))
    ));
    assert!(matches!(
      env_path(root, "/etc"),
      Err(SyncError::InvalidLocation(_))
    ));
  }
}
