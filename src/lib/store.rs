//! Persistence of projects, environments, secrets and users.
//!
//! Secrets are addressed by `(key, project name, environment type)`. The sync
//! engine only talks to the [`SecretStore`] trait; [`SqliteStore`] is the
//! relational implementation backed by `rusqlite`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{Connection, OptionalExtension, params};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::model::{EnvironmentType, ProjectSummary, Secret, UserSummary};

const SCHEMA: &str = r#"
  CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    admin INTEGER NOT NULL DEFAULT 0
  );

  CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1
  );

  CREATE TABLE IF NOT EXISTS environments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    environment_type TEXT NOT NULL
      CHECK (environment_type IN ('development', 'staging', 'production')),
    UNIQUE (project_id, environment_type)
  );

  CREATE TABLE IF NOT EXISTS secrets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL DEFAULT '.',
    creator_id INTEGER REFERENCES users(id)
  );

  CREATE TABLE IF NOT EXISTS environment_secrets (
    environment_id INTEGER NOT NULL REFERENCES environments(id) ON DELETE CASCADE,
    secret_id INTEGER NOT NULL REFERENCES secrets(id) ON DELETE CASCADE,
    PRIMARY KEY (environment_id, secret_id)
  );

  CREATE INDEX IF NOT EXISTS idx_secrets_key ON secrets(key);
"#;

/// Selects the ids of secrets in one project environment. Binds `?1` to the
/// project name and `?2` to the environment type.
const SCOPED_SECRETS: &str = "
  SELECT s.id
  FROM secrets s
  INNER JOIN environment_secrets es ON s.id = es.secret_id
  INNER JOIN environments e ON es.environment_id = e.id
  INNER JOIN projects p ON e.project_id = p.id
  WHERE p.name = ?1 AND e.environment_type = ?2";

/// CRUD operations the sync engine and the CLI need from a secret store.
///
/// Callers check [`SecretStore::project_exists`] before any operation scoped
/// to a project.
pub trait SecretStore {
  fn project_exists(&self, name: &str) -> Result<bool, StoreError>;

  /// Creates a project together with its three environments.
  fn create_project(&self, name: &str) -> Result<(), StoreError>;

  fn list_projects(&self) -> Result<Vec<ProjectSummary>, StoreError>;

  fn create_user(&self, email: &str, password: &str, admin: bool) -> Result<(), StoreError>;

  fn list_users(&self) -> Result<Vec<UserSummary>, StoreError>;

  fn secret_exists(
    &self,
    key: &str,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<bool, StoreError>;

  fn create_secret(
    &self,
    key: &str,
    value: &str,
    location: &str,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<(), StoreError>;

  /// Updates value and location. Does nothing when the secret is absent.
  fn update_secret(
    &self,
    key: &str,
    value: &str,
    location: &str,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<(), StoreError>;

  /// Deletes the secret. Does nothing when it is absent.
  fn delete_secret(
    &self,
    key: &str,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<(), StoreError>;

  fn list_secret_keys(
    &self,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<BTreeSet<String>, StoreError>;

  /// All secrets of one project environment, ordered by key.
  fn list_secrets(
    &self,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<Vec<Secret>, StoreError>;
}

impl ToSql for EnvironmentType {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.as_str()))
  }
}

/// SQLite-backed store. One connection per session.
pub struct SqliteStore {
  conn: Connection,
  creator_id: Option<i64>,
}

impl SqliteStore {
  /// Opens (or creates) the database at `path` and makes sure the schema exists.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    #[cfg(feature = "tracing")]
    debug!("Opening secret store at {:?}", path);

    let conn = Connection::open(path).map_err(|source| StoreError::Open {
      path: path.to_path_buf(),
      source,
    })?;
    Self::init(conn)
  }

  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::init(Connection::open_in_memory()?)
  }

  fn init(conn: Connection) -> Result<Self, StoreError> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn,
      creator_id: None,
    })
  }

  /// Records secrets created through this store as created by `email`.
  pub fn acting_as(mut self, email: &str) -> Result<Self, StoreError> {
    let id: i64 = self
      .conn
      .query_row(
        "SELECT id FROM users WHERE email = ?1",
        params![email],
        |row| row.get(0),
      )
      .optional()?
      .ok_or_else(|| StoreError::UnknownUser(email.to_string()))?;
    self.creator_id = Some(id);
    Ok(self)
  }

  fn environment_id(
    &self,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<i64, StoreError> {
    self
      .conn
      .query_row(
        "SELECT e.id
         FROM environments e
         INNER JOIN projects p ON e.project_id = p.id
         WHERE p.name = ?1 AND e.environment_type = ?2",
        params![project, environment],
        |row| row.get(0),
      )
      .optional()?
      .ok_or_else(|| StoreError::EnvironmentNotFound {
        project: project.to_string(),
        environment,
      })
  }
}

impl SecretStore for SqliteStore {
  fn project_exists(&self, name: &str) -> Result<bool, StoreError> {
    let count: i64 = self.conn.query_row(
      "SELECT COUNT(*) FROM projects WHERE name = ?1",
      params![name],
      |row| row.get(0),
    )?;
    Ok(count > 0)
  }

  fn create_project(&self, name: &str) -> Result<(), StoreError> {
    let tx = self.conn.unchecked_transaction()?;

    if self.project_exists(name)? {
      return Err(StoreError::ProjectExists(name.to_string()));
    }

    tx.execute(
      "INSERT INTO projects (name, active) VALUES (?1, 1)",
      params![name],
    )?;
    let project_id = tx.last_insert_rowid();

    for environment in EnvironmentType::ALL {
      tx.execute(
        "INSERT INTO environments (project_id, environment_type) VALUES (?1, ?2)",
        params![project_id, environment],
      )?;
    }

    tx.commit()?;

    #[cfg(feature = "tracing")]
    debug!("Created project {} with id {}", name, project_id);

    Ok(())
  }

  fn list_projects(&self) -> Result<Vec<ProjectSummary>, StoreError> {
    let mut stmt = self
      .conn
      .prepare("SELECT name, active FROM projects ORDER BY name")?;
    let projects = stmt
      .query_map([], |row| {
        Ok(ProjectSummary {
          name: row.get(0)?,
          active: row.get(1)?,
        })
      })?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
  }

  fn create_user(&self, email: &str, password: &str, admin: bool) -> Result<(), StoreError> {
    let existing: i64 = self.conn.query_row(
      "SELECT COUNT(*) FROM users WHERE email = ?1",
      params![email],
      |row| row.get(0),
    )?;
    if existing > 0 {
      return Err(StoreError::UserExists(email.to_string()));
    }

    self.conn.execute(
      "INSERT INTO users (email, password, admin) VALUES (?1, ?2, ?3)",
      params![email, password, admin],
    )?;
    Ok(())
  }

  fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
    let mut stmt = self
      .conn
      .prepare("SELECT email, admin FROM users ORDER BY email")?;
    let users = stmt
      .query_map([], |row| {
        Ok(UserSummary {
          email: row.get(0)?,
          admin: row.get(1)?,
        })
      })?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
  }

  fn secret_exists(
    &self,
    key: &str,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<bool, StoreError> {
    let count: i64 = self.conn.query_row(
      &format!(
        "SELECT COUNT(*) FROM secrets WHERE key = ?3 AND id IN ({})",
        SCOPED_SECRETS
      ),
      params![project, environment, key],
      |row| row.get(0),
    )?;
    Ok(count > 0)
  }

  fn create_secret(
    &self,
    key: &str,
    value: &str,
    location: &str,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<(), StoreError> {
    let environment_id = self.environment_id(project, environment)?;

    let tx = self.conn.unchecked_transaction()?;

    if self.secret_exists(key, project, environment)? {
      return Err(StoreError::SecretExists {
        key: key.to_string(),
        project: project.to_string(),
        environment,
      });
    }

    tx.execute(
      "INSERT INTO secrets (key, value, location, creator_id) VALUES (?1, ?2, ?3, ?4)",
      params![key, value, location, self.creator_id],
    )?;
    let secret_id = tx.last_insert_rowid();
    tx.execute(
      "INSERT INTO environment_secrets (environment_id, secret_id) VALUES (?1, ?2)",
      params![environment_id, secret_id],
    )?;
    tx.commit()?;

    #[cfg(feature = "tracing")]
    trace!("Inserted secret {} into {}/{}", key, project, environment);

    Ok(())
  }

  fn update_secret(
    &self,
    key: &str,
    value: &str,
    location: &str,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<(), StoreError> {
    let _updated = self.conn.execute(
      &format!(
        "UPDATE secrets SET value = ?4, location = ?5 WHERE key = ?3 AND id IN ({})",
        SCOPED_SECRETS
      ),
      params![project, environment, key, value, location],
    )?;

    #[cfg(feature = "tracing")]
    trace!("Updated {} row(s) for secret {}", _updated, key);

    Ok(())
  }

  fn delete_secret(
    &self,
    key: &str,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<(), StoreError> {
    let _deleted = self.conn.execute(
      &format!(
        "DELETE FROM secrets WHERE key = ?3 AND id IN ({})",
        SCOPED_SECRETS
      ),
      params![project, environment, key],
    )?;

    #[cfg(feature = "tracing")]
    trace!("Deleted {} row(s) for secret {}", _deleted, key);

    Ok(())
  }

  fn list_secret_keys(
    &self,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<BTreeSet<String>, StoreError> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT key FROM secrets WHERE id IN ({})",
      SCOPED_SECRETS
    ))?;
    let keys = stmt
      .query_map(params![project, environment], |row| row.get(0))?
      .collect::<Result<BTreeSet<String>, _>>()?;
    Ok(keys)
  }

  fn list_secrets(
    &self,
    project: &str,
    environment: EnvironmentType,
  ) -> Result<Vec<Secret>, StoreError> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT key, value, location FROM secrets WHERE id IN ({}) ORDER BY key",
      SCOPED_SECRETS
    ))?;
    let secrets = stmt
      .query_map(params![project, environment], |row| {
        Ok(Secret {
          key: row.get(0)?,
          value: row.get(1)?,
          location: row.get(2)?,
        })
      })?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(secrets)
  }
}

/// Errors returned by the secret store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The database could not be opened
  #[error("Failed to open database {path}: {source}")]
  Open {
    path: PathBuf,
    source: rusqlite::Error,
  },
  #[error("A project with the name '{0}' already exists")]
  ProjectExists(String),
  #[error("A user with the email '{0}' already exists")]
  UserExists(String),
  #[error("No user with the email '{0}'")]
  UnknownUser(String),
  #[error("No {environment} environment for project '{project}'")]
  EnvironmentNotFound {
    project: String,
    environment: EnvironmentType,
  },
  #[error("Secret {key} already exists in {project}/{environment}")]
  SecretExists {
    key: String,
    project: String,
    environment: EnvironmentType,
  },
  #[error("Database error: {0}")]
  Sqlite(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
  use super::*;

  const DEV: EnvironmentType = EnvironmentType::Development;

  fn store_with_project(name: &str) -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.create_project(name).unwrap();
    store
  }

  #[test]
  fn test_create_project_creates_three_environments() {
    let store = store_with_project("app");

    assert!(store.project_exists("app").unwrap());
    assert!(!store.project_exists("other").unwrap());
    for environment in EnvironmentType::ALL {
      assert!(store.environment_id("app", environment).is_ok());
    }
  }

  #[test]
  fn test_create_project_twice_fails() {
    let store = store_with_project("app");

    match store.create_project("app").unwrap_err() {
      StoreError::ProjectExists(name) => assert_eq!(name, "app"),
      other => panic!("Expected ProjectExists, got {other:?}"),
    }
    assert_eq!(store.list_projects().unwrap().len(), 1);
  }

  #[test]
  fn test_secret_lifecycle() {
    let store = store_with_project("app");

    assert!(!store.secret_exists("FOO", "app", DEV).unwrap());
    store.create_secret("FOO", "bar", ".", "app", DEV).unwrap();
    assert!(store.secret_exists("FOO", "app", DEV).unwrap());

    store.update_secret("FOO", "baz", "api", "app", DEV).unwrap();
    assert_eq!(
      store.list_secrets("app", DEV).unwrap(),
      vec![Secret {
        key: "FOO".into(),
        value: "baz".into(),
        location: "api".into(),
      }]
    );

    store.delete_secret("FOO", "app", DEV).unwrap();
    assert!(store.list_secret_keys("app", DEV).unwrap().is_empty());
    let links: i64 = store
      .conn
      .query_row("SELECT COUNT(*) FROM environment_secrets", [], |row| row.get(0))
      .unwrap();
    assert_eq!(links, 0);
  }

  #[test]
  fn test_missing_secrets_are_noops() {
    let store = store_with_project("app");

    store.update_secret("NOPE", "x", ".", "app", DEV).unwrap();
    store.delete_secret("NOPE", "app", DEV).unwrap();
    assert!(store.list_secrets("app", DEV).unwrap().is_empty());
  }

  #[test]
  fn test_secrets_are_scoped_to_environment() {
    let store = store_with_project("app");
    store.create_project("other").unwrap();

    store.create_secret("KEY", "dev", ".", "app", DEV).unwrap();
    store
      .create_secret("KEY", "prod", ".", "app", EnvironmentType::Production)
      .unwrap();
    store.create_secret("KEY", "other", ".", "other", DEV).unwrap();

    store
      .delete_secret("KEY", "app", EnvironmentType::Production)
      .unwrap();

    assert_eq!(store.list_secrets("app", DEV).unwrap()[0].value, "dev");
    assert_eq!(store.list_secrets("other", DEV).unwrap()[0].value, "other");
    assert!(
      store
        .list_secret_keys("app", EnvironmentType::Production)
        .unwrap()
        .is_empty()
    );
  }

  #[test]
  fn test_create_secret_rejects_duplicates_and_unknown_projects() {
    let store = store_with_project("app");
    store.create_secret("KEY", "1", ".", "app", DEV).unwrap();

    assert!(matches!(
      store.create_secret("KEY", "2", "web", "app", DEV),
      Err(StoreError::SecretExists { .. })
    ));
    assert!(matches!(
      store.create_secret("KEY", "1", ".", "missing", DEV),
      Err(StoreError::EnvironmentNotFound { .. })
    ));
  }

  #[test]
  fn test_users_and_creator() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.create_user("ada@example.com", "pw", true).unwrap();
    store.create_user("bob@example.com", "pw", false).unwrap();

    assert!(matches!(
      store.create_user("ada@example.com", "other", false),
      Err(StoreError::UserExists(_))
    ));
    assert_eq!(
      store.list_users().unwrap(),
      vec![
        UserSummary {
          email: "ada@example.com".into(),
          admin: true,
        },
        UserSummary {
          email: "bob@example.com".into(),
          admin: false,
        },
      ]
    );

    let store = store.acting_as("bob@example.com").unwrap();
    store.create_project("app").unwrap();
    store.create_secret("KEY", "v", ".", "app", DEV).unwrap();
    let creator: String = store
      .conn
      .query_row(
        "SELECT u.email FROM secrets s INNER JOIN users u ON s.creator_id = u.id",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(creator, "bob@example.com");

    assert!(matches!(
      store.acting_as("nobody@example.com"),
      Err(StoreError::UnknownUser(_))
    ));
  }
}
