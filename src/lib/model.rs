//! Domain types shared by the store, the sync engine and the CLI.

use std::fmt;

/// Location recorded for secrets that live in the project root `.env`.
pub const ROOT_LOCATION: &str = ".";

/// One of the three fixed environments every project owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnvironmentType {
  Development,
  Staging,
  Production,
}

impl EnvironmentType {
  /// Every environment, in the order they are created for a new project.
  pub const ALL: [EnvironmentType; 3] = [
    EnvironmentType::Development,
    EnvironmentType::Staging,
    EnvironmentType::Production,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      EnvironmentType::Development => "development",
      EnvironmentType::Staging => "staging",
      EnvironmentType::Production => "production",
    }
  }
}

impl fmt::Display for EnvironmentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A stored secret as seen by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
  pub key: String,
  pub value: String,
  /// Directory, relative to the project root, whose `.env` holds this secret.
  pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
  pub name: String,
  pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
  pub email: String,
  pub admin: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_environment_names_match_stored_type() {
    let names: Vec<_> = EnvironmentType::ALL.iter().map(|env| env.to_string()).collect();
    assert_eq!(names, vec!["development", "staging", "production"]);
  }
}
