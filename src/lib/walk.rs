//! Discovery of `.env` files below a project root.
//!
//! The walk is a plain iterator: it reads files but never touches the store,
//! so both `share` and `setup` can consume it and tests can inspect it.

use std::path::{Component, Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::trace;

use walkdir::WalkDir;

use crate::model::ROOT_LOCATION;

pub const ENV_FILE_SUFFIX: &str = ".env";

/// A `.env` file found during a walk, with its contents already read.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvSource {
  pub path: PathBuf,
  /// Parent directory relative to the walk root, `.` for the root itself.
  pub location: String,
  pub contents: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
  #[error("Failed to walk directory: {0}")]
  Walk(#[from] walkdir::Error),
  #[error("Failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
}

/// Returns true for file names ending in `.env` (`.env`, `api.env`), but not
/// `.env.example`.
pub fn is_env_file(name: &str) -> bool {
  name.ends_with(ENV_FILE_SUFFIX)
}

/// Lazily yields every `.env` file under `root`, depth first, sorted by name.
pub fn env_files(root: &Path) -> impl Iterator<Item = Result<EnvSource, WalkError>> + '_ {
  WalkDir::new(root)
    .sort_by_file_name()
    .into_iter()
    .filter_map(move |entry| {
      let entry = match entry {
        Ok(entry) => entry,
        Err(err) => return Some(Err(WalkError::from(err))),
      };

      // Follows symlinks.
      if !is_env_file(&entry.file_name().to_string_lossy()) || !entry.path().is_file() {
        return None;
      }

      #[cfg(feature = "tracing")]
      trace!("Found env file: {:?}", entry.path());

      Some(read_source(root, entry.into_path()))
    })
}

fn read_source(root: &Path, path: PathBuf) -> Result<EnvSource, WalkError> {
  let contents = std::fs::read_to_string(&path).map_err(|source| WalkError::Read {
    path: path.clone(),
    source,
  })?;
  let location = path
    .parent()
    .map(|dir| location_of(root, dir))
    .unwrap_or_else(|| ROOT_LOCATION.to_string());

  Ok(EnvSource {
    path,
    location,
    contents,
  })
}

/// Renders `dir` relative to `root` with `/` separators.
pub fn location_of(root: &Path, dir: &Path) -> String {
  let relative = dir.strip_prefix(root).unwrap_or(dir);
  let parts: Vec<_> = relative
    .components()
    .filter_map(|component| match component {
      Component::Normal(part) => Some(part.to_string_lossy()),
      _ => None,
    })
    .collect();

  if parts.is_empty() {
    ROOT_LOCATION.to_string()
  } else {
    parts.join("/")
  }
}
