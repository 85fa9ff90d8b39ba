//! `.env.example` generation.
//!
//! Example files mirror the keys of their sibling `.env` with blanked values,
//! so they can be committed and used for onboarding.
//!
//! # Reconcile Logic
//!
//! 1. Keys come from the `.env` file and are emitted in byte-wise order
//! 2. For each key:
//!    - If the existing example already has a line for it, keep that line verbatim
//!    - Otherwise emit `KEY=''`, carrying over any inline comment from `.env`
//! 3. Keys only present in the old example are dropped
//! 4. The example file is rewritten in full
//!
//! # Examples
//!
//! ```rust
//! use secretbase::parse::EnvFile;
//! use secretbase::template::reconcile;
//!
//! let env = EnvFile::from("B=2 # note\nA=1");
//! let lines = reconcile(&env.lines(), None);
//!
//! assert_eq!(lines, vec!["A=''", "B='' # note"]);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::{debug, info, trace};

use crate::parse::EnvFile;
use crate::walk::{self, WalkError};

const EXAMPLE_SUFFIX: &str = ".example";
const PLACEHOLDER_VALUE: &str = "''";

/// Builds the lines of an example file from the `.env` key→line mapping and
/// the key→line mapping of the current example, if there is one.
pub fn reconcile(
  env_lines: &BTreeMap<&str, &str>,
  example_lines: Option<&BTreeMap<&str, &str>>,
) -> Vec<String> {
  env_lines
    .iter()
    .map(|(key, line)| match example_lines.and_then(|example| example.get(key)) {
      Some(existing) => {
        #[cfg(feature = "tracing")]
        trace!("Keeping existing example line for {}", key);
        existing.to_string()
      }
      None => placeholder_line(key, line),
    })
    .collect()
}

/// `KEY=''`, followed by everything from the first `#` of the value, escaped
/// or not.
pub fn placeholder_line(key: &str, line: &str) -> String {
  let value_part = line.split_once('=').map(|(_, value)| value).unwrap_or("");

  match value_part.find('#') {
    Some(pos) => format!("{}={} {}", key, PLACEHOLDER_VALUE, &value_part[pos..]),
    None => format!("{}={}", key, PLACEHOLDER_VALUE),
  }
}

/// Path of the example file that belongs next to `env_path`.
pub fn example_path(env_path: &Path) -> PathBuf {
  let mut path = env_path.as_os_str().to_owned();
  path.push(EXAMPLE_SUFFIX);
  PathBuf::from(path)
}

/// Regenerates every `.env.example` below a root from its sibling `.env`.
pub struct EnvTemplate;

impl EnvTemplate {
  /// Walks `root` and rewrites the example file of each `.env` file found.
  ///
  /// Returns the processed `.env` files relative to `root`, each with a
  /// leading `/`.
  pub fn setup(root: &Path) -> Result<Vec<String>, TemplateError> {
    #[cfg(feature = "tracing")]
    info!("Generating example files under {:?}", root);

    let mut processed = Vec::new();
    for source in walk::env_files(root) {
      let source = source?;
      Self::update_example(&source.contents, &example_path(&source.path))?;

      let relative = source.path.strip_prefix(root).unwrap_or(&source.path);
      processed.push(format!("/{}", relative.to_string_lossy()));
    }

    #[cfg(feature = "tracing")]
    info!("Updated {} example files", processed.len());

    Ok(processed)
  }

  /// Reconciles one example file against the contents of its `.env` file.
  pub fn update_example(env_contents: &str, example_path: &Path) -> Result<(), TemplateError> {
    let env = EnvFile::from(env_contents);

    let example_str = if example_path.exists() {
      let content = std::fs::read_to_string(example_path).map_err(|source| TemplateError::Io {
        path: example_path.to_path_buf(),
        source,
      })?;
      Some(content)
    } else {
      None
    };
    let example = example_str.as_deref().map(EnvFile::from);
    let example_lines = example.as_ref().map(EnvFile::lines);

    let lines = reconcile(&env.lines(), example_lines.as_ref());

    #[cfg(feature = "tracing")]
    debug!("Writing {} lines to {:?}", lines.len(), example_path);

    std::fs::write(example_path, lines.join("\n")).map_err(|source| TemplateError::Io {
      path: example_path.to_path_buf(),
      source,
    })
  }
}

/// Errors raised while regenerating example files.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
  #[error(transparent)]
  Walk(#[from] WalkError),
  #[error("Example file IO error at {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
}
