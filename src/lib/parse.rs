//! Lenient `.env` line parser.
//!
//! Every line is classified on its own. `KEY=VALUE` lines become variables,
//! keeping the trimmed source line so templates can reproduce it verbatim.
//! Blank lines, full-line comments and lines without `=` never fail the parse.

use std::{borrow::Cow, collections::BTreeMap, fmt};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

const COMMENT_PREFIX: char = '#';
const ESCAPE: char = '\\';
const ASSIGNMENT_OPERATOR: char = '=';

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvFile<'a> {
  pub entries: Vec<EnvEntry<'a>>,
}

impl<'a> fmt::Display for EnvFile<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for entry in &self.entries {
      write!(f, "{}", entry)?;
    }
    Ok(())
  }
}

impl<'a> From<&'a str> for EnvFile<'a> {
  fn from(s: &'a str) -> Self {
    #[cfg(feature = "tracing")]
    debug!("Parsing env file with {} lines", s.lines().count());

    let entries: Vec<EnvEntry> = s.lines().map(EnvEntry::from).collect();

    #[cfg(feature = "tracing")]
    debug!("Parsed {} entries", entries.len());

    Self { entries }
  }
}

impl<'a> EnvFile<'a> {
  /// Returns the variable for `key`. When a key is defined twice the last
  /// definition wins.
  pub fn get(&self, key: &str) -> Option<&EnvVariable<'a>> {
    self.variables().filter(|var| var.key == key).last()
  }

  pub fn variables(&self) -> impl Iterator<Item = &EnvVariable<'a>> {
    self.entries.iter().filter_map(|entry| match entry {
      EnvEntry::Variable(var) => Some(var),
      _ => None,
    })
  }

  /// Maps every key to the trimmed line that defined it, ordered by key.
  pub fn lines(&self) -> BTreeMap<&str, &str> {
    self
      .variables()
      .map(|var| (var.key.as_ref(), var.line.as_ref()))
      .collect()
  }

  pub fn push(&mut self, variable: EnvVariable<'a>) {
    self.entries.push(EnvEntry::Variable(variable));
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvEntry<'a> {
  Variable(EnvVariable<'a>),
  Comment(EnvComment<'a>),
  EmptyLine,
  /// A non-comment line without an assignment. Kept so nothing is lost, but
  /// never treated as a key.
  Unrecognized(Cow<'a, str>),
}

impl<'a> fmt::Display for EnvEntry<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EnvEntry::Variable(var) => writeln!(f, "{}", var),
      EnvEntry::Comment(comment) => writeln!(f, "{}", comment),
      EnvEntry::EmptyLine => writeln!(f),
      EnvEntry::Unrecognized(line) => writeln!(f, "{}", line),
    }
  }
}

impl<'a> From<&'a str> for EnvEntry<'a> {
  fn from(s: &'a str) -> Self {
    #[cfg(feature = "tracing")]
    trace!("Parsing line: {:?}", s);

    let trimmed = s.trim();

    if trimmed.is_empty() {
      EnvEntry::EmptyLine
    } else if let Some(content) = trimmed.strip_prefix(COMMENT_PREFIX) {
      EnvEntry::Comment(EnvComment(Cow::Borrowed(content)))
    } else if let Some(var) = EnvVariable::parse(trimmed) {
      EnvEntry::Variable(var)
    } else {
      #[cfg(feature = "tracing")]
      trace!("Skipping unrecognized line: {:?}", trimmed);

      EnvEntry::Unrecognized(Cow::Borrowed(trimmed))
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvVariable<'a> {
  pub key: Cow<'a, str>,
  /// Value with any inline comment removed and surrounding whitespace trimmed.
  pub value: Cow<'a, str>,
  pub inline_comment: Option<EnvComment<'a>>,
  /// The full trimmed line the variable was read from.
  pub line: Cow<'a, str>,
}

impl EnvVariable<'static> {
  pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
    let key = key.into();
    let value = value.into();
    let line = format!("{}{}{}", key, ASSIGNMENT_OPERATOR, value);

    EnvVariable {
      key: Cow::Owned(key),
      value: Cow::Owned(value),
      inline_comment: None,
      line: Cow::Owned(line),
    }
  }
}

impl<'a> EnvVariable<'a> {
  /// Parses a single `KEY=VALUE [# comment]` line.
  ///
  /// Returns `None` when the line has no `=` or the key is empty.
  pub fn parse(s: &'a str) -> Option<Self> {
    let line = s.trim();
    let (key, value_part) = line.split_once(ASSIGNMENT_OPERATOR)?;
    let key = key.trim();
    if key.is_empty() {
      return None;
    }

    let (value, inline_comment) = match comment_start(value_part) {
      Some(pos) => (
        value_part[..pos].trim(),
        Some(EnvComment(Cow::Borrowed(&value_part[pos + 1..]))),
      ),
      None => (value_part.trim(), None),
    };

    #[cfg(feature = "tracing")]
    trace!(
      "Parsed variable: key={}, has_inline_comment={}",
      key,
      inline_comment.is_some()
    );

    Some(EnvVariable {
      key: Cow::Borrowed(key),
      value: Cow::Borrowed(value),
      inline_comment,
      line: Cow::Borrowed(line),
    })
  }
}

impl<'a> fmt::Display for EnvVariable<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}{}", self.key, ASSIGNMENT_OPERATOR, self.value)?;
    if let Some(comment) = &self.inline_comment {
      write!(f, " {}", comment)?;
    }
    Ok(())
  }
}

/// Comment text without its leading `#`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvComment<'a>(Cow<'a, str>);

impl<'a> EnvComment<'a> {
  pub fn text(&self) -> &str {
    &self.0
  }
}

impl<'a> fmt::Display for EnvComment<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", COMMENT_PREFIX, self.0)
  }
}

/// Byte offset of the first `#` in `value` not preceded by a backslash.
pub fn comment_start(value: &str) -> Option<usize> {
  let mut escaped = false;
  for (idx, ch) in value.char_indices() {
    match ch {
      ESCAPE => escaped = !escaped,
      COMMENT_PREFIX if !escaped => return Some(idx),
      _ => escaped = false,
    }
  }
  None
}
