//! Console tables for the listing commands.

use comfy_table::{Cell, Table};

use crate::model::{ProjectSummary, Secret, UserSummary};

fn yes_no(flag: bool) -> &'static str {
  if flag { "Yes" } else { "No" }
}

pub fn projects_table(projects: &[ProjectSummary]) -> Table {
  let mut table = Table::new();
  table.set_header(vec![Cell::new("Project Name"), Cell::new("Active")]);
  for project in projects {
    table.add_row(vec![Cell::new(&project.name), Cell::new(yes_no(project.active))]);
  }
  table
}

pub fn users_table(users: &[UserSummary]) -> Table {
  let mut table = Table::new();
  table.set_header(vec![Cell::new("Email"), Cell::new("Admin")]);
  for user in users {
    table.add_row(vec![Cell::new(&user.email), Cell::new(yes_no(user.admin))]);
  }
  table
}

pub fn secrets_table(secrets: &[Secret]) -> Table {
  let mut table = Table::new();
  table.set_header(vec![Cell::new("Key"), Cell::new("Value")]);
  for secret in secrets {
    table.add_row(vec![Cell::new(&secret.key), Cell::new(&secret.value)]);
  }
  table
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_secrets_table_lists_key_and_value() {
    let rendered = secrets_table(&[Secret {
      key: "FOO".into(),
      value: "baz".into(),
      location: ".".into(),
    }])
    .to_string();

    assert!(rendered.contains("Key"));
    assert!(rendered.contains("FOO"));
    assert!(rendered.contains("baz"));
  }

  #[test]
  fn test_flags_render_as_yes_no() {
    let rendered = projects_table(&[
      ProjectSummary {
        name: "app".into(),
        active: true,
      },
      ProjectSummary {
        name: "old".into(),
        active: false,
      },
    ])
    .to_string();

    assert!(rendered.contains("Yes"));
    assert!(rendered.contains("No"));
  }
}
