use clap::{Args, Parser, Subcommand};
use secretbase::model::EnvironmentType;
use secretbase::render::{projects_table, secrets_table, users_table};
use secretbase::session::{Session, SessionConfig};
use secretbase::store::{SecretStore, SqliteStore};
use secretbase::sync::{Change, SecretSync, parse_pair};
use secretbase::template::EnvTemplate;
use std::error::Error;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const PROMPT: &str = "sbx> ";

#[derive(Parser)]
#[command(
  name = "sbx",
  about = "Share per-environment project secrets and keep .env files in sync",
  version,
  author
)]
struct Cli {
  /// Path to the secret database
  #[arg(long, global = true, env = "SECRETBASE_DATABASE")]
  database: Option<PathBuf>,

  /// Email of the user recorded as creator of new secrets
  #[arg(long, global = true, env = "SECRETBASE_USER")]
  user: Option<String>,

  /// Verbose output (-v for verbose, -vv for very verbose)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create a project with development, staging and production environments
  Create {
    /// Name of the project (defaults to the current directory name)
    #[arg(short, long)]
    name: Option<String>,
  },
  /// Register a new user
  Register {
    /// Email address of the user
    #[arg(short, long)]
    email: String,
    /// Password for the user
    #[arg(short, long)]
    password: String,
    /// Make the user an admin
    #[arg(short, long)]
    admin: bool,
  },
  /// List all projects
  Projects,
  /// List all users
  Users,
  /// Show the secrets of one environment
  Secrets(ScopeArgs),
  /// Write stored secrets into .env files
  Grab(ScopeArgs),
  /// Push .env files, or a single key=value, into the store
  Share {
    /// Project name (defaults to the current directory name)
    #[arg(short, long)]
    project: Option<String>,
    #[command(flatten)]
    environment: ShareEnvironmentFlags,
    /// Single key=value pair to add or update
    #[arg(short, long)]
    secret: Option<String>,
  },
  /// Regenerate .env.example files from the .env files below the current directory
  Setup,
  /// Start an interactive prompt
  Start,
}

#[derive(Args)]
struct ScopeArgs {
  /// Project name (defaults to the current directory name)
  #[arg(short, long)]
  project: Option<String>,

  #[command(flatten)]
  environment: EnvironmentFlags,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct EnvironmentFlags {
  /// Use the development environment
  #[arg(short, long)]
  dev: bool,
  /// Use the staging environment
  #[arg(short, long)]
  staging: bool,
  /// Use the production environment
  #[arg(short = 'r', long)]
  prod: bool,
}

/// Environment flags of `share`, where `-s` is taken by `--secret`.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct ShareEnvironmentFlags {
  /// Use the development environment
  #[arg(short, long)]
  dev: bool,
  /// Use the staging environment
  #[arg(short = 'g', long)]
  staging: bool,
  /// Use the production environment
  #[arg(short = 'r', long)]
  prod: bool,
}

fn selected_environment(dev: bool, staging: bool) -> EnvironmentType {
  if dev {
    EnvironmentType::Development
  } else if staging {
    EnvironmentType::Staging
  } else {
    EnvironmentType::Production
  }
}

impl EnvironmentFlags {
  fn environment(&self) -> EnvironmentType {
    selected_environment(self.dev, self.staging)
  }
}

impl ShareEnvironmentFlags {
  fn environment(&self) -> EnvironmentType {
    selected_environment(self.dev, self.staging)
  }
}

fn setup_tracing(verbose: u8) {
  use tracing_subscriber::fmt;
  use tracing_subscriber::prelude::*;

  let log_level = match verbose {
    1 => "debug",
    2 => "trace",
    _ => "info",
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(tracing_subscriber::EnvFilter::new(
      std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    ))
    .init();
}

fn project_name(session: &Session, explicit: Option<String>) -> Result<String, Box<dyn Error>> {
  let (name, defaulted) = session.project_name(explicit)?;
  if defaulted {
    println!("Using current directory name as project name: {}", name);
  }
  Ok(name)
}

fn scoped(
  session: &Session,
  project: Option<String>,
  environment: EnvironmentType,
) -> Result<SecretSync<'_, SqliteStore>, Box<dyn Error>> {
  let project = project_name(session, project)?;
  Ok(SecretSync::new(session.store(), project, environment)?)
}

fn setup(root: &Path) -> Result<(), Box<dyn Error>> {
  if let Some(name) = root.file_name() {
    println!("Operating in directory: {}", name.to_string_lossy());
  }
  for path in EnvTemplate::setup(root)? {
    println!("{}", path);
  }
  Ok(())
}

fn run(session: &Session, command: Command) -> Result<(), Box<dyn Error>> {
  let store = session.store();

  match command {
    Command::Create { name } => {
      let name = project_name(session, name)?;
      store.create_project(&name)?;
      println!("Project and associated environments created successfully");
    }
    Command::Register {
      email,
      password,
      admin,
    } => {
      store.create_user(&email, &password, admin)?;
      println!("User created successfully");
    }
    Command::Projects => println!("{}", projects_table(&store.list_projects()?)),
    Command::Users => println!("{}", users_table(&store.list_users()?)),
    Command::Secrets(scope) => {
      let sync = scoped(session, scope.project, scope.environment.environment())?;
      let secrets = store.list_secrets(sync.project(), sync.environment())?;
      println!("{}", secrets_table(&secrets));
    }
    Command::Grab(scope) => {
      let sync = scoped(session, scope.project, scope.environment.environment())?;
      for path in sync.grab(session.root())? {
        println!("Updated file: {}", path.display());
      }
    }
    Command::Share {
      project,
      environment,
      secret,
    } => {
      // Malformed pairs are rejected before the store is touched.
      if let Some(pair) = &secret {
        parse_pair(pair)?;
      }
      let sync = scoped(session, project, environment.environment())?;
      match secret {
        Some(pair) => match sync.share_pair(&pair)? {
          (key, Change::Created) => println!("Created new secret: {}", key),
          (key, Change::Updated) => println!("Updated secret: {}", key),
        },
        None => {
          let report = sync.share_dir(session.root())?;
          for path in &report.files {
            println!("Processed file: {}", path.display());
          }
          for key in &report.created {
            println!("Created new secret: {}", key);
          }
          for key in &report.updated {
            println!("Updated secret: {}", key);
          }
          for key in &report.deleted {
            println!("Deleted unused secret: {}", key);
          }
        }
      }
    }
    Command::Setup => setup(session.root())?,
    Command::Start => return Err("Already started".into()),
  }

  Ok(())
}

/// Reads commands from stdin and runs them against one session until `exit`,
/// `quit` or end of input.
fn start(session: &Session) -> Result<(), Box<dyn Error>> {
  let stdin = std::io::stdin();
  let mut stdout = std::io::stdout();

  loop {
    print!("{}", PROMPT);
    stdout.flush()?;

    let mut input = String::new();
    if stdin.lock().read_line(&mut input)? == 0 {
      break;
    }

    let input = input.trim();
    if input.is_empty() {
      continue;
    }
    if input == "exit" || input == "quit" {
      println!("Exiting SecretBase CLI...");
      break;
    }

    match Cli::try_parse_from(std::iter::once("sbx").chain(input.split_whitespace())) {
      Ok(cli) => {
        if let Err(err) = run(session, cli.command) {
          eprintln!("Error: {}", err);
        }
      }
      Err(err) => err.print()?,
    }
  }

  Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
  dotenvy::dotenv().ok();

  let cli = Cli::parse();

  setup_tracing(cli.verbose);

  // Templates are derived from local files only.
  if let Command::Setup = cli.command {
    return setup(&std::env::current_dir()?);
  }

  let session = Session::open(SessionConfig {
    database: cli.database,
    user: cli.user,
    root: None,
  })?;

  match cli.command {
    Command::Start => start(&session),
    command => run(&session, command),
  }
}
