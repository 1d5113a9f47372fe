//! CLI entry and dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use schooldocs_core::api::PortalApi;
use schooldocs_core::config::{self, Config};
use schooldocs_core::logging;
use schooldocs_core::session::Role;

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "schooldocs")]
#[command(version)]
#[command(about = "School document portal client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create a portal account (does not log in)
    Register {
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Student)]
        role: RoleArg,
        /// Password (prompted for when omitted)
        #[arg(long, env = "SCHOOLDOCS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,
        /// Password (prompted for when omitted)
        #[arg(long, env = "SCHOOLDOCS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Clear the stored session
    Logout,
    /// Show the local session state (no network)
    Status,
    /// Validate the session and print the profile
    Whoami,
    /// Show the dashboard: profile summary and available modules
    Dashboard,
    /// Manage your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Browse the student roster (teachers only)
    Students {
        #[command(subcommand)]
        command: StudentCommands,
    },
    /// List, view and download your documents
    Documents {
        #[command(subcommand)]
        command: DocumentCommands,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ProfileCommands {
    /// Update profile fields; omitted fields are left unchanged
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        student_id: Option<String>,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        class_name: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum StudentCommands {
    /// List students, optionally filtered
    List {
        /// Case-insensitive match on name, student ID, email, grade or class
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Show one student and their documents
    Show {
        #[arg(value_name = "ID")]
        id: i64,
    },
}

#[derive(clap::Subcommand)]
enum DocumentCommands {
    /// List documents you uploaded
    List,
    /// Open a document in the default viewer
    View {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Save a document to disk
    Download {
        #[arg(value_name = "ID")]
        id: i64,
        /// Target file or directory (default: the portal's filename in the current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RoleArg {
    Teacher,
    Student,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Teacher => Role::Teacher,
            RoleArg::Student => Role::Student,
        }
    }
}

/// A failure the terminal view already showed; exits 1 without more output.
#[derive(Debug)]
pub struct Reported;

impl std::fmt::Display for Reported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("error already reported")
    }
}

impl std::error::Error for Reported {}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    // Config commands must work even when the config file is broken.
    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        };
    }

    let config = Config::load().context("load config")?;
    let _log_guard = match logging::init_file_logging(&config, &config::paths::logs_dir()) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: file logging disabled: {err:#}");
            None
        }
    };
    let api = connect(&config)?;

    match cli.command {
        Commands::Register {
            email,
            name,
            role,
            password,
        } => commands::auth::register(&api, &email, &name, role.into(), password).await,
        Commands::Login { email, password } => commands::auth::login(&api, &email, password).await,
        Commands::Logout => commands::auth::logout(&api),
        Commands::Status => {
            commands::auth::status(&api, &config);
            Ok(())
        }
        Commands::Whoami => commands::auth::whoami(&api).await,
        Commands::Dashboard => commands::dashboard::show(&api).await,

        Commands::Profile { command } => match command {
            ProfileCommands::Update {
                name,
                student_id,
                grade,
                class_name,
            } => {
                let update = schooldocs_core::api::ProfileUpdate {
                    name,
                    student_id,
                    grade,
                    class_name,
                };
                commands::profile::update(&api, &update).await
            }
        },

        Commands::Students { command } => match command {
            StudentCommands::List { search } => {
                commands::students::list(api, search.as_deref()).await
            }
            StudentCommands::Show { id } => commands::students::show(api, id).await,
        },

        Commands::Documents { command } => match command {
            DocumentCommands::List => commands::documents::list(&api).await,
            DocumentCommands::View { id } => commands::documents::view(&api, id).await,
            DocumentCommands::Download { id, output } => {
                commands::documents::download(&api, id, output.as_deref()).await
            }
        },

        Commands::Config { .. } => Ok(()),
    }
}

/// Opens the stored session and logs every change to it.
fn connect(config: &Config) -> Result<PortalApi> {
    let api = schooldocs_core::connect(config).context("open portal session")?;
    api.auth().session().set_status_hook(Arc::new(|session| {
        tracing::debug!(status = %session.status_line(), "session changed");
    }));
    Ok(api)
}
