use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Session Gate - login session and route guard for the field app
#[derive(Parser)]
#[command(name = "session-gate")]
#[command(about = "Manage the login session and check route access", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Logging level (overrides the config file)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Write a default configuration file
    Init(InitArgs),

    /// Log in and store the session
    Login(LoginArgs),

    /// Clear the stored session
    Logout,

    /// Show the stored session and the initial route
    Status,

    /// Navigate to a route and show where the guard lands
    Navigate(NavigateArgs),

    /// Issue an authenticated GET against the API
    Fetch(FetchArgs),
}

#[derive(Args, Clone)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Clone)]
pub struct LoginArgs {
    /// Account email
    #[arg(short, long)]
    pub email: String,

    /// Password (prompted for when omitted)
    #[arg(short, long)]
    pub password: Option<String>,
}

#[derive(Args, Clone)]
pub struct NavigateArgs {
    /// Group-qualified route, e.g. "/(app)/projects/7" or "/(auth)/login"
    #[arg(value_name = "ROUTE")]
    pub route: String,
}

#[derive(Args, Clone)]
pub struct FetchArgs {
    /// Path relative to the API base URL, e.g. "projects"
    #[arg(value_name = "PATH")]
    pub path: String,
}
