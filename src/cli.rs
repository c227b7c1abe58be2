use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the archive API over HTTP until interrupted.
    Serve(ServeArgs),
    /// Manage user accounts directly in the database.
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Path to the YAML configuration file.
    #[arg(long, short, default_value = "archivist.yaml")]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create a user. The password is read from the first line of stdin.
    Create(UserCreateArgs),
    /// Delete a user and everything stored for them.
    Delete(UserDeleteArgs),
}

#[derive(Debug, Args)]
pub struct UserCreateArgs {
    /// User name (3-64 letters, digits or underscores).
    pub name: String,

    /// Path to the YAML configuration file.
    #[arg(long, short, default_value = "archivist.yaml")]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct UserDeleteArgs {
    pub name: String,

    /// Path to the YAML configuration file.
    #[arg(long, short, default_value = "archivist.yaml")]
    pub config: PathBuf,

    /// Skip the confirmation prompt.
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the default configuration as YAML.
    Default,
}
