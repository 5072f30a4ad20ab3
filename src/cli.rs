use crate::config::LogLevel;
use clap::Parser;

/// schemashell - an interactive shell for database schema metadata
#[derive(Parser, Debug, Clone)]
#[command(name = "schemashell")]
#[command(version, long_about = None)]
#[command(about = "Connect to a database, load a catalog of schema metadata, render it")]
pub struct Args {
    /// Database connection URL to connect to at startup
    ///
    /// Examples:
    ///   PostgreSQL: postgresql://localhost:5432/mydb
    ///   MySQL:      mysql://localhost:3306/mydb
    ///   SQLite:     sqlite:/path/to/database.db
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Database user name for the startup connection
    #[arg(short, long)]
    pub user: Option<String>,

    /// Database password for the startup connection (prompted when omitted)
    #[arg(long, env = "SCHEMASHELL_PASSWORD")]
    pub password: Option<String>,

    /// Execute shell commands and exit instead of entering the shell
    #[arg(short, long, action = clap::ArgAction::Append, value_name = "COMMAND")]
    pub command: Vec<String>,

    /// Log level override for this run
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}
