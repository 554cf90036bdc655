use clap::{Parser, Subcommand};
use habitat_core::{Permission, ResourceKind};
use std::path::PathBuf;

/// Operate on habitats, their messages and permissions in a SQLite database.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Override database path.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Override page size for message listings.
    #[arg(long, global = true)]
    pub page_limit: Option<usize>,
    /// Enable or disable logging (true/false).
    #[arg(long, global = true)]
    pub logging: Option<bool>,
    /// Evaluate every permission check fresh.
    #[arg(long, global = true)]
    pub no_cache: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema.
    Init,
    /// Register a user profile.
    AddUser {
        id: String,
        display_name: String,
        #[arg(long)]
        avatar_url: Option<String>,
    },
    /// Create a habitat owned by a user.
    CreateHabitat {
        name: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        public: bool,
    },
    /// Add a user to a habitat, either themselves or by someone managing members.
    Join {
        habitat: String,
        user: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Create a discussion, poll or watch party.
    CreateResource {
        habitat: String,
        #[arg(long, value_parser = parse_kind)]
        kind: ResourceKind,
        #[arg(long)]
        user: String,
        title: String,
    },
    /// List messages, newest first.
    Messages {
        habitat: String,
        #[arg(long)]
        user: String,
        /// Number of pages to load.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Send a message.
    Send {
        habitat: String,
        #[arg(long)]
        user: String,
        text: String,
    },
    /// Delete a message.
    Delete {
        message: String,
        #[arg(long)]
        user: String,
    },
    /// Print whether a permission is granted.
    Check {
        user: String,
        resource: String,
        #[arg(value_parser = parse_permission)]
        permission: Permission,
        #[arg(long, value_parser = parse_kind, default_value = "habitat")]
        kind: ResourceKind,
    },
    /// Print the full decision for a permission as JSON.
    Explain {
        user: String,
        resource: String,
        #[arg(value_parser = parse_permission)]
        permission: Permission,
        #[arg(long, value_parser = parse_kind, default_value = "habitat")]
        kind: ResourceKind,
    },
    /// Follow a habitat's messages until interrupted.
    Watch {
        habitat: String,
        #[arg(long)]
        user: String,
    },
}

fn parse_permission(s: &str) -> Result<Permission, String> {
    s.parse()
}

fn parse_kind(s: &str) -> Result<ResourceKind, String> {
    s.parse()
}
