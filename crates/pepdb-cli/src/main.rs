//! pepdb - command-line access to a PEP database.
//!
//! Results are printed to stdout as JSON; logs go to stderr.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pepdb_core::{HistoryConfig, PepAgent, QueryConfig, StoreConfig};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "pepdb")]
#[command(about = "Store, version and query PEP projects")]
pub(crate) struct Args {
    /// SQLite database file (defaults to the user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Maximum history entries kept per project
    #[arg(long, global = true, default_value_t = HistoryConfig::MAX_HISTORY_SAMPLES_NUMBER)]
    max_history: usize,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Upload a project from a JSON file
    Upload {
        /// JSON file with `_config`, `_sample_dict` and `_subsample_list`
        file: PathBuf,
        #[arg(short, long)]
        namespace: String,
        /// Defaults to the name in the project config
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        tag: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        private: bool,
        #[arg(long)]
        pop: bool,
        /// Schema reference, namespace/name[:version]
        #[arg(long)]
        schema: Option<String>,
        /// Replace the project if it already exists
        #[arg(long)]
        overwrite: bool,
        /// Only replace an existing project
        #[arg(long, conflicts_with = "overwrite")]
        update_only: bool,
    },

    /// Print a project as JSON
    Get {
        registry_path: String,
        /// Include sample identifiers (needed to edit and update)
        #[arg(long)]
        with_ids: bool,
    },

    /// Apply an update request (JSON file) to a project
    Update {
        registry_path: String,
        request: PathBuf,
    },

    /// Copy a project into another namespace
    Fork {
        registry_path: String,
        namespace: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        tag: Option<String>,
        #[arg(long)]
        private: bool,
    },

    /// Delete a project and its history
    Delete { registry_path: String },

    /// List the history of a project, newest first
    History { registry_path: String },

    /// Print the project state saved in one history entry
    HistoryGet {
        registry_path: String,
        change_id: i64,
        #[arg(long)]
        with_ids: bool,
    },

    /// Restore a project to the state saved in a history entry
    Restore {
        registry_path: String,
        change_id: i64,
        #[arg(long)]
        user: Option<String>,
    },

    /// Delete one history entry, or all of them
    HistoryDelete {
        registry_path: String,
        #[arg(long)]
        change_id: Option<i64>,
    },

    /// Delete history entries older than a number of days
    HistoryClean {
        #[arg(long, default_value_t = HistoryConfig::DEFAULT_CLEAN_DAYS)]
        days: i64,
    },

    /// Search project annotations
    List {
        #[arg(short, long)]
        namespace: Option<String>,
        #[arg(short, long)]
        query: Option<String>,
        /// Namespaces whose private projects may be listed
        #[arg(long)]
        admin: Vec<String>,
        #[arg(long, default_value_t = QueryConfig::DEFAULT_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = QueryConfig::DEFAULT_OFFSET)]
        offset: usize,
    },

    /// List namespaces with project and sample counts
    Namespaces {
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long)]
        admin: Vec<String>,
        #[arg(long, default_value_t = QueryConfig::DEFAULT_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = QueryConfig::DEFAULT_OFFSET)]
        offset: usize,
    },

    /// Create a named view over some samples of a project
    ViewCreate {
        registry_path: String,
        view: String,
        /// Sample names to include
        #[arg(required = true)]
        samples: Vec<String>,
        #[arg(long, default_value = "")]
        description: String,
        /// Leave out unknown sample names instead of failing
        #[arg(long)]
        skip_missing: bool,
    },

    /// Print a view as a project
    ViewGet {
        registry_path: String,
        view: String,
        #[arg(long)]
        with_ids: bool,
    },

    /// List the views of a project
    Views { registry_path: String },

    ViewDelete { registry_path: String, view: String },

    /// Create a project group
    GroupCreate {
        namespace: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        private: bool,
    },

    /// Add a project to a group
    GroupAdd {
        namespace: String,
        name: String,
        registry_path: String,
    },

    /// Remove a project from a group
    GroupRemove {
        namespace: String,
        name: String,
        registry_path: String,
    },

    /// Print a group and its projects
    GroupGet {
        namespace: String,
        name: String,
        #[arg(long)]
        admin: Vec<String>,
    },

    /// List groups
    Groups {
        #[arg(short, long)]
        namespace: Option<String>,
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long)]
        admin: Vec<String>,
        #[arg(long, default_value_t = QueryConfig::DEFAULT_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = QueryConfig::DEFAULT_OFFSET)]
        offset: usize,
    },

    GroupDelete { namespace: String, name: String },
}

fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .or_else(dirs::home_dir)
        .context("Cannot determine a data directory; pass --db")?;
    Ok(data_dir.join("pepdb").join(StoreConfig::DB_FILE_NAME))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let db_path = match args.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    debug!("Database: {}", db_path.display());

    let agent = PepAgent::builder()
        .db_path(&db_path)
        .auto_create_dirs(true)
        .max_history_entries(args.max_history)
        .build()
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let output = commands::run(&agent, args.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
