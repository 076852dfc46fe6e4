// Copyright 2026 Proforma Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use proforma_runtime::cli;
use proforma_runtime::store::sqlite::SqliteStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "proforma",
    about = "Proforma — offer collector for the SOCE e-procurement portal",
    version,
    after_help = "Run 'proforma <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (REST + sweep event streaming)
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = cli::serve::DEFAULT_PORT)]
        port: u16,
        /// Database path (default: ~/.proforma/proforma.db)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Use an in-memory store that vanishes on exit
        #[arg(long)]
        ephemeral: bool,
    },
    /// Sweep one process's suppliers from the terminal
    Sweep {
        /// Process id to sweep
        process_id: i64,
        /// Database path (default: ~/.proforma/proforma.db)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Manage contracting processes
    Process {
        #[command(subcommand)]
        action: ProcessAction,
    },
    /// Manage suppliers
    Supplier {
        #[command(subcommand)]
        action: SupplierAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    /// Create a category
    Add {
        name: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List categories
    List {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ProcessAction {
    /// Register a process by its portal code
    Add {
        portal_code: String,
        /// Category the process belongs to
        #[arg(long)]
        category: i64,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List processes
    List {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Delete a process and its sweeps
    Rm {
        id: i64,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SupplierAction {
    /// Register a supplier by RUC
    Add {
        ruc: String,
        /// Category the supplier belongs to
        #[arg(long)]
        category: i64,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List suppliers
    List {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteStore> {
    let path = db.unwrap_or_else(SqliteStore::default_path);
    Ok(SqliteStore::open(&path)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can
    // check them
    if cli.json {
        std::env::set_var("PROFORMA_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("PROFORMA_QUIET", "1");
    }

    let result = match cli.command {
        Commands::Serve {
            port,
            db,
            ephemeral,
        } => {
            cli::init_tracing(cli.verbose);
            cli::serve::run(port, db, ephemeral).await
        }
        Commands::Sweep { process_id, db } => {
            cli::init_tracing(cli.verbose);
            cli::sweep_cmd::run(process_id, db).await
        }
        Commands::Category { action } => match action {
            CategoryAction::Add { name, db } => {
                open_store(db).and_then(|store| cli::admin::add_category(&store, &name))
            }
            CategoryAction::List { db } => {
                open_store(db).and_then(|store| cli::admin::list_categories(&store))
            }
        },
        Commands::Process { action } => match action {
            ProcessAction::Add {
                portal_code,
                category,
                db,
            } => open_store(db)
                .and_then(|store| cli::admin::add_process(&store, &portal_code, category)),
            ProcessAction::List { db } => {
                open_store(db).and_then(|store| cli::admin::list_processes(&store))
            }
            ProcessAction::Rm { id, db } => {
                open_store(db).and_then(|store| cli::admin::remove_process(&store, id))
            }
        },
        Commands::Supplier { action } => match action {
            SupplierAction::Add { ruc, category, db } => {
                open_store(db).and_then(|store| cli::admin::add_supplier(&store, &ruc, category))
            }
            SupplierAction::List { db } => {
                open_store(db).and_then(|store| cli::admin::list_suppliers(&store))
            }
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "proforma", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
