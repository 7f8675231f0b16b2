//! PassVault command-line front-end.
//!
//! Every invocation opens the vault in `--data-dir`, verifies `--pin` when a
//! PIN is configured, runs one command and exits. `watch` stays up and keeps
//! remaining validity current until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use passvault_app_lib::commands;
use passvault_app_lib::storage::load_settings;
use passvault_app_lib::{
    initialize_app, Entry, FileExportSink, FileImportSource, FileStore, ImportOutcome, PassVault,
    PassVaultError, DEFAULT_LOG_FILTER,
};
use tracing::info;

/// Local password vault with expiring entries
#[derive(Parser, Debug)]
#[command(name = "passvault", author, version, about)]
struct Args {
    /// Directory holding the vault files
    #[arg(long, env = "PASSVAULT_DATA_DIR", default_value = ".passvault")]
    data_dir: PathBuf,

    /// PIN used to unlock the vault when PIN protection is enabled
    #[arg(long, env = "PASSVAULT_PIN", hide_env_values = true)]
    pin: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all entries
    List {
        /// Print passwords instead of masking them
        #[arg(long)]
        show_secrets: bool,
        /// Print the entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find entries whose description contains QUERY (case-insensitive)
    Search {
        query: String,
        #[arg(long)]
        show_secrets: bool,
    },
    /// Add an entry
    Add {
        description: String,
        #[arg(long)]
        password: String,
        /// Days until the password expires
        #[arg(long, default_value = "30")]
        validity: String,
    },
    /// Edit an entry; omitted fields keep their current value
    Edit {
        id: u64,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// New number of days remaining; omit to keep the current validity
        #[arg(long)]
        validity: Option<String>,
    },
    /// Delete an entry
    Delete { id: u64 },
    /// Write all entries to a JSON document
    Export {
        /// Directory the document is written to
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Merge entries from a JSON document
    Import { file: PathBuf },
    /// Manage PIN protection
    Pin {
        #[command(subcommand)]
        action: PinAction,
    },
    /// Show settings, or change the ones given
    Settings {
        /// Name of the exported document
        #[arg(long)]
        export_file_name: Option<String>,
        #[arg(long)]
        pretty_export: Option<bool>,
        /// Recompute remaining validity on every start
        #[arg(long)]
        recompute_on_start: Option<bool>,
    },
    /// Show session and vault status
    Status,
    /// Keep validity up to date every midnight until Ctrl-C
    Watch,
}

#[derive(Subcommand, Debug)]
enum PinAction {
    Enable {
        new_pin: String,
        confirm_pin: String,
    },
    Disable,
    Change {
        current_pin: String,
        new_pin: String,
        confirm_pin: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        DEFAULT_LOG_FILTER
    } else {
        "passvault_app=warn"
    };
    passvault_app_lib::init_tracing(default_filter);

    let settings = load_settings(&args.data_dir)
        .with_context(|| format!("Failed to load settings from {:?}", args.data_dir))?;
    let store = FileStore::open(&args.data_dir)
        .with_context(|| format!("Failed to open vault in {:?}", args.data_dir))?;
    let app = initialize_app(Arc::new(store), settings)
        .await
        .context("Failed to initialize vault")?;

    if !app.guard.is_authenticated().await {
        if let Some(pin) = args.pin.as_deref() {
            commands::unlock(&app, pin).await.context("Unlock failed")?;
        }
    }

    match run(&app, &args.data_dir, args.command).await {
        Err(e) if matches!(e.downcast_ref::<PassVaultError>(), Some(PassVaultError::Locked)) => {
            bail!("Vault is locked: pass --pin or set PASSVAULT_PIN")
        }
        other => other,
    }
}

async fn run(app: &PassVault, data_dir: &Path, command: Command) -> Result<()> {
    match command {
        Command::List { show_secrets, json } => {
            let entries = commands::list_entries(app).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_entries(&entries, show_secrets);
            }
        }
        Command::Search {
            query,
            show_secrets,
        } => {
            let entries = commands::search_entries(app, &query).await?;
            print_entries(&entries, show_secrets);
        }
        Command::Add {
            description,
            password,
            validity,
        } => {
            let entry = commands::add_entry(app, &description, &password, &validity).await?;
            println!("Added entry {}", entry.id);
        }
        Command::Edit {
            id,
            description,
            password,
            validity,
        } => {
            let entries = commands::list_entries(app).await?;
            let Some(current) = entries.into_iter().find(|e| e.id == id) else {
                bail!("No entry with id {}", id);
            };
            let description = description.unwrap_or(current.description);
            let password = password.unwrap_or(current.secret);

            if commands::edit_entry(app, id, &description, &password, validity.as_deref()).await? {
                println!("Updated entry {}", id);
            } else {
                bail!("No entry with id {}", id);
            }
        }
        Command::Delete { id } => {
            if commands::delete_entry(app, id).await? {
                println!("Deleted entry {}", id);
            } else {
                println!("No entry with id {}", id);
            }
        }
        Command::Export { dir } => {
            let path = commands::export_entries(app, &FileExportSink::new(dir)).await?;
            println!("Exported to {}", path.display());
        }
        Command::Import { file } => {
            match commands::import_entries(app, &FileImportSource::new(&file))
                .await
                .with_context(|| format!("Failed to import {:?}", file))?
            {
                ImportOutcome::Cancelled => println!("Import cancelled"),
                ImportOutcome::Imported { added, renumbered } => {
                    println!("Imported {} entries ({} renumbered)", added, renumbered)
                }
            }
        }
        Command::Pin { action } => match action {
            PinAction::Enable {
                new_pin,
                confirm_pin,
            } => {
                commands::enable_pin(app, &new_pin, &confirm_pin).await?;
                println!("PIN protection enabled");
            }
            PinAction::Disable => {
                commands::disable_pin(app).await?;
                println!("PIN protection disabled");
            }
            PinAction::Change {
                current_pin,
                new_pin,
                confirm_pin,
            } => {
                commands::change_pin(app, &current_pin, &new_pin, &confirm_pin).await?;
                println!("PIN changed");
            }
        },
        Command::Settings {
            export_file_name,
            pretty_export,
            recompute_on_start,
        } => {
            let mut settings = commands::get_settings(app).await?;
            let changed =
                export_file_name.is_some() || pretty_export.is_some() || recompute_on_start.is_some();
            if let Some(name) = export_file_name {
                settings.export_file_name = name;
            }
            if let Some(pretty) = pretty_export {
                settings.pretty_export = pretty;
            }
            if let Some(recompute) = recompute_on_start {
                settings.recompute_on_start = recompute;
            }

            if changed {
                commands::update_settings(app, data_dir, settings.clone())
                    .await
                    .with_context(|| format!("Failed to save settings to {:?}", data_dir))?;
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Status => {
            let status = commands::session_status(app).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Watch => {
            app.expiry.start();
            info!("Watching for midnight, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            app.shutdown().await;
        }
    }
    Ok(())
}

fn print_entries(entries: &[Entry], show_secrets: bool) {
    if entries.is_empty() {
        println!("No entries");
        return;
    }
    for entry in entries {
        let secret = if show_secrets {
            entry.secret.as_str()
        } else {
            "********"
        };
        let validity = if entry.is_expired() {
            "expired".to_string()
        } else {
            format!("{} days left", entry.validity_days)
        };
        println!(
            "{:>4}  {:<32}  {:<16}  {}",
            entry.id, entry.description, secret, validity
        );
    }
}
