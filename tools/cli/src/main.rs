//! keyhaven CLI - command line interface for the credential vault.
//!
//! Each invocation opens the vault database, unlocks it when the requested
//! operation needs the vault key, performs the operation, and exits. The
//! key never outlives the process.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use keyhaven_crypto::{GenerationRequest, KdfParams};
use keyhaven_storage::SqliteBackend;
use keyhaven_vault::{EntryDraft, EntryMeta, Vault, VaultOptions};

#[derive(Parser)]
#[command(name = "keyhaven")]
#[command(about = "keyhaven - local credential vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the vault database (defaults to the user data directory).
    #[arg(long)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new vault.
    Init {
        /// KDF strength: "interactive", "moderate", or "sensitive".
        #[arg(short, long, default_value = "interactive")]
        strength: String,
    },

    /// Show vault status.
    Status,

    /// List entries, optionally filtered.
    List {
        /// Search query over title, username, and url.
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Show one entry.
    Show {
        /// Entry id.
        id: String,

        /// Decrypt and print the secret fields.
        #[arg(long)]
        reveal: bool,
    },

    /// Add an entry. Prompts for the entry password unless --no-password.
    Add {
        /// Entry title.
        title: String,

        #[arg(short, long)]
        username: Option<String>,

        #[arg(long)]
        url: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,

        /// Store the entry without a password.
        #[arg(long)]
        no_password: bool,
    },

    /// Remove an entry.
    Remove {
        /// Entry id.
        id: String,
    },

    /// Generate a password without touching the vault.
    Generate {
        #[arg(short, long, default_value_t = 20)]
        length: usize,

        /// Exclude uppercase letters.
        #[arg(long)]
        no_upper: bool,

        /// Exclude lowercase letters.
        #[arg(long)]
        no_lower: bool,

        /// Exclude digits.
        #[arg(long)]
        no_digits: bool,

        /// Exclude symbols.
        #[arg(long)]
        no_symbols: bool,

        /// Keep visually ambiguous characters in the pool.
        #[arg(long)]
        allow_ambiguous: bool,
    },

    /// Change the master password, re-sealing every entry.
    ChangePassword,

    /// Write an encrypted backup file.
    Export {
        /// Output path.
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Restore an encrypted backup into an empty vault.
    Import {
        /// Backup file path.
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db_path = vault_path(cli.vault)?;

    match cli.command {
        Commands::Init { strength } => cmd_init(&db_path, &strength).await,
        Commands::Status => cmd_status(&db_path).await,
        Commands::List { query } => cmd_list(&db_path, query.as_deref()).await,
        Commands::Show { id, reveal } => cmd_show(&db_path, &id, reveal).await,
        Commands::Add {
            title,
            username,
            url,
            notes,
            no_password,
        } => cmd_add(&db_path, title, username, url, notes, no_password).await,
        Commands::Remove { id } => cmd_remove(&db_path, &id).await,
        Commands::Generate {
            length,
            no_upper,
            no_lower,
            no_digits,
            no_symbols,
            allow_ambiguous,
        } => cmd_generate(GenerationRequest {
            length,
            upper: !no_upper,
            lower: !no_lower,
            digits: !no_digits,
            symbols: !no_symbols,
            avoid_ambiguous: !allow_ambiguous,
        }),
        Commands::ChangePassword => cmd_change_password(&db_path).await,
        Commands::Export { out } => cmd_export(&db_path, &out).await,
        Commands::Import { file } => cmd_import(&db_path, &file).await,
    }
}

fn vault_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let base = dirs::data_dir().context("could not determine the user data directory")?;
    Ok(base.join("keyhaven").join("vault.db"))
}

/// Prompt for a password securely.
fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("failed to read password")
}

async fn open_vault(db_path: &PathBuf) -> Result<Vault> {
    let backend = SqliteBackend::open(db_path).context("failed to open vault database")?;
    Vault::open(Arc::new(backend), VaultOptions::default())
        .await
        .context("failed to open vault")
}

async fn open_unlocked(db_path: &PathBuf) -> Result<Vault> {
    let vault = open_vault(db_path).await?;
    let password = prompt_password("Master password: ")?;
    vault
        .unlock(&password)
        .await
        .context("failed to unlock vault")?;
    Ok(vault)
}

fn print_meta(meta: &EntryMeta) {
    let username = meta.username.as_deref().unwrap_or("-");
    println!(
        "  {}  {:<24} {:<20} {}",
        meta.id,
        meta.title,
        username,
        meta.updated_at.format("%Y-%m-%d %H:%M")
    );
}

async fn cmd_init(db_path: &PathBuf, strength: &str) -> Result<()> {
    let kdf_params = match strength {
        "interactive" => KdfParams::interactive(),
        "moderate" => KdfParams::moderate(),
        "sensitive" => KdfParams::sensitive(),
        _ => {
            anyhow::bail!("Invalid strength. Use: interactive, moderate, or sensitive");
        }
    };

    let password = prompt_password("Choose master password: ")?;
    let confirm = prompt_password("Confirm master password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let backend = SqliteBackend::open(db_path).context("failed to open vault database")?;
    let options = VaultOptions {
        kdf_params,
        ..VaultOptions::default()
    };
    let vault = Vault::open(Arc::new(backend), options).await?;
    vault.setup(&password).await.context("setup failed")?;

    println!("Vault initialized at {}", db_path.display());
    Ok(())
}

async fn cmd_status(db_path: &PathBuf) -> Result<()> {
    let vault = open_vault(db_path).await?;
    let status = vault.status().await;
    let entries = vault.list(None).await?.len();

    println!("Vault: {}", db_path.display());
    println!("  initialized: {}", status.initialized);
    println!("  entries: {}", entries);
    Ok(())
}

async fn cmd_list(db_path: &PathBuf, query: Option<&str>) -> Result<()> {
    let vault = open_vault(db_path).await?;
    let items = vault.list(query).await.context("failed to list entries")?;

    if items.is_empty() {
        println!("No entries.");
    } else {
        for meta in &items {
            print_meta(meta);
        }
    }
    Ok(())
}

async fn cmd_show(db_path: &PathBuf, id: &str, reveal: bool) -> Result<()> {
    if reveal {
        let vault = open_unlocked(db_path).await?;
        let entry = vault.reveal(id).await.context("failed to reveal entry")?;

        print_meta(&entry.meta);
        println!("  password: {}", entry.password.as_deref().unwrap_or("-"));
        if let Some(codes) = &entry.recovery_codes {
            println!("  recovery codes:");
            for code in codes {
                println!("    {}", code);
            }
        }
    } else {
        let vault = open_vault(db_path).await?;
        let meta = vault.get(id).await.context("entry not found")?;
        print_meta(&meta);
        if meta.has_password {
            println!("  password: ******** (use --reveal)");
        }
    }
    Ok(())
}

async fn cmd_add(
    db_path: &PathBuf,
    title: String,
    username: Option<String>,
    url: Option<String>,
    notes: Option<String>,
    no_password: bool,
) -> Result<()> {
    let vault = open_unlocked(db_path).await?;

    let password = if no_password {
        None
    } else {
        Some(prompt_password("Entry password: ")?)
    };

    let draft = EntryDraft {
        title,
        username,
        url,
        notes,
        password,
        recovery_codes: None,
    };
    let meta = vault.create(draft).await.context("failed to add entry")?;

    println!("Added entry {}", meta.id);
    Ok(())
}

async fn cmd_remove(db_path: &PathBuf, id: &str) -> Result<()> {
    let vault = open_vault(db_path).await?;
    vault.delete(id).await.context("failed to remove entry")?;

    println!("Removed entry {}", id);
    Ok(())
}

fn cmd_generate(request: GenerationRequest) -> Result<()> {
    let password = keyhaven_crypto::generate(&request).context("generation failed")?;
    println!("{}", password);
    Ok(())
}

async fn cmd_change_password(db_path: &PathBuf) -> Result<()> {
    let vault = open_vault(db_path).await?;

    let old = prompt_password("Current master password: ")?;
    let new = prompt_password("New master password: ")?;
    let confirm = prompt_password("Confirm new master password: ")?;
    if new != confirm {
        anyhow::bail!("Passwords do not match");
    }

    vault
        .change_master_password(&old, &new)
        .await
        .context("failed to change master password")?;

    println!("Master password changed; all entries re-sealed.");
    Ok(())
}

async fn cmd_export(db_path: &PathBuf, out: &PathBuf) -> Result<()> {
    let vault = open_vault(db_path).await?;

    let passphrase = prompt_password("Backup passphrase: ")?;
    let confirm = prompt_password("Confirm backup passphrase: ")?;
    if passphrase != confirm {
        anyhow::bail!("Passphrases do not match");
    }

    let backup = vault.export(&passphrase).await.context("export failed")?;
    tokio::fs::write(out, backup)
        .await
        .context("failed to write backup file")?;

    println!("Backup written to {}", out.display());
    Ok(())
}

async fn cmd_import(db_path: &PathBuf, file: &PathBuf) -> Result<()> {
    let vault = open_vault(db_path).await?;

    let data = tokio::fs::read_to_string(file)
        .await
        .context("failed to read backup file")?;
    let passphrase = prompt_password("Backup passphrase: ")?;

    let count = vault.import(&data, &passphrase).await.context("import failed")?;

    println!("Restored {} entries into {}", count, db_path.display());
    Ok(())
}
