//! Local administrative CLI for Burrow.
//!
//! Operates directly on the configured storage root and metadata database.
//! Results are printed to stdout as JSON; failures from the vault are printed
//! to stderr as a `{code, message}` object.

use anyhow::{Context, Result};
use burrow_core::config::AppConfig;
use burrow_core::{ByteSize, FileId};
use burrow_vault::{FileVault, InitUpload, UploadOutcome, UploadRequest, VaultError};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

/// Exit status for failures reported by the vault.
const VAULT_ERROR_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "burrowctl")]
#[command(about = "Administrative CLI for Burrow storage")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(long, env = "BURROW_CONFIG", default_value = "burrow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Account quota management
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Upload a local file
    Put {
        account: i64,
        /// Local file to upload
        file: PathBuf,
        /// Target directory
        #[arg(long, default_value = "/")]
        dir: String,
        /// Stored name (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
        /// MIME type (guessed from the name when omitted)
        #[arg(long)]
        mime: Option<String>,
        /// Upload in chunks of this size (e.g. "5MB") instead of in one piece
        #[arg(long)]
        chunk_size: Option<ByteSize>,
    },
    /// Create a folder
    Mkdir {
        account: i64,
        /// Parent directory
        parent: String,
        name: String,
    },
    /// List active entries of a directory
    Ls {
        account: i64,
        #[arg(default_value = "/")]
        dir: String,
        /// Sort order: name|created_at|size, then asc|desc
        #[arg(long, default_value = "name-asc")]
        sort: String,
    },
    /// List the trash
    Trash { account: i64 },
    /// Rename an entry in place
    Mv {
        account: i64,
        file_id: Uuid,
        new_name: String,
    },
    /// Move an entry to the trash
    Rm { account: i64, file_id: Uuid },
    /// Restore an entry from the trash
    Restore { account: i64, file_id: Uuid },
    /// Permanently delete an entry
    Purge { account: i64, file_id: Uuid },
    /// Download a file
    Get {
        account: i64,
        file_id: Uuid,
        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Expire abandoned uploads and purge orphaned staging data
    Sweep,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Create an account
    Create {
        account: i64,
        /// Capacity (e.g. "10GB"); defaults to quota.default_total
        #[arg(long)]
        quota: Option<ByteSize>,
    },
    /// Show quota usage
    Show { account: i64 },
    /// Remove an account that holds no files
    Close { account: i64 },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli.config)?;
    let vault = FileVault::open(&config)
        .await
        .context("failed to open storage")?;

    match run(&vault, cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => match err.downcast_ref::<VaultError>() {
            Some(vault_err) => {
                eprintln!("{}", serde_json::to_string(&vault_err.to_response())?);
                Ok(ExitCode::from(VAULT_ERROR_EXIT))
            }
            None => Err(err),
        },
    }
}

/// Layer `BURROW_` environment variables over the optional config file.
fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }
    let config: AppConfig = figment
        .merge(Env::prefixed("BURROW_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn run(vault: &FileVault, command: Commands) -> Result<()> {
    match command {
        Commands::Account { command } => handle_account_command(vault, command).await,
        Commands::Put {
            account,
            file,
            dir,
            name,
            mime,
            chunk_size,
        } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("cannot derive a name from the file path; pass --name")?,
            };
            let outcome = match chunk_size {
                Some(chunk_size) => {
                    put_chunked(vault, account, &file, name, dir, mime, chunk_size.as_u64())
                        .await?
                }
                None => {
                    let data = tokio::fs::read(&file)
                        .await
                        .with_context(|| format!("failed to read {}", file.display()))?;
                    vault
                        .upload(
                            account,
                            UploadRequest {
                                file_name: name,
                                directory: dir,
                                mime_type: mime,
                                data: Bytes::from(data),
                            },
                        )
                        .await?
                }
            };
            print_json(&outcome)
        }
        Commands::Mkdir {
            account,
            parent,
            name,
        } => print_json(&vault.create_folder(account, &parent, &name).await?),
        Commands::Ls { account, dir, sort } => {
            print_json(&vault.list_files(account, &dir, &sort).await?)
        }
        Commands::Trash { account } => print_json(&vault.list_trash(account).await?),
        Commands::Mv {
            account,
            file_id,
            new_name,
        } => print_json(
            &vault
                .rename(account, FileId::from_uuid(file_id), &new_name)
                .await?,
        ),
        Commands::Rm { account, file_id } => {
            print_json(&vault.soft_delete(account, FileId::from_uuid(file_id)).await?)
        }
        Commands::Restore { account, file_id } => {
            print_json(&vault.restore(account, FileId::from_uuid(file_id)).await?)
        }
        Commands::Purge { account, file_id } => {
            print_json(&vault.purge(account, FileId::from_uuid(file_id)).await?)
        }
        Commands::Get {
            account,
            file_id,
            output,
        } => {
            let (record, mut stream) = vault.download(account, FileId::from_uuid(file_id)).await?;
            let mut sink: Box<dyn tokio::io::AsyncWrite + Unpin> = match &output {
                Some(path) => Box::new(
                    tokio::fs::File::create(path)
                        .await
                        .with_context(|| format!("failed to create {}", path.display()))?,
                ),
                None => Box::new(tokio::io::stdout()),
            };
            while let Some(part) = stream.try_next().await? {
                sink.write_all(&part).await?;
            }
            sink.flush().await?;
            if output.is_some() {
                print_json(&record)?;
            }
            Ok(())
        }
        Commands::Sweep => {
            let stats = vault.sweep_uploads().await?;
            print_json(&serde_json::json!({
                "expired_sessions": stats.expired_sessions,
                "orphaned_staging": stats.orphaned_staging,
            }))
        }
    }
}

async fn handle_account_command(vault: &FileVault, command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::Create { account, quota } => print_json(
            &vault
                .create_account(account, quota.map(ByteSize::as_u64))
                .await?,
        ),
        AccountCommands::Show { account } => print_json(&vault.quota(account).await?),
        AccountCommands::Close { account } => {
            vault.close_account(account).await?;
            print_json(&serde_json::json!({ "closed": account }))
        }
    }
}

/// Send `file` through a chunked upload session, one chunk in memory at a time.
async fn put_chunked(
    vault: &FileVault,
    account: i64,
    file: &Path,
    name: String,
    directory: String,
    mime_type: Option<String>,
    chunk_size: u64,
) -> Result<UploadOutcome> {
    let mut source = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;
    let total_size = source.metadata().await?.len();

    let session = vault
        .init_upload(
            account,
            InitUpload {
                file_name: name,
                directory,
                total_size,
                chunk_size,
                mime_type,
            },
        )
        .await?;

    let sent = send_chunks(vault, account, &session, &mut source).await;
    if let Err(err) = sent {
        if let Err(abort) = vault.abort_upload(account, session.id).await {
            tracing::warn!(upload_id = %session.id, error = %abort, "failed to abort upload");
        }
        return Err(err);
    }
    Ok(vault.complete_upload(account, session.id).await?)
}

async fn send_chunks(
    vault: &FileVault,
    account: i64,
    session: &burrow_core::UploadSession,
    source: &mut tokio::fs::File,
) -> Result<()> {
    for index in 0..session.total_chunks {
        let len = session
            .expected_chunk_len(index)
            .context("chunk index out of range")?;
        let mut buf = vec![0u8; usize::try_from(len)?];
        source
            .read_exact(&mut buf)
            .await
            .context("file changed while uploading")?;
        let progress = vault
            .accept_chunk(account, session.id, index, Bytes::from(buf))
            .await?;
        tracing::debug!(
            index,
            received = progress.received_chunks,
            total = progress.total_chunks,
            "chunk sent"
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
