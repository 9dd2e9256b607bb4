mod config;
mod runtime;

use anyhow::Context;
use blobrep_core::{
    RemoveObjectOperation, ReplicationMessage, RetrieveObjectOperation, StoreObjectOperation,
    StoreObjectOperationOutcome, StoreOptions, VerifyObjectsOperation,
    VerifyObjectsOperationRequest,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use config::Config;
use runtime::Runtime;
use std::io::{Read, Write};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "blobrep")]
#[command(about = "Relational blob storage with ordered S3 replication")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "blobrep.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file under a storage kind
    Put {
        kind: String,
        name: String,

        /// Source file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        file: String,

        #[arg(long)]
        allow_overwrite: bool,

        #[arg(long, default_value = "")]
        content_type: String,

        /// Modification time (RFC 3339)
        #[arg(long)]
        mtime: Option<DateTime<Utc>>,

        #[arg(long)]
        doc_name: Option<String>,

        #[arg(long)]
        doc_rev: Option<String>,
    },
    /// Read a verified object
    Get {
        kind: String,
        name: String,

        /// Destination file, stdout when omitted
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Check whether an object exists
    Exists { kind: String, name: String },
    /// Remove an object and tombstone its ledger row
    Rm {
        kind: String,
        name: String,

        /// Do not warn when the object has no live ledger row
        #[arg(short, long)]
        quiet: bool,
    },
    /// Audit blob rows against the stored-object ledger
    Verify {
        #[arg(short, long)]
        kind: Vec<String>,

        /// Re-hash content against stored checksums
        #[arg(long)]
        deep: bool,

        #[arg(long)]
        json: bool,
    },
    /// Enqueue a replication message and wait for it to drain
    Replicate {
        /// Message payload, e.g. {"bucket":"draft","name":"a.txt"}
        message: String,

        /// Bucket for payloads that only carry a name
        #[arg(short, long)]
        bucket: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blobrep=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let cfg = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match Runtime::start(&cfg) {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start storage runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = run_command(&runtime, cli.command);
    runtime.shutdown().await;

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` for a negative answer (absent object, unclean audit).
fn run_command(runtime: &Runtime, command: Commands) -> anyhow::Result<bool> {
    let kinds = runtime.kinds.clone();
    let storage_config = runtime.storage_config;

    match command {
        Commands::Put {
            kind,
            name,
            file,
            allow_overwrite,
            content_type,
            mtime,
            doc_name,
            doc_rev,
        } => {
            let options = StoreOptions {
                allow_overwrite,
                doc_name,
                doc_rev,
                content_type,
                mtime,
            };
            let operation = StoreObjectOperation::new(kinds, storage_config);

            let outcome = if file == "-" {
                operation.store_file(&kind, &name, &mut std::io::stdin().lock(), options)?
            } else {
                let mut source = std::fs::File::open(&file)
                    .with_context(|| format!("failed to open {}", file))?;
                operation.store_file(&kind, &name, &mut source, options)?
            };

            match outcome {
                StoreObjectOperationOutcome::Stored { name } => {
                    tracing::info!("stored {}/{}", kind, name);
                    println!("{}", name);
                    Ok(true)
                }
                StoreObjectOperationOutcome::Skipped => {
                    tracing::warn!("store of {}/{} skipped", kind, name);
                    Ok(false)
                }
            }
        }
        Commands::Get { kind, name, output } => {
            let content = RetrieveObjectOperation::new(kinds, storage_config)
                .retrieve_bytes(&kind, &name)
                .with_context(|| format!("failed to read {}/{}", kind, name))?;

            match output {
                Some(path) => std::fs::write(&path, &content)
                    .with_context(|| format!("failed to write {}", path))?,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&content)?;
                    stdout.flush()?;
                }
            }
            Ok(true)
        }
        Commands::Exists { kind, name } => {
            let exists = RetrieveObjectOperation::new(kinds, storage_config)
                .exists_in_storage(&kind, &name)?;
            println!("{}", exists);
            Ok(exists)
        }
        Commands::Rm { kind, name, quiet } => {
            RemoveObjectOperation::new(kinds, storage_config)
                .remove_from_storage(&kind, &name, !quiet)
                .with_context(|| format!("failed to remove {}/{}", kind, name))?;
            Ok(true)
        }
        Commands::Verify { kind, deep, json } => {
            let result = VerifyObjectsOperation::new(kinds)
                .run(VerifyObjectsOperationRequest { kinds: kind, deep })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for report in &result.reports {
                    println!(
                        "{}: checked={} missing={} untracked={} drifted={}",
                        report.kind,
                        report.checked,
                        report.missing.len(),
                        report.untracked.len(),
                        report.drifted.len()
                    );
                    for name in &report.missing {
                        println!("  missing {}", name);
                    }
                    for name in &report.untracked {
                        println!("  untracked {}", name);
                    }
                    for drifted in &report.drifted {
                        println!("  drifted {} ({})", drifted.name, drifted.detail);
                    }
                }
            }
            Ok(result.is_clean())
        }
        Commands::Replicate { message, bucket } => {
            let message = read_payload(&message)?;
            let message = ReplicationMessage::decode(&message, bucket.as_deref())
                .context("invalid replication message")?;
            tracing::info!("enqueueing replication of {}", message.key());
            runtime.enqueue(message)?;
            Ok(true)
        }
    }
}

/// `-` reads the payload from stdin.
fn read_payload(arg: &str) -> anyhow::Result<Vec<u8>> {
    if arg == "-" {
        let mut payload = Vec::new();
        std::io::stdin().read_to_end(&mut payload)?;
        Ok(payload)
    } else {
        Ok(arg.as_bytes().to_vec())
    }
}
