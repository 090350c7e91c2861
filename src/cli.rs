//! # VGWCTL CLI
//!
//! Command-line boundary over the same secret accessor the HTTP gateway
//! uses. Connection settings come from the environment (see `config`),
//! with `--addr` and `--mount` overrides.
//!
//! ## Usage
//!
//! ```bash
//! # Check server health
//! vgwctl health
//!
//! # Read the latest version of a secret
//! vgwctl get app/config
//!
//! # Read a specific version, or a single field
//! vgwctl get app/config --version 3
//! vgwctl get app/config --field password
//!
//! # Read through the non-versioned KV v1 API
//! vgwctl get app/config --legacy
//!
//! # Write a new version
//! vgwctl put app/config name=demo tier=gold
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use vault_gateway::config::GatewayConfig;
use vault_gateway::kv::{SecretData, SecretStore, VaultKv};
use vault_gateway::transport::VaultTransport;

/// Vault KV gateway CLI
#[derive(Parser)]
#[command(name = "vgwctl")]
#[command(
    about = "Vault KV gateway CLI",
    long_about = None,
    after_help = "\
Examples:
  vgwctl health
  vgwctl get app/config
  vgwctl get app/config --field password
  vgwctl put app/config name=demo
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Vault server address (overrides VAULT_ADDR)
    #[arg(long, global = true)]
    addr: Option<String>,

    /// KV mount to operate on (overrides VAULT_MOUNT)
    #[arg(long, global = true)]
    mount: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health
    Health,
    /// Read a secret
    Get {
        /// Secret path relative to the mount
        #[arg(value_name = "PATH")]
        path: String,

        /// Read a specific version instead of the latest
        #[arg(long)]
        version: Option<u64>,

        /// Print a single field instead of the whole mapping
        #[arg(long)]
        field: Option<String>,

        /// Read through the non-versioned KV v1 API
        #[arg(long, conflicts_with = "version")]
        legacy: bool,
    },
    /// Write a secret as KEY=VALUE pairs (creates a new version)
    Put {
        /// Secret path relative to the mount
        #[arg(value_name = "PATH")]
        path: String,

        /// Fields to store
        #[arg(value_name = "KEY=VALUE", required = true, value_parser = parse_entry)]
        entries: Vec<(String, String)>,
    },
}

fn parse_entry(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("'{raw}' is not a KEY=VALUE pair")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vgwctl=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = GatewayConfig::from_env().context("failed to load configuration")?;
    if let Some(addr) = cli.addr {
        config.addr = addr.trim_end_matches('/').to_string();
    }
    if let Some(mount) = cli.mount {
        config.mount = mount;
    }

    let transport =
        Arc::new(VaultTransport::new(&config).context("failed to initialize vault transport")?);
    let kv = VaultKv::new(transport, config.mount.clone());

    match cli.command {
        Commands::Health => {
            let status = kv.health().await.context("health check failed")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Get {
            path,
            version,
            field,
            legacy,
        } => {
            if let Some(field) = field {
                let value = kv.read_field(&path, &field).await?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let secret = if legacy {
                    kv.read_legacy(&path).await?
                } else if let Some(version) = version {
                    kv.read_version(&path, version).await?
                } else {
                    kv.read(&path).await?
                };

                match secret {
                    Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                    None => anyhow::bail!("no secret at '{path}'"),
                }
            }
        }
        Commands::Put { path, entries } => {
            let data: SecretData = entries
                .into_iter()
                .map(|(key, value)| (key, serde_json::Value::String(value)))
                .collect();
            let written = kv.write(&path, data).await?;
            println!("wrote '{path}' (version {})", written.version);
        }
    }

    Ok(())
}
