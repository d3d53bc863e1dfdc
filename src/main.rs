//! `hijackguard` command-line entry point.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use hijackguard::binding::{hash_token, SessionBinder, SessionVerifier};
use hijackguard::config::Config;
use hijackguard::{gateway, store};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit code for `verify` when the session looks hijacked.
const EXIT_HIJACKED: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "hijackguard",
    version,
    about = "Bind session tokens to device fingerprints and detect hijacking"
)]
struct Cli {
    /// Config file (default: $HIJACKGUARD_CONFIG or ~/.hijackguard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Bind a session token to a fingerprint
    Bind {
        #[command(flatten)]
        token: TokenArgs,
        #[arg(long)]
        fingerprint: String,
    },
    /// Check a session token against a freshly observed fingerprint
    Verify {
        #[command(flatten)]
        token: TokenArgs,
        #[arg(long, default_value = "")]
        fingerprint: String,
    },
    /// Print the SHA-256 hex used as the binding key for a token
    HashToken { token: String },
    /// Print the JSON schema of the config file
    ConfigSchema,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct TokenArgs {
    /// Raw session token (hashed before use)
    #[arg(long)]
    token: Option<String>,
    /// Pre-computed token hash
    #[arg(long)]
    token_hash: Option<String>,
}

impl TokenArgs {
    /// Binding key. An empty token stays empty so it reads as absent
    /// instead of hashing to a real key.
    fn key(&self) -> String {
        match (&self.token, &self.token_hash) {
            (Some(token), _) if token.is_empty() => String::new(),
            (Some(token), _) => hash_token(token),
            (None, Some(hash)) => hash.clone(),
            (None, None) => String::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hijackguard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::HashToken { token } => {
            println!("{}", hash_token(token));
            return Ok(());
        }
        Command::ConfigSchema => {
            println!("{}", Config::json_schema()?);
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            gateway::run_gateway(&host, port, config).await
        }
        Command::Bind { token, fingerprint } => {
            let store = store::open_store(&config.store).await?;
            let outcome = SessionBinder::new(store).bind(&token.key(), &fingerprint).await;
            println!("{}", outcome.label());
            Ok(())
        }
        Command::Verify { token, fingerprint } => {
            let store = store::open_store(&config.store).await?;
            let verification = SessionVerifier::new(store)
                .verify(&token.key(), &fingerprint)
                .await?;
            println!("{}", serde_json::to_string(&verification.to_record())?);
            if verification.is_hijacked() {
                std::process::exit(EXIT_HIJACKED);
            }
            Ok(())
        }
        Command::HashToken { .. } | Command::ConfigSchema => Ok(()),
    }
}
