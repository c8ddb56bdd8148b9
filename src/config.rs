use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized gateway configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Anonymous read-only S3 gateway")]
pub struct Args {
    /// Host to bind to (overrides ANON_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ANON_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding object payloads (overrides ANON_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata catalog URL (overrides ANON_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Apply the catalog schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args, |name: &str| env::var(name))?, migrate))
    }

    /// CLI values win; environment fills the gaps; then defaults.
    fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_host = lookup("ANON_GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match lookup("ANON_GATEWAY_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ANON_GATEWAY_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading ANON_GATEWAY_PORT"),
        };
        let env_storage =
            lookup("ANON_GATEWAY_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = lookup("ANON_GATEWAY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/object_store.db".into());

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
