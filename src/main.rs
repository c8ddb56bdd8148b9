use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod errors;
mod gateway;
mod handlers;
mod models;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting anon-gateway with config: {:?}", cfg);

    if !Path::new(&cfg.storage_dir).exists() {
        tracing::warn!(
            "Storage directory {} does not exist; every object read will fail",
            cfg.storage_dir
        );
    }

    // --- Open the metadata catalog ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Only --migrate may create the catalog; serving never writes.
    let mut connect = SqliteConnectOptions::from_str(db_url)?;
    if migrate {
        let db_path = db_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("file:");
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        connect = connect.create_if_missing(true);
    } else {
        connect = connect.read_only(true);
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        backend::local::apply_schema(&db).await?;
        tracing::info!("Catalog migration complete.");
        return Ok(());
    }

    // --- Initialize backend client + anonymous gateway ---
    let client = backend::local::LocalClient::new(db, cfg.storage_dir.clone());
    let gateway = gateway::AnonGateway::new(Arc::new(client));

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(gateway);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
