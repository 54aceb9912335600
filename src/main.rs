//! Chartway - client-adaptive healthcare records gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chartway::{
    config::{Args, StorageBackend},
    db::{MemoryStore, MongoStore, Storage},
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chartway={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Chartway - Healthcare Records Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Storage: {}", args.storage_backend);
    if args.storage_backend == StorageBackend::Mongo {
        info!("MongoDB: {} (db: {})", args.mongodb_uri, args.mongodb_db);
    }
    info!("Always-audited clients: {:?}", args.audit_client_list());
    info!("======================================");

    let storage: Arc<dyn Storage> = match args.storage_backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Mongo => {
            match MongoStore::connect(&args.mongodb_uri, &args.mongodb_db).await {
                Ok(store) => {
                    info!("MongoDB connected successfully");
                    Arc::new(store)
                }
                Err(e) => {
                    if args.dev_mode {
                        warn!("MongoDB connection failed (dev mode, using memory storage): {}", e);
                        Arc::new(MemoryStore::new())
                    } else {
                        error!("MongoDB connection failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        }
    };

    let state = Arc::new(server::AppState::with_storage(args, storage)?);

    if let Err(e) = server::run(state).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
