//! keydrop server binary.
//!
//! A small file-exchange service: an admin token holder requests single-use
//! upload keys, each key admits exactly one multipart upload, and stored files
//! are served publicly and deleted with the admin token. The main entry point
//! parses configuration, builds the Axum router and serves it until shutdown.

mod app;
mod atomic;
mod auth;
mod background;
mod config;
mod error;
mod etag;
mod files;
mod http;
mod keys;
mod logging;
mod storage;
#[cfg(test)]
mod test_utils;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use crate::auth::AuthConfig;
use crate::background::spawn_background_tasks;
use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::keys::KeyStore;
use crate::storage::Storage;
use crate::upload::UploadConfig;

shadow!(build);

/// Starts the keydrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    if args.admin_token.is_empty() {
        warn!("admin token is empty, key issuance and deletion are disabled");
    }
    if !args.confine_paths {
        warn!("path containment disabled, file paths are not checked for traversal");
    }

    let storage = Arc::new(Storage::new(
        PathBuf::from(&args.upload_dir),
        args.confine_paths,
    ));
    storage.ensure_root().await?;
    let keys = Arc::new(KeyStore::new(Duration::from_secs(args.key_ttl_secs)));
    let auth_config = Arc::new(AuthConfig {
        admin_token: args.admin_token.clone(),
    });
    let upload_config = Arc::new(UploadConfig {
        max_field_size: args.max_field_size,
    });

    let app = app::build_router(storage, keys.clone(), auth_config, upload_config);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!(upload_dir = args.upload_dir, "Running on http://{}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(keys);
    tokio::spawn(shutdown_signal(handle));
    server.await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
