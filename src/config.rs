//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const ACCESS_KEY_LEN: usize = 30;
pub const STORED_NAME_PREFIX: &str = "upload_";
pub const UPLOAD_FIELD_NAME: &str = "file";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_MAX_FIELD_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_KEY_TTL_SECS: u64 = 0;
pub const KEY_PRUNE_INTERVAL_SECS: u64 = 60;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "keydrop", version = VERSION_INFO, about = "One-time-key file exchange server")]
pub struct Args {
    #[arg(
        long,
        env = "FILES_API_TOKEN",
        hide_env_values = true,
        help = "Admin token for key issuance and file deletion"
    )]
    pub admin_token: String,
    #[arg(
        short = 'd',
        long,
        env = "UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Directory uploaded files are stored in"
    )]
    pub upload_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "FILES_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "FILES_PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "FILES_MAX_FIELD_SIZE",
        default_value_t = DEFAULT_MAX_FIELD_SIZE,
        help = "Max bytes per non-file multipart field (0 to disable)"
    )]
    pub max_field_size: u64,
    #[arg(
        long,
        env = "FILES_KEY_TTL_SECS",
        default_value_t = DEFAULT_KEY_TTL_SECS,
        help = "Lifetime of an unconsumed upload key in seconds (0 to disable)"
    )]
    pub key_ttl_secs: u64,
    #[arg(
        long,
        env = "FILES_CONFINE_PATHS",
        default_value_t = false,
        help = "Reject file paths that escape the upload directory"
    )]
    pub confine_paths: bool,
}
