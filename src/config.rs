//! Configuration management

use anyhow::Result;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory; skill directories live under `<data_dir>/skills`
    pub data_dir: PathBuf,

    /// SQLite database path for skill records
    pub db_path: PathBuf,

    /// Bind address for the admin API
    pub bind_addr: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("SKILLDOCK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("skilldock")
            });

        let db_path = std::env::var("SKILLDOCK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("skilldock.db"));

        let bind_addr =
            std::env::var("SKILLDOCK_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8470".to_string());

        Ok(Self {
            data_dir,
            db_path,
            bind_addr,
        })
    }
}
