use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "dsa_tutor=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log to stderr (proxy and one-shot modes)
pub fn init_stderr() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))
}

/// Log to a file, since the TUI owns the terminal. Returns the log path.
pub fn init_file() -> Result<PathBuf> {
    let log_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join("dsa-tutor");
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("dsa-tutor.log");
    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    Ok(log_path)
}
