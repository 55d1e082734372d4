use std::sync::OnceLock;

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::MergedConfig;

static INIT_GUARD: OnceLock<()> = OnceLock::new();

pub fn initialize_logging(config: &MergedConfig) -> Result<()> {
    if INIT_GUARD.set(()).is_err() {
        // Already initialized elsewhere; do nothing and succeed
        return Ok(());
    }

    // RUST_LOG takes priority over the configured level
    let env_filter = || {
        tracing_subscriber::filter::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(config.log_level.to_string()))
    };

    if !config.enable_logging {
        // Diagnostics to stderr only; results stay on stdout
        let init_res = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_env_filter(env_filter())
            .try_init();
        let _ = init_res;
        return Ok(());
    }

    // Try to create the log file, but fall back to stderr if it fails
    let maybe_log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&config.log_file);

    match maybe_log_file {
        Ok(log_file) => {
            let file_subscriber = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_writer(log_file)
                .with_target(true)
                .with_ansi(false)
                .with_filter(env_filter());
            let init_res = tracing_subscriber::registry().with(file_subscriber).try_init();
            let _ = init_res; // ignore AlreadyInit errors silently
        }
        Err(_) => {
            let init_res = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter())
                .try_init();
            let _ = init_res;
        }
    }

    Ok(())
}
