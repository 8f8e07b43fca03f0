//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and
//! files for debugging long-lived sessions and resolver decisions.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).expect("Failed to create log directory");
        }

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(EnvFilter::new(log_level.clone())),
            )
            .with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level)),
            );

        // A global subscriber may already exist when embedded; keep it.
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized, keeping existing one");
        }

        tracing::info!(
            pid,
            environment = %environment,
            log_file = %log_path.display(),
            "🔧 Structured logging initialized"
        );

        // The appender guard must outlive the process for the file layer to
        // keep flushing.
        std::mem::forget(guard);
    });
}

fn get_environment() -> String {
    env::var("GUILDMIRROR_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    if let Ok(level) = env::var("RUST_LOG") {
        return level;
    }
    match environment {
        "production" => "info".to_string(),
        "test" => "warn".to_string(),
        _ => "debug".to_string(),
    }
}
