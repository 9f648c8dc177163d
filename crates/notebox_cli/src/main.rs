//! `notebox` server entry point.
//!
//! # Responsibility
//! - Turn flags and environment variables into an `AppConfig`.
//! - Start logging, open the database, then hand off to the HTTP server.

use std::{net::IpAddr, path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use log::{error, info};
use notebox_core::{db::open_db, default_log_level, init_logging, KeyStrategy, RateLimitConfig};
use notebox_http::{config, start_server, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "notebox")]
#[command(about = "Notes REST API backed by SQLite")]
#[command(version)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "NOTEBOX_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// SQLite database file; created and migrated on first start.
    #[arg(long, env = "NOTEBOX_DATABASE", default_value = config::DEFAULT_DATABASE)]
    database: PathBuf,

    /// The single browser origin allowed to call the API.
    #[arg(long, env = "NOTEBOX_ALLOWED_ORIGIN", default_value = config::DEFAULT_ALLOWED_ORIGIN)]
    allowed_origin: String,

    /// Requests allowed per client in one window.
    #[arg(long, env = "NOTEBOX_RATE_LIMIT_MAX", default_value_t = 100)]
    rate_limit_max: u32,

    #[arg(long, env = "NOTEBOX_RATE_LIMIT_WINDOW_SECS", default_value_t = 60)]
    rate_limit_window_secs: u64,

    /// `per-ip` or `global`.
    #[arg(long, env = "NOTEBOX_RATE_LIMIT_KEY", default_value_t = KeyStrategy::PerIp)]
    rate_limit_key: KeyStrategy,

    #[arg(long, env = "NOTEBOX_STORAGE_TIMEOUT_MS", default_value_t = 5000)]
    storage_timeout_ms: u64,

    /// One of error|warn|info|debug|trace.
    #[arg(long, env = "NOTEBOX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write rotated log files here instead of stderr.
    #[arg(long, env = "NOTEBOX_LOG_DIR")]
    log_dir: Option<String>,
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig {
            bind: self.bind,
            port: self.port,
            database: self.database.clone(),
            allowed_origin: self.allowed_origin.clone(),
            rate_limit: RateLimitConfig {
                max_requests: self.rate_limit_max,
                window: Duration::from_secs(self.rate_limit_window_secs),
            },
            rate_limit_key: self.rate_limit_key,
            storage_timeout: Duration::from_millis(self.storage_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    if let Err(e) = init_logging(level, cli.log_dir.as_deref()) {
        eprintln!("notebox: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = cli.app_config();
    if let Err(e) = config.validate() {
        error!("event=server_config module=cli status=error error={e}");
        return ExitCode::FAILURE;
    }

    let conn = match open_db(&config.database) {
        Ok(conn) => conn,
        Err(e) => {
            error!(
                "event=server_config module=cli status=error database={} error={e}",
                config.database.display()
            );
            return ExitCode::FAILURE;
        }
    };

    info!(
        "event=server_config module=cli status=ok version={} database={} rate_limit={}/{}s key={}",
        notebox_core::core_version(),
        config.database.display(),
        config.rate_limit.max_requests,
        config.rate_limit.window.as_secs(),
        config.rate_limit_key
    );

    match start_server(config, conn).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("event=app_stop module=cli status=error error={e}");
            ExitCode::FAILURE
        }
    }
}
