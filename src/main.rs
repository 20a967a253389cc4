use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use mutanabbi::{api, config, db, notify, outbox};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mutanabbi=info,tower_http=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    info!("database ready");

    // Outbox worker (single consumer)
    let notifier = notify::from_config(&cfg)?;
    let poll = Duration::from_millis(cfg.notify.poll_interval_ms);
    let max_backoff = cfg.notify.max_backoff_seconds as i64;
    tokio::spawn(outbox::run_worker(pool.clone(), notifier, poll, max_backoff));

    let bind_addr = cfg.app.bind_addr.clone();
    let app = api::router(api::AppState::new(pool, cfg));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
