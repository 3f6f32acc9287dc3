use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::info;

use hitrollup_core::dimension::ReindexTarget;
use hitrollup_server::config::Config;
use hitrollup_server::state::AppState;

/// `hitrollup health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$HITROLLUP_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("HITROLLUP_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

fn parse_day(raw: Option<&String>) -> Result<Option<NaiveDate>> {
    raw.map(|raw| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))
    })
    .transpose()
}

/// `hitrollup reindex <targets> [since] [until]`
///
/// `targets` is a comma-separated list such as `all` or `hit_counts,ref_counts`.
async fn run_reindex_command(state: &AppState, args: &[String]) -> Result<()> {
    let Some(raw_targets) = args.get(2) else {
        bail!("usage: hitrollup reindex <targets> [since] [until]");
    };
    let names: Vec<&str> = raw_targets.split(',').filter(|s| !s.trim().is_empty()).collect();
    let targets = ReindexTarget::parse_list(&names)?;
    let since = parse_day(args.get(3))?;
    let until = parse_day(args.get(4))?;

    let summary = state.reindex(since, until, &targets).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Health-check subcommand is handled before logging and storage are set up
    // so the probe stays fast.
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }
    // Initialise structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hitrollup=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure data directory exists before opening DuckDB.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/hitrollup.db", cfg.data_dir);
    let db = hitrollup_duckdb::DuckDbBackend::open(
        &db_path,
        &cfg.duckdb_memory_limit,
        cfg.upsert_dialect,
    )?;

    let state = Arc::new(AppState::new(db, cfg.clone()));

    if args.get(1).map(|s| s.as_str()) == Some("reindex") {
        return run_reindex_command(&state, &args).await;
    }
    if let Some(other) = args.get(1) {
        bail!("unknown command {other:?}; expected health or reindex");
    }

    // Loops stop at their next tick once shutdown begins; an in-flight drain
    // is never cancelled.
    let _background = hitrollup_server::scheduler::spawn_all(&state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = hitrollup_server::app::build_app(Arc::clone(&state));

    info!(
        port = cfg.port,
        dialect = ?cfg.upsert_dialect,
        drain_interval_ms = cfg.drain_interval_ms,
        "hitrollup listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let state_for_shutdown = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            state_for_shutdown.begin_shutdown();
            info!("Shutdown requested");
        })
        .await?;

    state.begin_shutdown();
    tokio::time::timeout(Duration::from_secs(5), state.final_drain())
        .await
        .ok();
    tokio::time::timeout(Duration::from_secs(5), state.tasks.wait())
        .await
        .ok();

    Ok(())
}
