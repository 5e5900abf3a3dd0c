use anyhow::Result;
use loan_summary::{config::JobConfig, pipeline, session::Session};
use std::env;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();
    info!("start job: {}", pipeline::timestamp());

    // ─── 2) load config ──────────────────────────────────────────────
    let config = JobConfig::from_env()?;
    info!(
        app = %config.app_name,
        input = %config.input,
        output = %config.output,
        "configuration"
    );

    // ─── 3) open session, run, always stop ───────────────────────────
    let session = Session::open(&config).await?;
    let result = pipeline::run(&session, &config).await;
    session.stop();

    if let Err(e) = &result {
        error!("job failed: {:#}", e);
    }
    result.map(|_| ())
}
