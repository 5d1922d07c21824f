use dotenvy::dotenv;

use runtrace::config;
use runtrace::retention;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let dry_run = args.iter().any(|a| a == "--dry-run");

    let days_to_keep = args
        .iter()
        .position(|a| a == "--days")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(*config::RETENTION_DAYS);

    let report = retention::run(
        &config::BASE_DIR,
        &config::DB_PATH,
        days_to_keep,
        *config::RETENTION_BATCH_SIZE,
        dry_run,
    )
    .await
    .map_err(|e| anyhow::anyhow!(e))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
