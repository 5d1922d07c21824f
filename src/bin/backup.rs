use dotenvy::dotenv;
use std::path::PathBuf;

use runtrace::backup;
use runtrace::config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.get(1).map(String::as_str) == Some("restore") {
        let source = args
            .get(2)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("usage: runtrace-backup restore <path-to-backup>"))?;
        let safety_root = config::BACKUP_DIR.join("safety_backups");
        let report = backup::restore(&source, &config::DB_PATH, &safety_root)
            .map_err(|e| anyhow::anyhow!(e))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let report = backup::run(
        &config::DB_PATH,
        &config::BACKUP_DIR,
        *config::BACKUP_MIN_FREE_BYTES,
        *config::BACKUP_RETENTION_DAYS,
    )
    .map_err(|e| anyhow::anyhow!(e))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
