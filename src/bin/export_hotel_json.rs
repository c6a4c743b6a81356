//! Write one reshaped JSON file per completed hotel record.

use anyhow::Result;
use chrono::Local;
use gill_sync::config::DbConfig;
use gill_sync::db::Db;
use gill_sync::export::json as json_export;
use gill_sync::util::env as env_util;

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    gill_sync::logging::init_tracing("info,sqlx=warn")?;

    let db_cfg = DbConfig::from_env()?;
    let db = Db::connect(&db_cfg.url, db_cfg.max_connections).await?;

    println!("Start Time: {}", Local::now().format("%I:%M %p"));
    let written = json_export::run(&db).await?;
    println!("End Time: {}", Local::now().format("%I:%M %p"));
    println!("Wrote {written} hotel JSON files.");
    Ok(())
}
