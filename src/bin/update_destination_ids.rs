//! Refresh `GiDestinationId` for every distinct city name in the
//! destination mapping table.

use anyhow::Result;
use chrono::Local;
use gill_sync::config::{DbConfig, GillConfig};
use gill_sync::db::Db;
use gill_sync::sync::destination_ids;
use gill_sync::util::env as env_util;

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    gill_sync::logging::init_tracing("info,sqlx=warn")?;

    let gill_cfg = GillConfig::from_env()?;
    let db_cfg = DbConfig::from_env()?;
    let db = Db::connect(&db_cfg.url, db_cfg.max_connections).await?;

    println!("Start Time: {}", Local::now().format("%I:%M %p"));
    let summary = destination_ids::run(&db, &gill_cfg).await?;
    println!("End Time: {}", Local::now().format("%I:%M %p"));
    println!(
        "{} cities in {:.2?}: {} updated, {} without a match, {} failed, {} not persisted",
        summary.total,
        summary.elapsed,
        summary.succeeded,
        summary.not_found,
        summary.failed,
        summary.not_persisted
    );
    Ok(())
}
