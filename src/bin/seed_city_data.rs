//! Seed the destination mapping table with per-city aggregates from the
//! vervotech hotel listing.

use anyhow::Result;
use gill_sync::config::DbConfig;
use gill_sync::db::Db;
use gill_sync::sync::seed_cities;
use gill_sync::util::env as env_util;

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    gill_sync::logging::init_tracing("info,sqlx=warn")?;

    let db_cfg = DbConfig::from_env()?;
    let db = Db::connect(&db_cfg.url, db_cfg.max_connections).await?;

    let rows = seed_cities::run(&db).await?;
    println!("Seeded {rows} city rows.");
    Ok(())
}
