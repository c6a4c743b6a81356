//! City name -> GiDestinationId refresh for the destination mapping table.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::config::GillConfig;
use crate::db::Db;
use crate::error::{FetchError, PersistError};
use crate::gill::client::{DestinationMatch, GillClient};
use crate::loader;
use crate::pipeline::{FetchOutcome, FetchStatus, Fetcher, Pipeline, RunSummary, Sink};

pub const TABLE: &str = "hotels_info_with_gidestination_code";
pub const STATUS_DONE: &str = "Done";
pub const STATUS_NOT_FOUND: &str = "Cannot find.";
pub const STATUS_FAILED: &str = "Fetch failed";

/// Marker recorded for a city once its lookup reaches a terminal outcome,
/// so later passes can skip cities that were already attempted.
pub fn marker_for<P>(outcome: &FetchOutcome<P>) -> &'static str {
    match outcome {
        FetchOutcome::Found(_) => STATUS_DONE,
        FetchOutcome::NotFound => STATUS_NOT_FOUND,
        FetchOutcome::Failed(_) => STATUS_FAILED,
    }
}

struct DestinationFetcher {
    client: GillClient,
}

#[async_trait]
impl Fetcher for DestinationFetcher {
    type Item = String;
    type Payload = DestinationMatch;

    async fn fetch(&self, city: &String) -> Result<FetchStatus<DestinationMatch>, FetchError> {
        self.client.destination_info(city).await
    }
}

struct DestinationSink {
    pool: PgPool,
}

#[async_trait]
impl Sink<String, DestinationMatch> for DestinationSink {
    async fn persist(
        &self,
        city: &String,
        outcome: &FetchOutcome<DestinationMatch>,
    ) -> Result<(), PersistError> {
        match outcome {
            FetchOutcome::Found(dest) => {
                sqlx::query(
                    r#"UPDATE hotels_info_with_gidestination_code
                       SET "GiDestinationId" = $1, "StatusUpdate" = $2
                       WHERE "CityName" = $3"#,
                )
                .bind(dest.id_text())
                .bind(STATUS_DONE)
                .bind(city)
                .execute(&self.pool)
                .await?;
            }
            // negative outcomes never touch GiDestinationId: a prior value
            // stays as it was
            other => {
                sqlx::query(
                    r#"UPDATE hotels_info_with_gidestination_code
                       SET "StatusUpdate" = $1
                       WHERE "CityName" = $2"#,
                )
                .bind(marker_for(other))
                .bind(city)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

/// Refresh `GiDestinationId` for every distinct city in the mapping table.
pub async fn run(db: &Db, cfg: &GillConfig) -> anyhow::Result<RunSummary> {
    let client = GillClient::from_config(cfg)?;
    let cities = loader::distinct_values(&db.pool, TABLE, "CityName").await?;
    info!(cities = cities.len(), "loaded destination work list");

    let pipeline = Pipeline::new(
        DestinationFetcher { client },
        DestinationSink {
            pool: db.pool.clone(),
        },
        cfg.concurrency,
        cfg.retry,
    );
    Ok(pipeline.run(cities).await)
}
