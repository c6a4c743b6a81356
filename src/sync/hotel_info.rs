//! System id -> full hotel record refresh for `hotel_info_all`.
//!
//! The payload is stored wholesale in the `HotelInfo` JSON column; a few
//! address fields are copied into their own columns so they stay filterable
//! without parsing the blob.

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::info;

use crate::config::GillConfig;
use crate::db::Db;
use crate::error::{FetchError, PersistError};
use crate::gill::client::GillClient;
use crate::pipeline::{FetchOutcome, FetchStatus, Fetcher, Pipeline, RunSummary, Sink};

pub const TABLE: &str = "hotel_info_all";
pub const STATUS_DONE_JSON: &str = "Done Json";
pub const STATUS_NOT_FOUND_JSON: &str = "Not found json";
pub const STATUS_FAILED: &str = "Fetch failed";

fn address_field<'a>(info: &'a Value, key: &str) -> Option<&'a str> {
    info.pointer(&format!("/address/{key}"))
        .and_then(Value::as_str)
}

/// System ids that still need a fetch: never attempted, or attempted without
/// reaching `Done Json`. The optional country filter is a bound parameter.
async fn pending_system_ids(pool: &PgPool, country: Option<&str>) -> anyhow::Result<Vec<String>> {
    let ids: Vec<String> = match country {
        Some(cc) => {
            sqlx::query_scalar(
                r#"SELECT DISTINCT "SystemId"::text FROM hotel_info_all
                   WHERE ("StatusUpdateHotelInfo" IS NULL OR "StatusUpdateHotelInfo" <> $1)
                     AND "CountryCode" = $2
                     AND "SystemId" IS NOT NULL"#,
            )
            .bind(STATUS_DONE_JSON)
            .bind(cc)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                r#"SELECT DISTINCT "SystemId"::text FROM hotel_info_all
                   WHERE ("StatusUpdateHotelInfo" IS NULL OR "StatusUpdateHotelInfo" <> $1)
                     AND "SystemId" IS NOT NULL"#,
            )
            .bind(STATUS_DONE_JSON)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(ids.into_iter().filter(|v| !v.trim().is_empty()).collect())
}

struct HotelInfoFetcher {
    client: GillClient,
}

#[async_trait]
impl Fetcher for HotelInfoFetcher {
    type Item = String;
    type Payload = Value;

    async fn fetch(&self, system_id: &String) -> Result<FetchStatus<Value>, FetchError> {
        self.client.hotel_info(system_id).await
    }
}

struct HotelInfoSink {
    pool: PgPool,
}

#[async_trait]
impl Sink<String, Value> for HotelInfoSink {
    async fn persist(
        &self,
        system_id: &String,
        outcome: &FetchOutcome<Value>,
    ) -> Result<(), PersistError> {
        match outcome {
            FetchOutcome::Found(info) => {
                // COALESCE keeps previously-known address columns when the
                // fresh payload omits them
                sqlx::query(
                    r#"UPDATE hotel_info_all
                       SET "HotelInfo" = $1,
                           "StatusUpdateHotelInfo" = $2,
                           "CountryCode" = COALESCE($3, "CountryCode"),
                           "ZipCode" = COALESCE($4, "ZipCode"),
                           "CountryName" = COALESCE($5, "CountryName")
                       WHERE "SystemId"::text = $6"#,
                )
                .bind(info)
                .bind(STATUS_DONE_JSON)
                .bind(address_field(info, "countryCode"))
                .bind(address_field(info, "zipCode"))
                .bind(address_field(info, "countryName"))
                .bind(system_id)
                .execute(&self.pool)
                .await?;
            }
            FetchOutcome::NotFound => {
                sqlx::query(
                    r#"UPDATE hotel_info_all
                       SET "HotelInfo" = $1, "StatusUpdateHotelInfo" = $2
                       WHERE "SystemId"::text = $3"#,
                )
                .bind(json!({}))
                .bind(STATUS_NOT_FOUND_JSON)
                .bind(system_id)
                .execute(&self.pool)
                .await?;
            }
            FetchOutcome::Failed(_) => {
                sqlx::query(
                    r#"UPDATE hotel_info_all
                       SET "StatusUpdateHotelInfo" = $1
                       WHERE "SystemId"::text = $2"#,
                )
                .bind(STATUS_FAILED)
                .bind(system_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

/// Fetch the full hotel record for every pending system id.
pub async fn run(db: &Db, cfg: &GillConfig) -> anyhow::Result<RunSummary> {
    let client = GillClient::from_config(cfg)?;
    let ids = pending_system_ids(&db.pool, cfg.country_filter.as_deref()).await?;
    info!(
        pending = ids.len(),
        country = cfg.country_filter.as_deref().unwrap_or("all"),
        "loaded hotel-info work list"
    );

    let pipeline = Pipeline::new(
        HotelInfoFetcher { client },
        HotelInfoSink {
            pool: db.pool.clone(),
        },
        cfg.concurrency,
        cfg.retry,
    );
    Ok(pipeline.run(ids).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_fields_come_from_the_nested_block() {
        let info = json!({
            "name": "Palm View",
            "address": {
                "countryCode": "AE",
                "zipCode": "00000",
                "countryName": "United Arab Emirates"
            }
        });
        assert_eq!(address_field(&info, "countryCode"), Some("AE"));
        assert_eq!(address_field(&info, "zipCode"), Some("00000"));
        assert_eq!(
            address_field(&info, "countryName"),
            Some("United Arab Emirates")
        );
    }

    #[test]
    fn missing_address_block_yields_none() {
        let info = json!({ "name": "No Address Inn" });
        assert_eq!(address_field(&info, "countryCode"), None);
    }
}
