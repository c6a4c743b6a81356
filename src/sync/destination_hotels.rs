//! Destination id -> hotel list ingest into `hotel_info_all`.
//!
//! One destination lookup fans out into many hotel rows; each complete row
//! is upserted keyed by `SystemId`, and the destination's own row in the
//! mapping table records the terminal outcome. Hotels missing required
//! fields are skipped, counted, and logged rather than silently dropped.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::GillConfig;
use crate::db::Db;
use crate::error::{FetchError, PersistError};
use crate::gill::client::{value_text, GillClient, HotelSummary};
use crate::loader;
use crate::pipeline::{FetchOutcome, FetchStatus, Fetcher, Pipeline, RunSummary, Sink};

pub const WORK_TABLE: &str = "hotels_info_with_gidestination_code";
pub const STATUS_DONE: &str = "Done";
pub const STATUS_NOT_FOUND: &str = "Cannot find.";
pub const STATUS_FAILED: &str = "Fetch failed";

/// A hotel row ready for upsert; only built when every required field is
/// present in the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct HotelRow {
    pub gi_destination_id: String,
    pub name: String,
    pub system_id: String,
    pub rating: String,
    pub city: String,
    pub address1: String,
    pub address2: String,
    pub image_url: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl HotelRow {
    /// Build a row from a payload hotel, or name the first missing field.
    pub fn from_summary(h: &HotelSummary) -> Result<Self, &'static str> {
        let gi = h
            .gi_destination_id
            .as_ref()
            .filter(|v| !v.is_null())
            .ok_or("giDestinationId")?;
        let name = h
            .name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or("name")?;
        let system_id = h
            .system_id
            .as_ref()
            .filter(|v| !v.is_null())
            .ok_or("systemId")?;
        let rating = h.rating.as_ref().filter(|v| !v.is_null()).ok_or("rating")?;
        let city = h.city.as_deref().ok_or("city")?;
        let address1 = h.address1.as_deref().ok_or("address1")?;
        let address2 = h.address2.as_deref().ok_or("address2")?;
        let image_url = h.image_url.as_deref().ok_or("imageUrl")?;
        let geo = h.geo_code.as_ref().ok_or("geoCode")?;
        let latitude = geo.lat.ok_or("geoCode")?;
        let longitude = geo.lon.ok_or("geoCode")?;
        Ok(Self {
            gi_destination_id: value_text(gi),
            name: name.to_string(),
            system_id: value_text(system_id),
            rating: value_text(rating),
            city: city.to_string(),
            address1: address1.to_string(),
            address2: address2.to_string(),
            image_url: image_url.to_string(),
            latitude,
            longitude,
        })
    }
}

struct DestinationHotelsFetcher {
    client: GillClient,
}

#[async_trait]
impl Fetcher for DestinationHotelsFetcher {
    type Item = String;
    type Payload = Vec<HotelSummary>;

    async fn fetch(
        &self,
        destination_id: &String,
    ) -> Result<FetchStatus<Vec<HotelSummary>>, FetchError> {
        self.client.hotels_by_destination(destination_id).await
    }
}

struct DestinationHotelsSink {
    pool: PgPool,
    incomplete: AtomicUsize,
}

impl DestinationHotelsSink {
    fn incomplete_count(&self) -> usize {
        self.incomplete.load(Ordering::Relaxed)
    }
}

async fn upsert_hotel(pool: &PgPool, row: &HotelRow) -> Result<(), PersistError> {
    sqlx::query(
        r#"INSERT INTO hotel_info_all (
               "GiDestinationId", "HotelName", "SystemId", "Rating", "City",
               "Address1", "Address2", "ImageUrl", "Latitude", "Longitude",
               "StatusUpdate"
           )
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
           ON CONFLICT ("SystemId") DO UPDATE SET
               "GiDestinationId" = EXCLUDED."GiDestinationId",
               "HotelName" = EXCLUDED."HotelName",
               "Rating" = EXCLUDED."Rating",
               "City" = EXCLUDED."City",
               "Address1" = EXCLUDED."Address1",
               "Address2" = EXCLUDED."Address2",
               "ImageUrl" = EXCLUDED."ImageUrl",
               "Latitude" = EXCLUDED."Latitude",
               "Longitude" = EXCLUDED."Longitude",
               "StatusUpdate" = EXCLUDED."StatusUpdate""#,
    )
    .bind(&row.gi_destination_id)
    .bind(&row.name)
    .bind(&row.system_id)
    .bind(&row.rating)
    .bind(&row.city)
    .bind(&row.address1)
    .bind(&row.address2)
    .bind(&row.image_url)
    .bind(row.latitude)
    .bind(row.longitude)
    .bind(STATUS_DONE)
    .execute(pool)
    .await?;
    Ok(())
}

async fn mark_destination(
    pool: &PgPool,
    destination_id: &str,
    status: &str,
) -> Result<(), PersistError> {
    sqlx::query(
        r#"UPDATE hotels_info_with_gidestination_code
           SET "StatusUpdate" = $1
           WHERE "GiDestinationId" = $2"#,
    )
    .bind(status)
    .bind(destination_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl Sink<String, Vec<HotelSummary>> for DestinationHotelsSink {
    async fn persist(
        &self,
        destination_id: &String,
        outcome: &FetchOutcome<Vec<HotelSummary>>,
    ) -> Result<(), PersistError> {
        match outcome {
            FetchOutcome::Found(hotels) => {
                for hotel in hotels {
                    match HotelRow::from_summary(hotel) {
                        Ok(row) => upsert_hotel(&self.pool, &row).await?,
                        Err(missing) => {
                            self.incomplete.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                destination = %destination_id,
                                missing,
                                "incomplete hotel payload; row skipped"
                            );
                        }
                    }
                }
                mark_destination(&self.pool, destination_id, STATUS_DONE).await
            }
            FetchOutcome::NotFound => {
                mark_destination(&self.pool, destination_id, STATUS_NOT_FOUND).await
            }
            FetchOutcome::Failed(_) => {
                mark_destination(&self.pool, destination_id, STATUS_FAILED).await
            }
        }
    }
}

/// Ingest every destination's hotel list. Returns the run summary together
/// with the number of hotel rows skipped for missing required fields.
pub async fn run(db: &Db, cfg: &GillConfig) -> anyhow::Result<(RunSummary, usize)> {
    let client = GillClient::from_config(cfg)?;
    let destination_ids = loader::distinct_values(&db.pool, WORK_TABLE, "GiDestinationId").await?;
    info!(
        destinations = destination_ids.len(),
        "loaded destination-hotels work list"
    );

    let pipeline = Pipeline::new(
        DestinationHotelsFetcher { client },
        DestinationHotelsSink {
            pool: db.pool.clone(),
            incomplete: AtomicUsize::new(0),
        },
        cfg.concurrency,
        cfg.retry,
    );
    let summary = pipeline.run(destination_ids).await;
    let incomplete = pipeline.sink().incomplete_count();
    if incomplete > 0 {
        warn!(incomplete, "hotel rows skipped for missing required fields");
    }
    Ok((summary, incomplete))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gill::client::GeoCode;
    use serde_json::json;

    fn complete_summary() -> HotelSummary {
        HotelSummary {
            gi_destination_id: Some(json!("D123")),
            name: Some("Palm View".into()),
            system_id: Some(json!(99001)),
            rating: Some(json!(4.5)),
            city: Some("Dubai".into()),
            address1: Some("1 Marina Walk".into()),
            address2: Some("Dubai Marina".into()),
            image_url: Some("https://img.example/99001.jpg".into()),
            geo_code: Some(GeoCode {
                lat: Some(25.08),
                lon: Some(55.14),
            }),
        }
    }

    #[test]
    fn complete_payload_maps_to_a_row() {
        let row = HotelRow::from_summary(&complete_summary()).unwrap();
        assert_eq!(row.gi_destination_id, "D123");
        assert_eq!(row.system_id, "99001");
        assert_eq!(row.rating, "4.5");
        assert_eq!(row.latitude, 25.08);
        assert_eq!(row.longitude, 55.14);
    }

    #[test]
    fn missing_required_field_names_the_field() {
        let mut hotel = complete_summary();
        hotel.system_id = None;
        assert_eq!(HotelRow::from_summary(&hotel), Err("systemId"));

        let mut hotel = complete_summary();
        hotel.geo_code = Some(GeoCode {
            lat: Some(25.08),
            lon: None,
        });
        assert_eq!(HotelRow::from_summary(&hotel), Err("geoCode"));

        let mut hotel = complete_summary();
        hotel.name = Some("   ".into());
        assert_eq!(HotelRow::from_summary(&hotel), Err("name"));
    }

    #[test]
    fn null_ids_count_as_missing() {
        let mut hotel = complete_summary();
        hotel.gi_destination_id = Some(json!(null));
        assert_eq!(HotelRow::from_summary(&hotel), Err("giDestinationId"));
    }
}
