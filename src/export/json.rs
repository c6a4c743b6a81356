//! Flat-file export: one reshaped JSON document per hotel whose record
//! fetch already completed, named `<SystemId>.json` under the output
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::db::Db;
use crate::sync::hotel_info::STATUS_DONE_JSON;
use crate::util::env as env_util;

pub const DEFAULT_EXPORT_DIR: &str = "./gill_hotel_json_files";

/// Columns feeding the export record alongside the stored payload.
#[derive(Debug, Clone, Default)]
pub struct HotelRecordRow {
    pub system_id: String,
    pub hotel_name: Option<String>,
    pub gi_destination_id: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub image_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rating: Option<String>,
    pub hotel_info: Value,
}

fn payload_text<'a>(info: &'a Value, ptr: &str) -> Option<&'a str> {
    info.pointer(ptr).and_then(Value::as_str)
}

fn text_or(info: &Value, ptr: &str, fallback: &Option<String>) -> Value {
    match payload_text(info, ptr) {
        Some(s) => json!(s),
        None => json!(fallback),
    }
}

fn amenity_list(info: &Value, ptr: &str) -> Vec<Value> {
    info.pointer(ptr)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|label| json!({ "type": label, "title": label, "icon": null }))
                .collect()
        })
        .unwrap_or_default()
}

/// Reshape a stored row + payload into the fixed export record.
pub fn build_export_record(row: &HotelRecordRow) -> Value {
    let info = &row.hotel_info;

    let photos: Vec<Value> = info
        .pointer("/imageUrls")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(|url| json!({ "picture_id": null, "title": null, "url": url }))
                .collect()
        })
        .unwrap_or_default();

    let latitude = info
        .pointer("/geoCode/lat")
        .and_then(Value::as_f64)
        .or(row.latitude);
    let longitude = info
        .pointer("/geoCode/lon")
        .and_then(Value::as_f64)
        .or(row.longitude);
    let full_address = format!(
        "{}, {}",
        row.address1.as_deref().unwrap_or_default(),
        row.address2.as_deref().unwrap_or_default()
    );

    let address = json!({
        "latitude": latitude,
        "longitude": longitude,
        "address_line_1": row.address1,
        "address_line_2": row.address2,
        "city": row.city,
        "state": payload_text(info, "/address/stateName"),
        "country": row.country_name,
        "country_code": row.country_code,
        "postal_code": row.zip_code,
        "full_address": full_address,
    });

    json!({
        "hotel_id": row.system_id,
        "name": text_or(info, "/name", &row.hotel_name),
        "name_local": text_or(info, "/name", &row.hotel_name),
        "destination_code": row.gi_destination_id,
        "country_code": row.country_code,
        "star_rating": info.pointer("/rating").cloned().unwrap_or_else(|| json!(row.rating)),
        "primary_photo": text_or(info, "/imageUrl", &row.image_url),
        "review_rating": {
            "source": null,
            "number_of_reviews": null,
            "rating_average": info.pointer("/tripAdvisorRating").cloned().unwrap_or(Value::Null),
        },
        "address": address,
        // the local-language block mirrors the primary one; the source feed
        // carries no separate localization
        "address_local_lang": address,
        "contacts": {
            "phone_numbers": [payload_text(info, "/contact/phoneNo")],
            "fax": payload_text(info, "/contact/faxNo"),
            "website": payload_text(info, "/contact/website"),
        },
        "amenities": amenity_list(info, "/masterRoomAmenities"),
        "facilities": amenity_list(info, "/masterHotelAmenities"),
        "hotel_photo": photos,
    })
}

async fn fetch_record_row(pool: &PgPool, system_id: &str) -> Result<Option<HotelRecordRow>> {
    let row = sqlx::query(
        r#"SELECT "SystemId"::text AS system_id,
                  "HotelName" AS hotel_name,
                  "GiDestinationId"::text AS gi_destination_id,
                  "CountryCode" AS country_code,
                  "CountryName" AS country_name,
                  "ZipCode" AS zip_code,
                  "City" AS city,
                  "Address1" AS address1,
                  "Address2" AS address2,
                  "ImageUrl" AS image_url,
                  "Latitude"::float8 AS latitude,
                  "Longitude"::float8 AS longitude,
                  "Rating"::text AS rating,
                  "HotelInfo" AS hotel_info
           FROM hotel_info_all
           WHERE "SystemId"::text = $1"#,
    )
    .bind(system_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(HotelRecordRow {
        system_id: row.try_get("system_id")?,
        hotel_name: row.try_get("hotel_name")?,
        gi_destination_id: row.try_get("gi_destination_id")?,
        country_code: row.try_get("country_code")?,
        country_name: row.try_get("country_name")?,
        zip_code: row.try_get("zip_code")?,
        city: row.try_get("city")?,
        address1: row.try_get("address1")?,
        address2: row.try_get("address2")?,
        image_url: row.try_get("image_url")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        rating: row.try_get("rating")?,
        hotel_info: row
            .try_get::<Option<Value>, _>("hotel_info")?
            .unwrap_or_else(|| json!({})),
    }))
}

fn write_record(dir: &Path, system_id: &str, record: &Value) -> Result<PathBuf> {
    let path = dir.join(format!("{system_id}.json"));
    let body = serde_json::to_vec_pretty(record)?;
    fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Export every completed hotel record as a JSON file. Returns the number of
/// files written.
pub async fn run(db: &Db) -> Result<usize> {
    let out_dir = PathBuf::from(
        env_util::env_opt("GILL_EXPORT_DIR").unwrap_or_else(|| DEFAULT_EXPORT_DIR.to_string()),
    );
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("create export dir {}", out_dir.display()))?;

    let ids: Vec<String> = sqlx::query_scalar(
        r#"SELECT DISTINCT "SystemId"::text FROM hotel_info_all
           WHERE "StatusUpdateHotelInfo" = $1 AND "SystemId" IS NOT NULL"#,
    )
    .bind(STATUS_DONE_JSON)
    .fetch_all(&db.pool)
    .await?;
    info!(hotels = ids.len(), dir = %out_dir.display(), "starting export");

    let mut written = 0usize;
    let total = ids.len();
    for (idx, system_id) in ids.iter().enumerate() {
        match fetch_record_row(&db.pool, system_id).await? {
            Some(row) => {
                let record = build_export_record(&row);
                let path = write_record(&out_dir, system_id, &record)?;
                written += 1;
                info!(
                    file = %path.display(),
                    completed = idx + 1,
                    total,
                    "exported hotel record"
                );
            }
            None => warn!(system_id = %system_id, "row disappeared during export; skipped"),
        }
    }
    info!(written, "export complete");
    Ok(written)
}
