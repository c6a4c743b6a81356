//! One-shot copy of per-city aggregates from the vervotech hotel listing
//! into the destination mapping table. Existing cities are left untouched so
//! the job can re-run safely.

use tracing::info;

use crate::db::Db;

pub async fn run(db: &Db) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"INSERT INTO hotels_info_with_gidestination_code
               ("CityName", "CountryName", "CountryCode", "PostalCode")
           SELECT "CityName",
                  MIN("CountryName"),
                  MIN("CountryCode"),
                  MIN("PostalCode")
           FROM vervotech_hotel_list
           WHERE "CityName" IS NOT NULL
           GROUP BY "CityName"
           ON CONFLICT ("CityName") DO NOTHING"#,
    )
    .execute(&db.pool)
    .await?;
    info!(rows = result.rows_affected(), "seeded city rows");
    Ok(result.rows_affected())
}
