//! Work-list loading: one `SELECT DISTINCT` over a named key column.
//!
//! Identifiers cannot be bound parameters, so table and column names are
//! checked against a fixed allow-list before they are interpolated; every
//! value in a WHERE clause is bound. A query error propagates to the caller
//! so a run never starts against a work list it could not actually read.

use anyhow::{bail, Result};
use sqlx::PgPool;

const ALLOWED_TABLES: &[&str] = &[
    "hotels_info_with_gidestination_code",
    "hotel_info_all",
    "vervotech_hotel_list",
];

const ALLOWED_COLUMNS: &[&str] = &["CityName", "GiDestinationId", "SystemId"];

fn checked_ident<'a>(name: &'a str, allowed: &[&str]) -> Result<&'a str> {
    if allowed.contains(&name) {
        Ok(name)
    } else {
        bail!("identifier {name:?} is not allowed in a work-list query");
    }
}

/// Distinct, non-empty values of `column` in `table`, as text.
pub async fn distinct_values(pool: &PgPool, table: &str, column: &str) -> Result<Vec<String>> {
    let table = checked_ident(table, ALLOWED_TABLES)?;
    let column = checked_ident(column, ALLOWED_COLUMNS)?;
    let query = format!(
        r#"SELECT DISTINCT "{column}"::text FROM {table} WHERE "{column}" IS NOT NULL"#
    );
    let values: Vec<String> = sqlx::query_scalar(&query).fetch_all(pool).await?;
    Ok(values
        .into_iter()
        .filter(|v| !v.trim().is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_identifiers_pass() {
        assert!(checked_ident("hotel_info_all", ALLOWED_TABLES).is_ok());
        assert!(checked_ident("CityName", ALLOWED_COLUMNS).is_ok());
    }

    #[test]
    fn unknown_identifiers_are_rejected() {
        assert!(checked_ident("users", ALLOWED_TABLES).is_err());
        assert!(checked_ident("Password", ALLOWED_COLUMNS).is_err());
    }

    #[test]
    fn injection_shaped_identifiers_are_rejected() {
        assert!(checked_ident("hotel_info_all; DROP TABLE hotel_info_all", ALLOWED_TABLES).is_err());
        assert!(checked_ident("CityName\" OR 1=1 --", ALLOWED_COLUMNS).is_err());
    }
}
