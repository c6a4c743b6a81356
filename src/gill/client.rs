//! Client for the GI Infotech hotel-content API.
//!
//! Every endpoint is a `POST` with a single-field JSON body and an `ApiKey`
//! header; responses share an envelope with an `isSuccess` flag and a
//! payload field whose name varies per endpoint. The client only fetches —
//! persistence is the driver's job.

use anyhow::Result;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::GillConfig;
use crate::error::FetchError;
use crate::pipeline::FetchStatus;

pub const DEFAULT_BASE_URL: &str = "https://api.giinfotech.ae/api";

#[derive(Debug, Clone)]
pub struct GillClient {
    base_url: String,
    api_key: String,
    http: Client,
}

/// One entry of the `data` list returned by the destination lookup.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationMatch {
    // accept string or number ids; normalized to text when persisted
    pub gi_destination_id: Value,
}

impl DestinationMatch {
    pub fn id_text(&self) -> String {
        value_text(&self.gi_destination_id)
    }
}

/// One hotel entry of the `hotelsInformation` list. Everything is optional
/// at the wire level; completeness is checked before upserting.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotelSummary {
    pub gi_destination_id: Option<Value>,
    pub name: Option<String>,
    pub system_id: Option<Value>,
    pub rating: Option<Value>,
    pub city: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub image_url: Option<String>,
    pub geo_code: Option<GeoCode>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoCode {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl GillClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("gill-sync/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    pub fn from_config(cfg: &GillConfig) -> Result<Self> {
        Self::new(&cfg.base_url, &cfg.api_key, cfg.timeout)
    }

    /// Resolve a free-text destination (city name) to its first match.
    pub async fn destination_info(
        &self,
        city: &str,
    ) -> Result<FetchStatus<DestinationMatch>, FetchError> {
        let body = self
            .post("Hotel/DestinationInfo", json!({ "destination": city }))
            .await?;
        parse_destination_response(&body)
    }

    /// Full hotel record for one system id; the payload is kept as raw JSON
    /// because it is persisted wholesale.
    pub async fn hotel_info(&self, system_id: &str) -> Result<FetchStatus<Value>, FetchError> {
        let body = self
            .post("Hotel/HotelInfo", json!({ "hotelCode": system_id }))
            .await?;
        Ok(parse_hotel_info_response(&body))
    }

    /// All hotels known for one destination id.
    pub async fn hotels_by_destination(
        &self,
        destination_id: &str,
    ) -> Result<FetchStatus<Vec<HotelSummary>>, FetchError> {
        let body = self
            .post(
                "Hotel/HotelsInfoByDestinationId",
                json!({ "destinationCode": destination_id }),
            )
            .await?;
        parse_hotels_response(&body)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("ApiKey", &self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::Rejected { status });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

/// Render a string-or-number JSON id as text.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_success(body: &Value) -> bool {
    body.get("isSuccess").and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn parse_destination_response(
    body: &Value,
) -> Result<FetchStatus<DestinationMatch>, FetchError> {
    if !is_success(body) {
        return Ok(FetchStatus::NotFound);
    }
    match body
        .get("data")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
    {
        Some(first) => serde_json::from_value(first.clone())
            .map(FetchStatus::Found)
            .map_err(|e| FetchError::Malformed(e.to_string())),
        None => Ok(FetchStatus::NotFound),
    }
}

pub(crate) fn parse_hotel_info_response(body: &Value) -> FetchStatus<Value> {
    if !is_success(body) {
        return FetchStatus::NotFound;
    }
    match body.get("hotelInformation") {
        Some(info) if !info.is_null() => FetchStatus::Found(info.clone()),
        _ => FetchStatus::NotFound,
    }
}

pub(crate) fn parse_hotels_response(
    body: &Value,
) -> Result<FetchStatus<Vec<HotelSummary>>, FetchError> {
    if !is_success(body) {
        return Ok(FetchStatus::NotFound);
    }
    let Some(list) = body.get("hotelsInformation").and_then(Value::as_array) else {
        return Ok(FetchStatus::NotFound);
    };
    // null entries do appear in live responses; skip them like any other
    // non-object noise
    let hotels = list
        .iter()
        .filter(|v| v.is_object())
        .map(|v| serde_json::from_value(v.clone()))
        .collect::<Result<Vec<HotelSummary>, _>>()
        .map_err(|e| FetchError::Malformed(e.to_string()))?;
    if hotels.is_empty() {
        return Ok(FetchStatus::NotFound);
    }
    Ok(FetchStatus::Found(hotels))
}
