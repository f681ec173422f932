//! HTTP client for the plant backend: device snapshots, history and login.
//!
//! The backend wraps most payloads in `{ data: ... }` envelopes, sometimes
//! twice. Unwrapping is tolerant: a known shape yields records, anything else
//! is logged and treated as empty.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, TelemetryError};
use crate::record::{DeviceSnapshot, MetricRecord};

/// Row limit used when browsing history.
pub const DEFAULT_HISTORY_LIMIT: usize = 5000;

/// A bounded history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: usize,
}

impl HistoryQuery {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>, limit: usize) -> Self {
        Self { from, to, limit }
    }

    /// Whole calendar days: `from` at 00:00:00.000 through `to` at 23:59:59.999 UTC.
    pub fn for_days(from: NaiveDate, to: NaiveDate, limit: usize) -> Self {
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        Self {
            from: from.and_time(NaiveTime::MIN).and_utc(),
            to: to.and_time(end_of_day).and_utc(),
            limit,
        }
    }

    /// The `minutes` leading up to `now`.
    pub fn trailing(now: DateTime<Utc>, minutes: u64, limit: usize) -> Self {
        let span = i64::try_from(minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or_else(chrono::Duration::zero);
        Self {
            from: now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
            to: now,
            limit,
        }
    }

    fn params(&self) -> [(&'static str, String); 3] {
        [
            ("limit", self.limit.to_string()),
            ("from", self.from.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ("to", self.to.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ]
    }
}

/// Data sources a telemetry session bootstraps from.
///
/// Implementations must be cheap to share across the concurrent per-device
/// fetches of one bootstrap.
pub trait PlantApi: Send + Sync + 'static {
    /// Recent readings of one device.
    fn fetch_recent<'a>(&'a self, device_id: &'a str) -> BoxFuture<'a, Result<DeviceSnapshot>>;

    /// Records in `[query.from, query.to]`, at most `query.limit`, ascending.
    fn fetch_history(&self, query: HistoryQuery) -> BoxFuture<'_, Result<Vec<MetricRecord>>>;
}

/// `PlantApi` over the backend's REST endpoints, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpPlantApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPlantApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("plantwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client, base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let token = token.filter(|t| !t.trim().is_empty());
        Self {
            client,
            base_url,
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| TelemetryError::Auth("no credential configured".to_string()))?;
        Ok(req.bearer_auth(token))
    }

    /// `GET /recent/{device_id}`.
    pub async fn recent(&self, device_id: &str) -> Result<DeviceSnapshot> {
        let req = self.authorized(self.client.get(self.url(&format!("/recent/{device_id}"))))?;
        let (status, body) = send_json(req).await?;
        let snapshot = unwrap_snapshot(body, device_id).map_err(|e| TelemetryError::Server {
            status: status.as_u16(),
            detail: format!("unexpected snapshot body: {e}"),
        })?;
        debug!(
            "fetched {} readings for {}",
            snapshot.readings.len(),
            snapshot.device_id
        );
        Ok(snapshot)
    }

    /// `GET /plant/history?limit&from&to`.
    pub async fn history(&self, query: &HistoryQuery) -> Result<Vec<MetricRecord>> {
        let req = self.authorized(self.client.get(self.url("/plant/history")))?;
        let (_, body) = send_json(req.query(&query.params())).await?;
        let records = unwrap_history(body);
        debug!(
            "history {}..{} returned {} records",
            query.from, query.to, records.len()
        );
        Ok(records)
    }

    /// `POST /login`. Returns the issued token; no credential is required.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let detail = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("login failed")
                .to_string();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TelemetryError::Auth(detail),
                _ => TelemetryError::Server {
                    status: status.as_u16(),
                    detail,
                },
            });
        }

        unwrap_data(body)
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| TelemetryError::Auth("login response carried no token".to_string()))
    }
}

impl PlantApi for HttpPlantApi {
    fn fetch_recent<'a>(&'a self, device_id: &'a str) -> BoxFuture<'a, Result<DeviceSnapshot>> {
        Box::pin(self.recent(device_id))
    }

    fn fetch_history(&self, query: HistoryQuery) -> BoxFuture<'_, Result<Vec<MetricRecord>>> {
        Box::pin(async move { self.history(&query).await })
    }
}

/// Send `req`; a non-success status becomes `Server` with the body as detail.
async fn send_json(req: RequestBuilder) -> Result<(StatusCode, Value)> {
    let response = req.send().await?;
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let detail = if text.trim().is_empty() {
            format!("request failed (status {})", status.as_u16())
        } else {
            text
        };
        return Err(TelemetryError::Server {
            status: status.as_u16(),
            detail,
        });
    }

    let body = response.json().await.map_err(|e| TelemetryError::Server {
        status: status.as_u16(),
        detail: format!("invalid response body: {e}"),
    })?;
    Ok((status, body))
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// `{ data: X }` → `X` when `X` is present and non-null, otherwise the body itself.
fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut obj) => match obj.remove("data") {
            Some(inner) if !inner.is_null() => inner,
            Some(_) | None => Value::Object(obj),
        },
        other => other,
    }
}

/// Accepts `{data: {data: [..]}}`, `{data: [..]}` or a bare array. Rows that do
/// not decode as records are skipped.
pub fn unwrap_history(body: Value) -> Vec<MetricRecord> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(rows)) => rows,
            Some(Value::Object(mut inner)) => match inner.remove("data") {
                Some(Value::Array(rows)) => rows,
                _ => {
                    warn!("unexpected history response shape, treating as empty");
                    return Vec::new();
                }
            },
            _ => {
                warn!("unexpected history response shape, treating as empty");
                return Vec::new();
            }
        },
        _ => {
            warn!("unexpected history response shape, treating as empty");
            return Vec::new();
        }
    };

    let total = rows.len();
    let records: Vec<MetricRecord> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect();
    if records.len() < total {
        warn!("skipped {} undecodable history rows", total - records.len());
    }
    records
}

#[derive(Deserialize)]
struct SnapshotWire {
    #[serde(default, alias = "deviceId")]
    device_id: Option<String>,
    #[serde(default)]
    readings: Option<Vec<Value>>,
}

/// Decode a `/recent` body. A missing `device_id` falls back to `requested`;
/// readings that do not decode as records are skipped.
pub fn unwrap_snapshot(body: Value, requested: &str) -> serde_json::Result<DeviceSnapshot> {
    let wire: SnapshotWire = serde_json::from_value(unwrap_data(body))?;
    let device_id = wire.device_id.unwrap_or_else(|| requested.to_string());

    let rows = wire.readings.unwrap_or_default();
    let total = rows.len();
    let readings: Vec<MetricRecord> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect();
    if readings.len() < total {
        warn!(
            "skipped {} undecodable readings for {device_id}",
            total - readings.len()
        );
    }
    Ok(DeviceSnapshot::new(device_id, readings))
}
