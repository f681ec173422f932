//! Push feed: frame parsing and the connection seam.
//!
//! The plant backend publishes one JSON message per sensor-node reading:
//!
//! ```json
//! { "type": "plant-reading", "ts": "2026-01-01T00:00:00Z",
//!   "device_id": "plant_1_exhaust_node_1", "nodeId": "n3",
//!   "metrics": { "gas_temp": 120.4, "o2_percent": 6.1 } }
//! ```
//!
//! Other `type` values are ignored. Anything that is not valid JSON, or a
//! `plant-reading` missing its timestamp, is a malformed frame.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::{Result, TelemetryError};
use crate::record::{deserialize_metrics, deserialize_ts, MetricRecord, Metrics};

/// The only message type that carries readings.
pub const PLANT_READING: &str = "plant-reading";

/// A `plant-reading` message as published by a sensor node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlantReadingFrame {
    #[serde(deserialize_with = "deserialize_ts")]
    pub ts: chrono::DateTime<chrono::Utc>,
    pub device_id: String,
    #[serde(default, rename = "nodeId", alias = "node_id")]
    pub node_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_metrics")]
    pub metrics: Metrics,
}

impl PlantReadingFrame {
    /// The partial record this frame contributes.
    pub fn into_record(self) -> MetricRecord {
        let mut record = MetricRecord::new(self.ts).with_device(self.device_id);
        record.metrics = self.metrics;
        record.node_id = self.node_id;
        record
    }
}

/// Parse one feed message.
///
/// Returns `Ok(None)` for well-formed messages of another type.
pub fn parse_frame(text: &str) -> Result<Option<MetricRecord>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TelemetryError::MalformedFrame(e.to_string()))?;

    match value.get("type").and_then(Value::as_str) {
        Some(PLANT_READING) => {}
        other => {
            debug!("ignoring feed message of type {other:?}");
            return Ok(None);
        }
    }

    let frame: PlantReadingFrame = serde_json::from_value(value)
        .map_err(|e| TelemetryError::MalformedFrame(e.to_string()))?;
    Ok(Some(frame.into_record()))
}

// ---------------------------------------------------------------------------
// Connection seam
// ---------------------------------------------------------------------------

/// Raw text messages from one open feed connection. The stream ends when the
/// remote closes; an `Err` item means the transport failed and the connection
/// is gone. Undecodable payloads never surface as `Err` items.
pub type FeedStream = BoxStream<'static, Result<String>>;

/// Opens push-feed connections. The session controller calls `connect` once
/// at start and again after every transport loss.
pub trait FeedConnector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<FeedStream>>;

    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> &str;
}

/// WebSocket feed connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Option<Duration>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: None,
        }
    }

    /// Bound the connect plus handshake; a host that never answers then
    /// fails with `Network` instead of hanging.
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = Some(limit);
        self
    }
}

impl FeedConnector for WsConnector {
    fn connect(&self) -> BoxFuture<'_, Result<FeedStream>> {
        Box::pin(async move {
            let handshake = connect_async(self.url.as_str());
            let (ws, _response) = match self.connect_timeout {
                Some(limit) => tokio::time::timeout(limit, handshake).await.map_err(|_| {
                    TelemetryError::Network(format!(
                        "connect to {} timed out after {} ms",
                        self.url,
                        limit.as_millis()
                    ))
                })??,
                None => handshake.await?,
            };
            info!("feed connected to {}", self.url);

            let stream = ws
                .filter_map(|msg| async move { decode_message(msg) })
                .boxed();
            Ok(stream)
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Map one WebSocket message onto the feed stream. Control frames and binary
/// payloads that are not UTF-8 are skipped; only transport errors pass as `Err`.
fn decode_message(msg: std::result::Result<Message, tungstenite::Error>) -> Option<Result<String>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(text)),
            Err(e) => {
                warn!("dropping binary feed message ({} bytes): {e}", bytes.len());
                None
            }
        },
        Ok(Message::Close(frame)) => {
            let reason = frame
                .map(|f| f.reason.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            info!("feed closed by remote: {reason}");
            None
        }
        Ok(_) => None,
        Err(e) => Some(Err(TelemetryError::from(e))),
    }
}
