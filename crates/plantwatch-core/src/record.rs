//! Canonical per-timestamp plant reading and the last-write-wins merge rule.
//!
//! A [`MetricRecord`] is keyed by its timestamp. Metric keys vary by the device
//! that produced them; an absent key means "not reported", never zero, so the
//! metrics map only ever holds values that were actually observed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Metric name → value. Ordered so that printed and serialized records are stable.
pub type Metrics = BTreeMap<String, f64>;

/// Merge `incoming` into `base`: union of keys, `incoming` wins on collision.
///
/// This is the single merge rule used for cross-device bootstrap snapshots,
/// repeated timestamps from one device, and live push frames.
pub fn merge_metrics(base: &mut Metrics, incoming: &Metrics) {
    for (key, value) in incoming {
        base.insert(key.clone(), *value);
    }
}

/// One timestamped reading, possibly partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordWire")]
pub struct MetricRecord {
    pub ts: DateTime<Utc>,
    pub metrics: Metrics,
    /// Devices that contributed to this record.
    pub device_ids: BTreeSet<String>,
    /// Node that last published into this record, when the feed reports one.
    #[serde(rename = "nodeId", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl MetricRecord {
    pub fn new(ts: DateTime<Utc>) -> Self {
        Self {
            ts,
            metrics: Metrics::new(),
            device_ids: BTreeSet::new(),
            node_id: None,
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_ids.insert(device_id.into());
        self
    }

    /// Value reported under `key`, if any device reported it.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    /// Fold a later-arriving partial record into this one.
    ///
    /// Metrics follow [`merge_metrics`]; contributing devices are unioned; the
    /// timestamp and node follow the newer record (a frame without a node keeps
    /// the previous one).
    pub fn absorb(&mut self, newer: &MetricRecord) {
        self.ts = newer.ts;
        merge_metrics(&mut self.metrics, &newer.metrics);
        self.device_ids.extend(newer.device_ids.iter().cloned());
        if newer.node_id.is_some() {
            self.node_id.clone_from(&newer.node_id);
        }
    }
}

/// Snapshot of one device's recent readings, as returned by `GET /recent/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device_id: String,
    #[serde(default)]
    pub readings: Vec<MetricRecord>,
}

impl DeviceSnapshot {
    pub fn new(device_id: impl Into<String>, readings: Vec<MetricRecord>) -> Self {
        Self {
            device_id: device_id.into(),
            readings,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Backend records carry either a `device_ids` list or a single `device_id`.
#[derive(Deserialize)]
struct RecordWire {
    #[serde(deserialize_with = "deserialize_ts")]
    ts: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_metrics")]
    metrics: Metrics,
    #[serde(default, alias = "sourceDeviceIds")]
    device_ids: BTreeSet<String>,
    #[serde(default, alias = "deviceId")]
    device_id: Option<String>,
    #[serde(default, rename = "nodeId", alias = "node_id")]
    node_id: Option<String>,
}

impl From<RecordWire> for MetricRecord {
    fn from(w: RecordWire) -> Self {
        let mut device_ids = w.device_ids;
        if let Some(id) = w.device_id {
            device_ids.insert(id);
        }
        Self {
            ts: w.ts,
            metrics: w.metrics,
            device_ids,
            node_id: w.node_id,
        }
    }
}

/// Accepts RFC 3339 strings or integer Unix milliseconds.
pub(crate) fn deserialize_ts<'de, D>(d: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ts {
        Text(String),
        Millis(i64),
    }

    match Ts::deserialize(d)? {
        Ts::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
        Ts::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
    }
}

/// Keeps only finite numeric entries; `null`, strings and a missing map are
/// "not reported" rather than an error.
pub(crate) fn deserialize_metrics<'de, D>(d: D) -> Result<Metrics, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.as_f64().filter(|x| x.is_finite()).map(|x| (k, x)))
        .collect())
}

#[cfg(test)]
pub(crate) fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
}
