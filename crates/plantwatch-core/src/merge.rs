//! Reconcile readings from independent sensor nodes into one ordered series.
//!
//! Architecture:
//! 1. Every reading of every device snapshot is keyed by timestamp
//! 2. Readings sharing a timestamp are folded with the last-write-wins rule
//! 3. The contributing device is recorded on the merged record
//! 4. The result is ascending by timestamp with one record per timestamp
//!
//! Devices whose fetch failed are simply not passed in; the merge never fails.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::record::{DeviceSnapshot, MetricRecord};

/// Merge per-device bootstrap snapshots into one series.
///
/// Snapshots are consumed in iteration order, so for a metric reported by two
/// devices at the same timestamp the later snapshot wins. O(R log R) in the
/// total number of readings.
pub fn merge_device_snapshots<I>(snapshots: I) -> Vec<MetricRecord>
where
    I: IntoIterator<Item = DeviceSnapshot>,
{
    let mut by_ts: BTreeMap<DateTime<Utc>, MetricRecord> = BTreeMap::new();

    for snapshot in snapshots {
        debug!(
            "merging {} readings for {}",
            snapshot.readings.len(),
            snapshot.device_id
        );
        for reading in snapshot.readings {
            let acc = by_ts
                .entry(reading.ts)
                .or_insert_with(|| MetricRecord::new(reading.ts));
            acc.absorb(&reading);
            acc.device_ids.insert(snapshot.device_id.clone());
        }
    }

    let merged: Vec<MetricRecord> = by_ts.into_values().collect();
    debug!("merged series has {} records", merged.len());
    merged
}

/// Whether `series` is ascending by timestamp (ties allowed).
pub fn is_time_ordered(series: &[MetricRecord]) -> bool {
    series.windows(2).all(|w| w[0].ts <= w[1].ts)
}

/// Bring a series from an external store into canonical shape.
///
/// The history endpoint promises ascending order; this checks it instead of
/// trusting it, falls back to a stable sort when violated, and folds any
/// records that share a timestamp.
pub fn normalize_series(mut series: Vec<MetricRecord>) -> Vec<MetricRecord> {
    if !is_time_ordered(&series) {
        warn!(
            "history series of {} records arrived out of order, sorting client-side",
            series.len()
        );
        series.sort_by_key(|r| r.ts);
    }

    let mut out: Vec<MetricRecord> = Vec::with_capacity(series.len());
    for record in series {
        match out.last_mut() {
            Some(prev) if prev.ts == record.ts => prev.absorb(&record),
            _ => out.push(record),
        }
    }
    out
}

/// Merge two canonical series (e.g. device snapshots and a history seed) into one.
///
/// Records from `newer` win metric collisions at equal timestamps.
pub fn merge_series(older: Vec<MetricRecord>, newer: Vec<MetricRecord>) -> Vec<MetricRecord> {
    let mut by_ts: BTreeMap<DateTime<Utc>, MetricRecord> = BTreeMap::new();
    for record in older.into_iter().chain(newer) {
        match by_ts.get_mut(&record.ts) {
            Some(acc) => acc.absorb(&record),
            None => {
                by_ts.insert(record.ts, record);
            }
        }
    }
    by_ts.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ts;

    fn reading(secs: i64, key: &str, value: f64) -> MetricRecord {
        MetricRecord::new(ts(secs)).with_metric(key, value)
    }

    // -----------------------------------------------------------------------
    // merge_device_snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn test_two_devices_same_timestamp_union() {
        let a = DeviceSnapshot::new("A", vec![reading(1, "temp_T1", 650.0)]);
        let b = DeviceSnapshot::new("B", vec![reading(1, "buffer_upper_temp", 80.0)]);

        let merged = merge_device_snapshots(vec![a, b]);

        assert_eq!(merged.len(), 1);
        let rec = &merged[0];
        assert_eq!(rec.metric("temp_T1"), Some(650.0));
        assert_eq!(rec.metric("buffer_upper_temp"), Some(80.0));
        assert_eq!(
            rec.device_ids.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[test]
    fn test_output_sorted_with_one_record_per_timestamp() {
        let a = DeviceSnapshot::new(
            "A",
            vec![reading(3, "x", 1.0), reading(1, "x", 2.0), reading(2, "x", 3.0)],
        );
        let b = DeviceSnapshot::new("B", vec![reading(2, "y", 4.0), reading(5, "y", 5.0)]);

        let merged = merge_device_snapshots(vec![a, b]);

        let times: Vec<_> = merged.iter().map(|r| r.ts).collect();
        assert_eq!(times, vec![ts(1), ts(2), ts(3), ts(5)]);
        assert!(is_time_ordered(&merged));
    }

    #[test]
    fn test_overlapping_key_later_snapshot_wins() {
        let a = DeviceSnapshot::new("A", vec![reading(1, "gas_temp", 100.0)]);
        let b = DeviceSnapshot::new("B", vec![reading(1, "gas_temp", 110.0)]);
        let merged = merge_device_snapshots(vec![a, b]);
        assert_eq!(merged[0].metric("gas_temp"), Some(110.0));
    }

    #[test]
    fn test_same_device_repeated_timestamp_last_write_wins() {
        let a = DeviceSnapshot::new(
            "A",
            vec![
                reading(1, "fan_speed", 40.0).with_metric("o2_percent", 6.0),
                reading(1, "fan_speed", 45.0),
            ],
        );
        let merged = merge_device_snapshots(vec![a]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].metric("fan_speed"), Some(45.0));
        assert_eq!(merged[0].metric("o2_percent"), Some(6.0));
        assert_eq!(merged[0].device_ids.len(), 1);
    }

    #[test]
    fn test_empty_device_is_noop() {
        let a = DeviceSnapshot::new("A", vec![reading(1, "x", 1.0)]);
        let empty = DeviceSnapshot::new("B", Vec::new());
        let merged = merge_device_snapshots(vec![a, empty]);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].device_ids.contains("B"));
    }

    #[test]
    fn test_no_snapshots_yields_empty_series() {
        assert!(merge_device_snapshots(Vec::<DeviceSnapshot>::new()).is_empty());
    }

    // -----------------------------------------------------------------------
    // normalize_series / merge_series
    // -----------------------------------------------------------------------

    #[test]
    fn test_normalize_keeps_ordered_series() {
        let s = vec![reading(1, "x", 1.0), reading(2, "x", 2.0)];
        assert_eq!(normalize_series(s.clone()), s);
    }

    #[test]
    fn test_normalize_sorts_and_coalesces() {
        let s = vec![
            reading(3, "x", 3.0),
            reading(1, "x", 1.0),
            reading(3, "y", 9.0),
        ];
        let out = normalize_series(s);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].ts, ts(1));
        assert_eq!(out[1].metric("x"), Some(3.0));
        assert_eq!(out[1].metric("y"), Some(9.0));
    }

    #[test]
    fn test_merge_series_newer_wins() {
        let older = vec![reading(1, "x", 1.0), reading(2, "x", 2.0)];
        let newer = vec![reading(2, "x", 20.0), reading(3, "x", 3.0)];
        let out = merge_series(older, newer);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].metric("x"), Some(20.0));
    }
}
