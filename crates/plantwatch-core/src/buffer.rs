//! Bounded live window fed by push frames.
//!
//! Each ingested frame is folded into `latest`, and a copy of the new `latest`
//! is appended to the window. Window entries are therefore cumulative: every
//! entry carries every metric known at that push, so a chart for one metric
//! has no gaps when some other node publishes.
//!
//! Entries are immutable once pushed and held behind `Arc`, so a window
//! snapshot shares them instead of copying each record.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::record::MetricRecord;

/// Default window bound: a few hours of readings at the usual publish rate.
pub const DEFAULT_WINDOW_CAPACITY: usize = 2000;

/// Live state: the latest cumulative record and the bounded window behind it.
#[derive(Debug, Clone)]
pub struct LiveBuffer {
    latest: Option<MetricRecord>,
    window: VecDeque<Arc<MetricRecord>>,
    capacity: usize,
}

impl Default for LiveBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl LiveBuffer {
    /// Create an empty buffer holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            latest: None,
            window: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Replace the window with a bootstrap series (ascending, one record per
    /// timestamp). Only the newest `capacity` records are kept; `latest`
    /// becomes the newest record, or stays absent for an empty series.
    pub fn seed(&mut self, series: Vec<MetricRecord>) {
        let skip = series.len().saturating_sub(self.capacity);
        self.window = series.into_iter().skip(skip).map(Arc::new).collect();
        self.latest = self.window.back().map(|r| MetricRecord::clone(r));
    }

    /// Fold one push frame into `latest` and append the result to the window.
    pub fn ingest(&mut self, frame: &MetricRecord) {
        let next = match self.latest.take() {
            Some(mut prev) => {
                prev.absorb(frame);
                prev
            }
            None => frame.clone(),
        };
        self.window.push_back(Arc::new(next.clone()));
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.latest = Some(next);
    }

    /// The most recent cumulative record, if any data has arrived.
    pub fn latest(&self) -> Option<&MetricRecord> {
        self.latest.as_ref()
    }

    /// Snapshot of the window, oldest first. Later ingests never show up in
    /// a previously returned snapshot; entries are shared, not copied.
    pub fn window(&self) -> Vec<Arc<MetricRecord>> {
        self.window.iter().cloned().collect()
    }

    /// Borrowing iterator over the window, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MetricRecord> {
        self.window.iter().map(|r| &**r)
    }

    pub fn clear(&mut self) {
        self.latest = None;
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ts;

    fn frame(secs: i64, key: &str, value: f64) -> MetricRecord {
        MetricRecord::new(ts(secs)).with_metric(key, value)
    }

    // -----------------------------------------------------------------------
    // ingest
    // -----------------------------------------------------------------------

    #[test]
    fn test_first_frame_becomes_latest() {
        let mut buf = LiveBuffer::new(10);
        assert!(buf.latest().is_none());
        buf.ingest(&frame(0, "temp_T1", 650.0));
        assert_eq!(buf.latest().unwrap().metric("temp_T1"), Some(650.0));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_partial_frame_keeps_other_metrics() {
        let mut buf = LiveBuffer::new(10);
        buf.ingest(&frame(0, "temp_T1", 650.0));
        buf.ingest(&frame(1, "gas_temp", 120.0));

        let latest = buf.latest().unwrap();
        assert_eq!(latest.metric("temp_T1"), Some(650.0));
        assert_eq!(latest.metric("gas_temp"), Some(120.0));
        assert_eq!(latest.ts, ts(1));
    }

    #[test]
    fn test_window_entries_are_cumulative() {
        let mut buf = LiveBuffer::new(10);
        buf.ingest(&frame(0, "a", 1.0));
        buf.ingest(&frame(1, "b", 2.0));
        buf.ingest(&frame(2, "a", 3.0));

        let w = buf.window();
        assert_eq!(w[0].metrics.len(), 1);
        assert_eq!(w[1].metric("a"), Some(1.0));
        assert_eq!(w[1].metric("b"), Some(2.0));
        assert_eq!(w[2].metric("a"), Some(3.0));
        assert_eq!(w[2].metric("b"), Some(2.0));
    }

    #[test]
    fn test_window_length_is_bounded() {
        let mut buf = LiveBuffer::new(3);
        for i in 0..5 {
            buf.ingest(&frame(i, "x", i as f64));
            assert_eq!(buf.len(), ((i + 1) as usize).min(3));
        }
        let times: Vec<_> = buf.window().iter().map(|r| r.ts).collect();
        assert_eq!(times, vec![ts(2), ts(3), ts(4)]);
    }

    #[test]
    fn test_snapshot_does_not_observe_later_ingest() {
        let mut buf = LiveBuffer::new(10);
        buf.ingest(&frame(0, "x", 1.0));
        let snap = buf.window();
        buf.ingest(&frame(1, "x", 2.0));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].metric("x"), Some(1.0));
    }

    #[test]
    fn test_snapshots_share_entries() {
        let mut buf = LiveBuffer::new(10);
        buf.ingest(&frame(0, "x", 1.0));
        let first = buf.window();
        buf.ingest(&frame(1, "x", 2.0));
        let second = buf.window();
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(Arc::strong_count(&second[1]), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buf = LiveBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.ingest(&frame(0, "x", 1.0));
        buf.ingest(&frame(1, "x", 2.0));
        assert_eq!(buf.len(), 1);
    }

    // -----------------------------------------------------------------------
    // seed
    // -----------------------------------------------------------------------

    #[test]
    fn test_seed_sets_latest_to_newest() {
        let mut buf = LiveBuffer::new(10);
        buf.seed(vec![frame(0, "x", 1.0), frame(1, "y", 2.0)]);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.latest().unwrap().ts, ts(1));
    }

    #[test]
    fn test_seed_keeps_newest_records_only() {
        let mut buf = LiveBuffer::new(2);
        buf.seed(vec![frame(0, "x", 0.0), frame(1, "x", 1.0), frame(2, "x", 2.0)]);
        let times: Vec<_> = buf.iter().map(|r| r.ts).collect();
        assert_eq!(times, vec![ts(1), ts(2)]);
    }

    #[test]
    fn test_seed_empty_leaves_latest_absent() {
        let mut buf = LiveBuffer::new(4);
        buf.seed(Vec::new());
        assert!(buf.latest().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_ingest_after_seed_extends_latest() {
        let mut buf = LiveBuffer::new(10);
        buf.seed(vec![frame(0, "temp_T1", 650.0)]);
        buf.ingest(&frame(1, "gas_temp", 120.0));
        let latest = buf.latest().unwrap();
        assert_eq!(latest.metric("temp_T1"), Some(650.0));
        assert_eq!(latest.metric("gas_temp"), Some(120.0));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut buf = LiveBuffer::new(4);
        buf.ingest(&frame(0, "x", 1.0));
        buf.clear();
        assert!(buf.latest().is_none());
        assert!(buf.is_empty());
    }
}
