//! Display ranges for chart axes.
//!
//! Two policies, picked by metric name:
//! - Temperatures (any key containing "temp", case-insensitive) get a fixed
//!   ±100 margin with the lower bound clamped at 0. Excursions are the signal
//!   operators watch for, so the margin does not shrink with the data.
//! - Everything else (flow, pressure, percentages) is padded by 20% of the
//!   observed span so small-magnitude metrics stay readable.
//!
//! Bounds are rounded to one decimal place.

use serde::{Deserialize, Serialize};

use crate::record::MetricRecord;

/// Fixed margin applied on both sides of a temperature range.
pub const TEMPERATURE_MARGIN: f64 = 100.0;
/// Fraction of the span (or of |value| for a flat series) used as padding.
pub const SPAN_PADDING_RATIO: f64 = 0.2;
/// Padding for a flat series sitting at exactly zero.
pub const MIN_FLAT_PADDING: f64 = 1.0;

/// Axis bounds for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRange {
    pub min: f64,
    pub max: f64,
}

/// Whether `metric_key` is displayed with the temperature policy.
pub fn is_temperature_metric(metric_key: &str) -> bool {
    metric_key.to_ascii_lowercase().contains("temp")
}

/// Compute a display range for `metric_key` over `series`.
///
/// Returns `None` when no record carries a finite value for the key: there is
/// no axis to draw.
pub fn estimate_range<'a, I>(series: I, metric_key: &str) -> Option<DisplayRange>
where
    I: IntoIterator<Item = &'a MetricRecord>,
{
    let (raw_min, raw_max) = series
        .into_iter()
        .filter_map(|r| r.metric(metric_key))
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;

    if is_temperature_metric(metric_key) {
        return Some(DisplayRange {
            min: round1((raw_min - TEMPERATURE_MARGIN).max(0.0)),
            max: round1(raw_max + TEMPERATURE_MARGIN),
        });
    }

    let span = raw_max - raw_min;
    let pad = if span == 0.0 {
        let proportional = raw_max.abs() * SPAN_PADDING_RATIO;
        round1(if proportional == 0.0 {
            MIN_FLAT_PADDING
        } else {
            proportional
        })
    } else {
        round1(span * SPAN_PADDING_RATIO)
    };

    Some(DisplayRange {
        min: round1(raw_min - pad),
        max: round1(raw_max + pad),
    })
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ts;

    fn series(key: &str, values: &[f64]) -> Vec<MetricRecord> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| MetricRecord::new(ts(i as i64)).with_metric(key, *v))
            .collect()
    }

    #[test]
    fn test_empty_series_has_no_range() {
        assert_eq!(estimate_range(&Vec::<MetricRecord>::new(), "flow_rate"), None);
    }

    #[test]
    fn test_series_without_the_metric_has_no_range() {
        let s = series("gas_pressure", &[1.0, 2.0]);
        assert_eq!(estimate_range(&s, "flow_rate"), None);
    }

    #[test]
    fn test_flat_series_pads_twenty_percent_of_value() {
        let s = series("flow_rate", &[5.0, 5.0, 5.0]);
        assert_eq!(
            estimate_range(&s, "flow_rate"),
            Some(DisplayRange { min: 4.0, max: 6.0 })
        );
    }

    #[test]
    fn test_flat_zero_series_uses_minimum_pad() {
        let s = series("fan_speed", &[0.0, 0.0]);
        assert_eq!(
            estimate_range(&s, "fan_speed"),
            Some(DisplayRange { min: -1.0, max: 1.0 })
        );
    }

    #[test]
    fn test_span_padding_rounded_to_one_decimal() {
        // span 2.0 → pad 0.4
        let s = series("o2_percent", &[5.0, 6.0, 7.0]);
        assert_eq!(
            estimate_range(&s, "o2_percent"),
            Some(DisplayRange { min: 4.6, max: 7.4 })
        );
    }

    #[test]
    fn test_temperature_fixed_margin() {
        let s = series("temp_T1", &[600.0, 650.0, 700.0]);
        assert_eq!(
            estimate_range(&s, "temp_T1"),
            Some(DisplayRange {
                min: 500.0,
                max: 800.0
            })
        );
    }

    #[test]
    fn test_temperature_lower_bound_clamped_at_zero() {
        let s = series("buffer_lower_temp", &[40.0, 60.0]);
        assert_eq!(
            estimate_range(&s, "buffer_lower_temp"),
            Some(DisplayRange { min: 0.0, max: 160.0 })
        );
    }

    #[test]
    fn test_temperature_match_is_case_insensitive() {
        assert!(is_temperature_metric("TEMP_T3"));
        assert!(is_temperature_metric("fore_flow_Temp"));
        assert!(!is_temperature_metric("delta_t"));
        assert!(!is_temperature_metric("heat_output"));
    }

    #[test]
    fn test_sparse_records_only_count_reported_values() {
        let mut s = series("heat_output", &[10.0, 20.0]);
        s.push(MetricRecord::new(ts(9)).with_metric("gas_temp", 999.0));
        let r = estimate_range(&s, "heat_output").unwrap();
        assert_eq!(r, DisplayRange { min: 8.0, max: 22.0 });
    }
}
