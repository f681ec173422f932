//! Offline walk through the aggregation pipeline.
//!
//! Merges two device snapshots, replays a few live frames into a bounded
//! buffer, and prints the display range for each metric.
//!
//! Run: `cargo run --example basic`

use chrono::{Duration, Utc};
use plantwatch_core::{
    DeviceSnapshot, LiveBuffer, MetricRecord, estimate_range, merge_device_snapshots, parse_frame,
};

fn main() {
    let t0 = Utc::now() - Duration::minutes(1);

    // Two nodes reporting different metrics at the same instants
    let reactor = DeviceSnapshot::new(
        "plant_1_reactor_temp_node_1",
        (0..3)
            .map(|i| {
                MetricRecord::new(t0 + Duration::seconds(i * 10))
                    .with_metric("temp_T1", 640.0 + i as f64 * 5.0)
            })
            .collect(),
    );
    let exhaust = DeviceSnapshot::new(
        "plant_1_exhaust_node_1",
        vec![MetricRecord::new(t0).with_metric("o2_percent", 6.2)],
    );

    let series = merge_device_snapshots(vec![reactor, exhaust]);
    println!("Merged bootstrap series: {} records", series.len());

    let mut buffer = LiveBuffer::new(5);
    buffer.seed(series);

    for i in 0..4 {
        let text = format!(
            r#"{{"type":"plant-reading","ts":"{}","device_id":"plant_1_exhaust_node_1","metrics":{{"o2_percent":{}}}}}"#,
            (t0 + Duration::seconds(30 + i * 5)).to_rfc3339(),
            6.0 + i as f64 * 0.1
        );
        match parse_frame(&text) {
            Ok(Some(frame)) => buffer.ingest(&frame),
            Ok(None) => {}
            Err(e) => eprintln!("dropped frame: {e}"),
        }
    }
    println!("Live window: {}/{} records", buffer.len(), buffer.capacity());

    if let Some(latest) = buffer.latest() {
        println!("Latest at {}:", latest.ts.to_rfc3339());
        for (key, value) in &latest.metrics {
            let range = estimate_range(buffer.iter(), key);
            match range {
                Some(r) => {
                    println!("  {key:<12} {value:>8.2}   axis {:.1} .. {:.1}", r.min, r.max)
                }
                None => println!("  {key:<12} {value:>8.2}"),
            }
        }
    }
}
