//! # plantwatch-core
//!
//! Telemetry aggregation and windowing for plant monitoring.
//!
//! Sensor nodes (reactor temperatures, buffer tank, heating loop, exhaust gas)
//! publish independently. This crate reconciles their readings into one
//! per-timestamp series, keeps a bounded live window fed by the push feed, and
//! derives chart ranges from any slice of readings.
//!
//! ## Quick Start
//!
//! ```no_run
//! use plantwatch_core::{PlantConfig, TelemetrySession, estimate_range};
//!
//! # async fn run() {
//! let config = PlantConfig::default();
//! let session = TelemetrySession::connect(&config, Some("token".into()));
//!
//! let window = session.window();
//! if let Some(range) = estimate_range(window.iter().map(|r| &**r), "temp_T1") {
//!     println!("temp_T1 axis: {} .. {}", range.min, range.max);
//! }
//!
//! session.teardown().await;
//! # }
//! ```
//!
//! ## Architecture
//!
//! Device snapshots + history → Merger → LiveBuffer ← Feed frames
//!
//! - [`merge_device_snapshots`] folds bootstrap snapshots with the
//!   last-write-wins rule in [`merge_metrics`].
//! - [`LiveBuffer`] holds the latest cumulative record and a bounded window.
//! - [`TelemetrySession`] owns a buffer on a dedicated task and publishes
//!   immutable [`SessionView`]s.
//! - [`estimate_range`] turns a window into chart axis bounds.

pub mod api;
pub mod buffer;
pub mod config;
pub mod error;
pub mod feed;
pub mod merge;
pub mod range;
pub mod record;
pub mod session;

pub use api::{DEFAULT_HISTORY_LIMIT, HistoryQuery, HttpPlantApi, PlantApi};
pub use buffer::{DEFAULT_WINDOW_CAPACITY, LiveBuffer};
pub use config::{DEFAULT_DEVICE_IDS, PlantConfig, TokenStore, feed_url_from_base};
pub use error::{Result, TelemetryError};
pub use feed::{FeedConnector, FeedStream, WsConnector, parse_frame};
pub use merge::{is_time_ordered, merge_device_snapshots, merge_series, normalize_series};
pub use range::{DisplayRange, estimate_range, is_temperature_metric};
pub use record::{DeviceSnapshot, MetricRecord, Metrics, merge_metrics};
pub use session::{
    BootstrapReport, ConnectionState, DeviceFailure, SessionState, SessionView, TelemetrySession,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
