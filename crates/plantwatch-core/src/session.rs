//! Telemetry session: bootstrap, live feed and reconnect, owned by one task.
//!
//! Architecture:
//! 1. `TelemetrySession::start` spawns a controller task that exclusively owns
//!    the [`LiveBuffer`]
//! 2. Bootstrapping: every configured device is fetched concurrently, each
//!    bounded by the fetch timeout; results are folded in configured order,
//!    optionally merged with a trailing history seed, and seeded into the buffer
//! 3. Live: each feed message is parsed and ingested in arrival order
//! 4. Reconnecting: on transport loss the feed is re-opened with capped
//!    exponential backoff; buffered data is kept and the gap is not backfilled
//! 5. Closed: reached only through teardown (or dropping the handle)
//!
//! Consumers never touch the buffer. After every change the controller
//! publishes an immutable [`SessionView`] on a `watch` channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use uuid::Uuid;

use crate::api::{HistoryQuery, HttpPlantApi, PlantApi};
use crate::buffer::LiveBuffer;
use crate::config::PlantConfig;
use crate::error::{Result, TelemetryError};
use crate::feed::{FeedConnector, WsConnector, parse_frame};
use crate::merge::{merge_device_snapshots, merge_series, normalize_series};
use crate::record::{DeviceSnapshot, MetricRecord};

// ---------------------------------------------------------------------------
// States and views
// ---------------------------------------------------------------------------

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Bootstrapping,
    Live,
    Reconnecting,
    Closed,
}

/// State of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A device whose bootstrap fetch did not produce a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFailure {
    pub device_id: String,
    pub reason: String,
}

/// Outcome of the bootstrap phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Records seeded into the window.
    pub seeded_records: usize,
    pub failed_devices: Vec<DeviceFailure>,
    /// Set when the history seed was requested and failed.
    pub history_error: Option<String>,
}

/// Immutable snapshot of a session, published after every change.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub state: SessionState,
    pub connection: ConnectionState,
    pub latest: Option<MetricRecord>,
    /// Entries are shared with the live buffer and never change.
    pub window: Arc<Vec<Arc<MetricRecord>>>,
    /// `None` until bootstrap has finished.
    pub bootstrap: Option<BootstrapReport>,
    pub frames_ingested: u64,
    pub reconnects: u32,
}

impl SessionView {
    fn initial() -> Self {
        Self {
            state: SessionState::Bootstrapping,
            connection: ConnectionState::Connecting,
            latest: None,
            window: Arc::new(Vec::new()),
            bootstrap: None,
            frames_ingested: 0,
            reconnects: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Handle to a running session.
///
/// Sessions share nothing with each other. Dropping the handle signals the
/// controller to close; [`TelemetrySession::teardown`] additionally waits for
/// it to finish.
pub struct TelemetrySession {
    id: Uuid,
    views: watch::Receiver<SessionView>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TelemetrySession {
    /// Start a session against the backend described by `config`, using the
    /// HTTP API for bootstrap and the WebSocket feed for live data.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(config: &PlantConfig, token: Option<String>) -> Self {
        let api = Arc::new(HttpPlantApi::new(config.base_url.clone(), token));
        if !api.has_credential() {
            warn!("no credential configured; device snapshot fetches will fail");
        }
        let feed = WsConnector::new(config.feed_url()).with_connect_timeout(config.fetch_timeout());
        Self::start(config, api, Arc::new(feed))
    }

    /// Start a session over arbitrary data sources.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: &PlantConfig,
        api: Arc<dyn PlantApi>,
        feed: Arc<dyn FeedConnector>,
    ) -> Self {
        let id = Uuid::new_v4();
        let (view_tx, views) = watch::channel(SessionView::initial());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(
            "[session {id}] starting: {} devices, window {}, feed {}",
            config.device_ids.len(),
            config.window_capacity,
            feed.endpoint()
        );

        let controller = Controller {
            id,
            config: config.clone(),
            api,
            feed,
            buffer: LiveBuffer::new(config.window_capacity),
            views: view_tx,
            state: SessionState::Bootstrapping,
            connection: ConnectionState::Connecting,
            bootstrap: None,
            frames_ingested: 0,
            reconnects: 0,
        };
        let task = tokio::spawn(controller.run(shutdown_rx));

        Self {
            id,
            views,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current view.
    pub fn view(&self) -> SessionView {
        self.views.borrow().clone()
    }

    /// Latest cumulative record; `None` means no data yet.
    pub fn latest(&self) -> Option<MetricRecord> {
        self.views.borrow().latest.clone()
    }

    /// The live window at this instant. Later frames never appear in it.
    pub fn window(&self) -> Arc<Vec<Arc<MetricRecord>>> {
        Arc::clone(&self.views.borrow().window)
    }

    pub fn state(&self) -> SessionState {
        self.views.borrow().state
    }

    pub fn connection(&self) -> ConnectionState {
        self.views.borrow().connection
    }

    /// A receiver notified on every published view.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.views.clone()
    }

    /// Stop the session and wait for the controller to exit. The connection is
    /// released and no view is published after this returns.
    pub async fn teardown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("[session {}] controller task failed: {e}", self.id);
            }
        }
    }
}

impl fmt::Debug for TelemetrySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.views.borrow();
        f.debug_struct("TelemetrySession")
            .field("id", &self.id)
            .field("state", &view.state)
            .field("connection", &view.connection)
            .field("window", &view.window.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

enum FeedEnd {
    Shutdown,
    Closed,
    Failed(TelemetryError),
}

struct Controller {
    id: Uuid,
    config: PlantConfig,
    api: Arc<dyn PlantApi>,
    feed: Arc<dyn FeedConnector>,
    buffer: LiveBuffer,
    views: watch::Sender<SessionView>,
    state: SessionState,
    connection: ConnectionState,
    bootstrap: Option<BootstrapReport>,
    frames_ingested: u64,
    reconnects: u32,
}

impl Controller {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let api = Arc::clone(&self.api);
        let bootstrapped = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            out = bootstrap(self.id, api.as_ref(), &self.config) => Some(out),
        };
        let Some((series, report)) = bootstrapped else {
            info!("[session {}] torn down during bootstrap", self.id);
            self.close();
            return;
        };

        self.buffer.seed(series);
        info!(
            "[session {}] bootstrap seeded {} records ({} devices failed)",
            self.id,
            report.seeded_records,
            report.failed_devices.len()
        );
        self.bootstrap = Some(report);
        self.state = SessionState::Live;
        self.publish();

        self.stream_live(&mut shutdown).await;
        self.close();
    }

    /// Connect, read until transport loss, back off, repeat. Returns only on shutdown.
    async fn stream_live(&mut self, shutdown: &mut oneshot::Receiver<()>) {
        let feed = Arc::clone(&self.feed);
        let initial = self.config.reconnect_initial();
        let max = self.config.reconnect_max();
        let mut backoff = initial;
        let mut offline_since: Option<Instant> = None;

        loop {
            let connected = tokio::select! {
                biased;
                _ = &mut *shutdown => return,
                res = feed.connect() => res,
            };

            let mut stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("[session {}] feed connect to {} failed: {e}", self.id, feed.endpoint());
                    offline_since.get_or_insert_with(Instant::now);
                    self.enter_reconnecting();
                    if !self.back_off(shutdown, &mut backoff, max).await {
                        return;
                    }
                    continue;
                }
            };

            if let Some(since) = offline_since.take() {
                info!(
                    "[session {}] feed restored after {:.1}s offline; readings from that interval are not backfilled",
                    self.id,
                    since.elapsed().as_secs_f64()
                );
            } else {
                info!("[session {}] feed open", self.id);
            }
            backoff = initial;
            self.state = SessionState::Live;
            self.connection = ConnectionState::Open;
            self.publish();

            let end = loop {
                let next = tokio::select! {
                    biased;
                    _ = &mut *shutdown => None,
                    item = stream.next() => Some(item),
                };
                match next {
                    None => break FeedEnd::Shutdown,
                    Some(None) => break FeedEnd::Closed,
                    Some(Some(Err(TelemetryError::MalformedFrame(e)))) => {
                        warn!("[session {}] dropping undecodable message: {e}", self.id);
                    }
                    Some(Some(Err(e))) => break FeedEnd::Failed(e),
                    Some(Some(Ok(text))) => self.handle_message(&text),
                }
            };
            drop(stream);

            match end {
                FeedEnd::Shutdown => return,
                FeedEnd::Closed => info!("[session {}] feed closed", self.id),
                FeedEnd::Failed(e) => warn!("[session {}] feed transport error: {e}", self.id),
            }
            offline_since = Some(Instant::now());
            self.enter_reconnecting();
            if !self.back_off(shutdown, &mut backoff, max).await {
                return;
            }
        }
    }

    fn handle_message(&mut self, text: &str) {
        match parse_frame(text) {
            Ok(Some(frame)) => {
                self.buffer.ingest(&frame);
                self.frames_ingested += 1;
                self.publish();
            }
            Ok(None) => {}
            Err(e) => warn!("[session {}] dropping frame: {e}", self.id),
        }
    }

    fn enter_reconnecting(&mut self) {
        self.reconnects += 1;
        self.state = SessionState::Reconnecting;
        self.connection = ConnectionState::Reconnecting;
        self.publish();
    }

    /// Sleep for the current backoff, then double it up to `max`. Returns
    /// `false` if shutdown arrived first.
    async fn back_off(
        &self,
        shutdown: &mut oneshot::Receiver<()>,
        backoff: &mut Duration,
        max: Duration,
    ) -> bool {
        info!(
            "[session {}] reconnecting in {:?} (attempt {})",
            self.id, *backoff, self.reconnects
        );
        let proceed = tokio::select! {
            biased;
            _ = shutdown => false,
            _ = sleep(*backoff) => true,
        };
        *backoff = (*backoff * 2).min(max);
        proceed
    }

    fn publish(&self) {
        self.views.send_replace(SessionView {
            state: self.state,
            connection: self.connection,
            latest: self.buffer.latest().cloned(),
            window: Arc::new(self.buffer.window()),
            bootstrap: self.bootstrap.clone(),
            frames_ingested: self.frames_ingested,
            reconnects: self.reconnects,
        });
    }

    fn close(&mut self) {
        self.buffer.clear();
        self.state = SessionState::Closed;
        self.connection = ConnectionState::Closed;
        self.publish();
        info!(
            "[session {}] closed after {} frames, {} reconnects",
            self.id, self.frames_ingested, self.reconnects
        );
    }
}

/// Fetch, merge and report. Never fails: per-device errors land in the report.
async fn bootstrap(
    id: Uuid,
    api: &dyn PlantApi,
    config: &PlantConfig,
) -> (Vec<MetricRecord>, BootstrapReport) {
    let limit = config.fetch_timeout();

    let fetches = config.device_ids.iter().map(|device_id| async move {
        let outcome = bounded(limit, api.fetch_recent(device_id)).await;
        (device_id, outcome)
    });
    let history = async {
        match config.history_seed_minutes {
            Some(minutes) => {
                let query = HistoryQuery::trailing(Utc::now(), minutes, config.window_capacity);
                Some(bounded(limit, api.fetch_history(query)).await)
            }
            None => None,
        }
    };
    let (results, history) = tokio::join!(join_all(fetches), history);

    let mut report = BootstrapReport::default();
    let mut snapshots: Vec<DeviceSnapshot> = Vec::with_capacity(results.len());
    for (device_id, outcome) in results {
        match outcome {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                warn!("[session {id}] bootstrap fetch for {device_id} failed: {e}");
                report.failed_devices.push(DeviceFailure {
                    device_id: device_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut series = merge_device_snapshots(snapshots);
    match history {
        Some(Ok(records)) => {
            debug!("[session {id}] history seed returned {} records", records.len());
            series = merge_series(normalize_series(records), series);
        }
        Some(Err(e)) => {
            warn!("[session {id}] history seed failed: {e}");
            report.history_error = Some(e.to_string());
        }
        None => {}
    }

    report.seeded_records = series.len().min(config.window_capacity.max(1));
    (series, report)
}

/// Bound `fut` by `limit`; running out of time is a transport failure.
async fn bounded<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TelemetryError::Network(format!(
            "no response within {}ms",
            limit.as_millis()
        ))),
    }
}
