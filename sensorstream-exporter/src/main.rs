// Sensorstream Exporter - Prometheus exporter and read API
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Sensorstream Exporter
//!
//! Runs a [`StreamSession`] fed by a CSV replay and serves its buffers, chart
//! series and pipeline metrics over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Replay a dataset at 10x
//! sensorstream-exporter --csv dataset.csv --speed 10.0
//!
//! # Custom port and pipeline settings
//! sensorstream-exporter --csv dataset.csv --port 9090 --config stream.json
//!
//! # Play the dataset once
//! sensorstream-exporter --csv dataset.csv --loop-replay false
//! ```

mod metrics;
mod replay;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use metrics::{encode_metrics, update_session_metrics};
use replay::{DatasetInfo, ReplayConfig, ReplayState, ReplayTransport};
use sensorstream::{
    AlertLevel, ChartSeries, ConnectionStatus, Reading, StreamConfig, StreamMetrics, StreamSession,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Sensorstream Prometheus Exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// CSV file to replay
    #[arg(short, long)]
    csv: Option<String>,

    /// Replay speed multiplier (1.0 = real-time)
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Loop the replay when it reaches the end
    #[arg(short, long, default_value_t = true, action = clap::ArgAction::Set)]
    loop_replay: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// JSON stream configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Application state shared across handlers.
struct AppState {
    session: Arc<StreamSession>,
    replay_state: Option<Arc<ReplayState>>,
    dataset_info: Option<DatasetInfo>,
    start_time: std::time::Instant,
}

impl AppState {
    fn new(session: Arc<StreamSession>) -> Self {
        Self {
            session,
            replay_state: None,
            dataset_info: None,
            start_time: std::time::Instant::now(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Sensorstream Exporter v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => StreamConfig::from_file(path)?,
        None => StreamConfig::default(),
    };
    let session = Arc::new(StreamSession::new(config)?);
    let mut state = AppState::new(Arc::clone(&session));

    // Start the session on the replay transport if a CSV was given
    if let Some(csv_path) = args.csv.clone() {
        let replay_config = ReplayConfig {
            csv_path,
            speed: args.speed,
            loop_replay: args.loop_replay,
            ..Default::default()
        };

        match ReplayTransport::from_csv(replay_config) {
            Ok(transport) => {
                state.replay_state = Some(transport.state());
                state.dataset_info = Some(transport.dataset_info());
                session.start(transport)?;
            }
            Err(e) => {
                tracing::error!("Failed to load dataset: {}", e);
            }
        }
    } else {
        info!("No dataset specified, running in static mode");
    }

    let app = router(Arc::new(state));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/sensors", get(sensors_handler))
        .route("/sensors/:id", get(sensor_buffer_handler))
        .route("/sensors/:id/latest", get(sensor_latest_handler))
        .route("/sensors/:id/chart", get(sensor_chart_handler))
        .route("/pause", post(pause_handler))
        .route("/resume", post(resume_handler))
        .with_state(state)
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Sensorstream Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>Sensorstream Exporter</h1>
    <p>Realtime sensor buffers, decimated chart series and pipeline metrics.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div class="endpoint"><a href="/health">/health</a> - Health check</div>
        <div class="endpoint"><a href="/ready">/ready</a> - Readiness check</div>
        <div class="endpoint"><a href="/status">/status</a> - Status information (JSON)</div>
        <div class="endpoint"><a href="/sensors">/sensors</a> - Known sensors (JSON)</div>
        <div class="endpoint"><code>/sensors/:id</code> - Buffered readings</div>
        <div class="endpoint"><code>/sensors/:id/latest</code> - Newest reading</div>
        <div class="endpoint"><code>/sensors/:id/chart</code> - Decimated chart series</div>
        <div class="endpoint"><code>POST /pause</code>, <code>POST /resume</code> - Pause gate</div>
    </div>

    <h2>Metrics</h2>
    <ul>
        <li><code>sensorstream_pipeline_readings</code> - Readings per pipeline outcome</li>
        <li><code>sensorstream_flushes_total</code> - Applied batch flushes</li>
        <li><code>sensorstream_paused</code> - Pause gate state</li>
        <li><code>sensorstream_connection_status</code> - Transport status</li>
        <li><code>sensorstream_sensor_*</code> - Per-sensor buffer size, last value, alert level</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_session_metrics(&state.session);
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler: ready once the transport is connected, or
/// immediately when there is nothing to replay.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.replay_state.is_none() || state.session.status().is_connected() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    connection: ConnectionStatus,
    paused: bool,
    generation: u64,
    sensor_count: usize,
    pipeline: StreamMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    replay: Option<ReplayStatus>,
}

/// Replay status information.
#[derive(Serialize)]
struct ReplayStatus {
    running: bool,
    position: usize,
    total_samples: usize,
    loops: usize,
    progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset: Option<DatasetInfo>,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let replay = state.replay_state.as_ref().map(|replay_state| {
        let position = replay_state.position.load(Ordering::SeqCst);
        let total = replay_state.total_samples.load(Ordering::SeqCst);
        let progress = if total > 0 {
            (position as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        ReplayStatus {
            running: replay_state.running.load(Ordering::SeqCst),
            position,
            total_samples: total,
            loops: replay_state.loops.load(Ordering::SeqCst),
            progress_percent: progress,
            dataset: state.dataset_info.clone(),
        }
    });

    let session = &state.session;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        connection: session.status(),
        paused: session.is_paused(),
        generation: session.generation(),
        sensor_count: session.sensor_ids().len(),
        pipeline: session.metrics(),
        replay,
    })
}

/// One entry of the sensor listing.
#[derive(Serialize)]
struct SensorSummary {
    sensor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    buffered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<AlertLevel>,
}

/// Sensors handler - every sensor with a buffer.
async fn sensors_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SensorSummary>> {
    let session = &state.session;
    let catalog = session.normalizer().catalog();
    let sensors = session
        .sensor_ids()
        .into_iter()
        .map(|sensor_id| SensorSummary {
            title: catalog.get(&sensor_id).map(|info| info.title.clone()),
            buffered: session.get_buffer(&sensor_id).len(),
            last: session.get_last(&sensor_id),
            alert: session.alert(&sensor_id),
            sensor_id,
        })
        .collect();
    Json(sensors)
}

/// Buffer handler - oldest-first readings of one sensor.
async fn sensor_buffer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Reading>>, StatusCode> {
    let readings = state.session.get_buffer(&id);
    if readings.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(readings))
}

/// Latest handler - newest buffered reading of one sensor.
async fn sensor_latest_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Reading>, StatusCode> {
    state
        .session
        .get_last(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Chart response.
#[derive(Serialize)]
struct ChartResponse {
    sensor_id: String,
    #[serde(flatten)]
    series: ChartSeries,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<AlertLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_text: Option<&'static str>,
}

/// Chart handler - decimated series with the alert level of the newest value.
async fn sensor_chart_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChartResponse>, StatusCode> {
    let series = state.session.chart(&id);
    if series.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    let alert = state.session.alert(&id);
    Ok(Json(ChartResponse {
        sensor_id: id,
        series,
        alert,
        status_text: alert.map(|level| level.status_text()),
    }))
}

/// Pause gate response.
#[derive(Serialize)]
struct GateResponse {
    paused: bool,
    changed: bool,
}

async fn pause_handler(State(state): State<Arc<AppState>>) -> Json<GateResponse> {
    let changed = state.session.pause();
    Json(GateResponse {
        paused: state.session.is_paused(),
        changed,
    })
}

async fn resume_handler(State(state): State<Arc<AppState>>) -> Json<GateResponse> {
    let changed = state.session.resume();
    Json(GateResponse {
        paused: state.session.is_paused(),
        changed,
    })
}
