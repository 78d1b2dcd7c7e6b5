// Sensorstream - Realtime sensor ingestion and decimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Stream session
//!
//! [`StreamSession`] owns one stream's buffers, pending batch, pause gate and
//! timers. Readings reach it from a [`Transport`] (or directly through
//! [`StreamSession::on_reading`]); they are normalized, checked against the
//! gate and queued. A flush task applies the queue every flush interval and
//! bumps the change generation once per applied flush. A debounce task
//! publishes the newest reading after a quiet window.
//!
//! ```rust,no_run
//! use sensorstream::{ManualTransport, StreamConfig, StreamSession};
//! use serde_json::json;
//!
//! # async fn run() -> sensorstream::Result<()> {
//! let session = StreamSession::new(StreamConfig::default())?;
//! let (transport, handle) = ManualTransport::new();
//! session.start(transport)?;
//!
//! let mut changes = session.subscribe_changes();
//! handle.send(json!({"sensorId": "t1", "value": 21.5}));
//! changes.changed().await.ok();
//! assert_eq!(session.get_buffer("t1").len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::alerts::AlertLevel;
use crate::batch::{self, FlushOutcome, PendingBatch};
use crate::buffer::StreamBuffer;
use crate::chart::{self, ChartSeries};
use crate::config::StreamConfig;
use crate::decimation::{DecimatedSeries, Decimator};
use crate::error::{Result, SessionError};
use crate::gate::PauseGate;
use crate::metrics::StreamMetrics;
use crate::normalizer::Normalizer;
use crate::reading::{RawReading, Reading};
use crate::status::ConnectionStatus;
use crate::throttle::Debouncer;
use crate::transport::{Transport, TransportSink};

/// Everything a flush touches, behind one lock
struct State {
    buffer: StreamBuffer,
    pending: PendingBatch,
    debouncer: Debouncer,
}

struct Shared {
    config: StreamConfig,
    normalizer: Normalizer,
    gate: PauseGate,
    state: Mutex<State>,
    metrics: Mutex<StreamMetrics>,
    changes: watch::Sender<u64>,
    latest: watch::Sender<Option<Reading>>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    debounce_wakeup: Notify,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_metrics(&self) -> MutexGuard<'_, StreamMetrics> {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Normalize, gate and queue one payload. Returns whether it was queued.
    fn ingest(&self, raw: RawReading) -> bool {
        let reading = self.normalizer.normalize(raw);
        {
            let mut metrics = self.lock_metrics();
            metrics.record_received(reading.quality);
            if self.gate.is_paused() {
                metrics.record_rejected();
                log::trace!("Paused, rejected reading from {}", reading.sensor_id);
                return false;
            }
        }

        {
            let mut state = self.lock_state();
            state.debouncer.observe(reading.clone(), Instant::now());
            state.pending.push(reading);
        }
        self.debounce_wakeup.notify_one();
        true
    }

    fn flush(&self) -> FlushOutcome {
        let outcome = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            batch::flush(&mut state.pending, &mut state.buffer, &self.gate)
        };

        self.lock_metrics().record_flush(&outcome);
        if outcome.should_notify() {
            self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
        }
        outcome
    }

    /// Publish the debounced reading if due; returns the next deadline.
    fn release_latest(&self, now: Instant) -> Option<Instant> {
        let mut state = self.lock_state();
        if let Some(reading) = state.debouncer.poll(now) {
            self.latest.send_replace(Some(reading));
        }
        state.debouncer.deadline()
    }

    fn clear_pending(&self) {
        let mut state = self.lock_state();
        let dropped = state.pending.discard();
        state.debouncer.cancel();
        if dropped > 0 {
            log::debug!("Discarded {} pending readings", dropped);
        }
    }
}

async fn run_ingest(shared: Arc<Shared>, mut readings: mpsc::UnboundedReceiver<RawReading>) {
    while let Some(raw) = readings.recv().await {
        shared.ingest(raw);
    }
    log::debug!("Transport channel closed");
}

async fn run_flusher(shared: Arc<Shared>) {
    let period = shared.config.flush_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        shared.flush();
    }
}

async fn run_debouncer(shared: Arc<Shared>) {
    loop {
        match shared.release_latest(Instant::now()) {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = shared.debounce_wakeup.notified() => {}
                }
            }
            None => shared.debounce_wakeup.notified().await,
        }
    }
}

/// One realtime sensor stream
pub struct StreamSession {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl StreamSession {
    /// Create a stopped session with the default normalizer
    pub fn new(config: StreamConfig) -> Result<Self> {
        Self::with_normalizer(config, Normalizer::new())
    }

    /// Create a stopped session with a custom normalizer
    pub fn with_normalizer(config: StreamConfig, normalizer: Normalizer) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, normalizer))
    }

    fn build(config: StreamConfig, normalizer: Normalizer) -> Self {
        let state = State {
            buffer: StreamBuffer::new(config.buffer_capacity),
            pending: PendingBatch::new(),
            debouncer: Debouncer::new(config.throttle_interval()),
        };
        let (changes, _) = watch::channel(0);
        let (latest, _) = watch::channel(None);
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);

        Self {
            shared: Arc::new(Shared {
                config,
                normalizer,
                gate: PauseGate::new(),
                state: Mutex::new(state),
                metrics: Mutex::new(StreamMetrics::new()),
                changes,
                latest,
                status: Arc::new(status),
                debounce_wakeup: Notify::new(),
            }),
            tasks: Mutex::new(Vec::new()),
            transport: Mutex::new(None),
        }
    }

    /// Connect `transport` and spawn the ingest, flush and debounce tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, transport: impl Transport) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            return Err(SessionError::AlreadyRunning.into());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SessionError::NoRuntime(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportSink::new(tx, Arc::clone(&self.shared.status));
        sink.on_status(ConnectionStatus::Connecting);

        let mut transport: Box<dyn Transport> = Box::new(transport);
        if let Err(e) = transport.connect(sink) {
            log::warn!("Transport failed to connect: {}", e);
            self.shared.status.send_replace(ConnectionStatus::Error);
            return Err(e);
        }

        tasks.push(runtime.spawn(run_ingest(Arc::clone(&self.shared), rx)));
        tasks.push(runtime.spawn(run_flusher(Arc::clone(&self.shared))));
        tasks.push(runtime.spawn(run_debouncer(Arc::clone(&self.shared))));
        *self.transport.lock().unwrap_or_else(|e| e.into_inner()) = Some(transport);

        log::info!(
            "Stream session started (capacity {}, flush {} ms, throttle {} ms)",
            self.shared.config.buffer_capacity,
            self.shared.config.flush_interval_ms,
            self.shared.config.throttle_interval_ms
        );
        Ok(())
    }

    /// Stop timers, disconnect the transport and discard pending readings.
    /// Idempotent; buffers are kept.
    pub fn stop(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        let was_running = !tasks.is_empty();
        for task in tasks {
            task.abort();
        }

        let transport = self
            .transport
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut transport) = transport {
            transport.disconnect();
        }

        self.shared.clear_pending();
        self.shared.status.send_replace(ConnectionStatus::Disconnected);
        if was_running {
            log::info!("Stream session stopped");
        }
    }

    /// Whether the session timers are running
    pub fn is_running(&self) -> bool {
        !self.tasks.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Feed one payload without a transport. Returns `false` when the gate
    /// rejected it.
    pub fn on_reading(&self, raw: impl Into<RawReading>) -> bool {
        self.shared.ingest(raw.into())
    }

    /// Apply the pending batch immediately
    pub fn flush_now(&self) -> FlushOutcome {
        self.shared.flush()
    }

    /// Stop accepting readings. Returns whether the state changed.
    pub fn pause(&self) -> bool {
        let changed = self.shared.gate.pause();
        if changed {
            log::info!("Stream paused");
        }
        changed
    }

    /// Accept readings again. Nothing seen while paused is replayed.
    pub fn resume(&self) -> bool {
        let changed = self.shared.gate.resume();
        if changed {
            log::info!("Stream resumed");
        }
        changed
    }

    pub fn is_paused(&self) -> bool {
        self.shared.gate.is_paused()
    }

    /// Oldest-first copy of one sensor's buffer; empty when unknown
    pub fn get_buffer(&self, sensor_id: &str) -> Vec<Reading> {
        self.shared.lock_state().buffer.snapshot(sensor_id)
    }

    /// Newest buffered reading of one sensor
    pub fn get_last(&self, sensor_id: &str) -> Option<Reading> {
        self.shared.lock_state().buffer.last(sensor_id).cloned()
    }

    /// Sensors with a buffer, sorted
    pub fn sensor_ids(&self) -> Vec<String> {
        self.shared.lock_state().buffer.sensor_ids()
    }

    /// Readings waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.shared.lock_state().pending.len()
    }

    /// Newest reading once its debounce window has elapsed
    pub fn latest(&self) -> Option<Reading> {
        self.shared.release_latest(Instant::now());
        self.shared.latest.borrow().clone()
    }

    /// Receiver over the flush generation: one increment per applied flush
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    /// Current flush generation
    pub fn generation(&self) -> u64 {
        *self.shared.changes.borrow()
    }

    /// Receiver over the debounced newest reading
    pub fn subscribe_latest(&self) -> watch::Receiver<Option<Reading>> {
        self.shared.latest.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Chart series of one sensor's buffer, decimated when long
    pub fn chart(&self, sensor_id: &str) -> ChartSeries {
        ChartSeries::from_readings(&self.get_buffer(sensor_id), &self.shared.config.decimation)
    }

    /// Alert level of one sensor's newest reading
    pub fn alert(&self, sensor_id: &str) -> Option<AlertLevel> {
        chart::last_alert(&self.get_buffer(sensor_id), self.shared.normalizer.catalog())
    }

    /// Decimate an arbitrary series with this session's settings
    pub fn decimate(&self, values: &[f64], labels: &[String]) -> DecimatedSeries {
        Decimator::new(self.shared.config.decimation.clone()).decimate(values, labels)
    }

    /// Snapshot of the pipeline counters
    pub fn metrics(&self) -> StreamMetrics {
        *self.shared.lock_metrics()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.shared.normalizer
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::build(StreamConfig::default(), Normalizer::new())
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.stop();
    }
}
