// Sensorstream - Realtime sensor ingestion and decimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Transport abstraction
//!
//! A transport (WebSocket, Socket.IO, serial line, file replay...) owns the
//! connection and pushes what it receives into a [`TransportSink`]. The
//! session never talks to the wire itself.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use crate::error::{Result, TransportError};
use crate::reading::RawReading;
use crate::status::ConnectionStatus;

/// Handle a transport uses to deliver readings and status changes
#[derive(Debug, Clone)]
pub struct TransportSink {
    readings: mpsc::UnboundedSender<RawReading>,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl TransportSink {
    pub(crate) fn new(
        readings: mpsc::UnboundedSender<RawReading>,
        status: Arc<watch::Sender<ConnectionStatus>>,
    ) -> Self {
        Self { readings, status }
    }

    /// Deliver one raw payload. Returns `false` once the session has stopped.
    pub fn on_reading(&self, raw: impl Into<RawReading>) -> bool {
        self.readings.send(raw.into()).is_ok()
    }

    /// Report a connection state change
    pub fn on_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            log::info!("Transport status: {} -> {}", previous, status);
        }
    }

    /// Whether the receiving session is still running
    pub fn is_open(&self) -> bool {
        !self.readings.is_closed()
    }
}

/// Source of raw readings
pub trait Transport: Send + 'static {
    /// Start delivering into `sink`. Called once per session start.
    fn connect(&mut self, sink: TransportSink) -> Result<()>;

    /// Stop delivering and release the connection
    fn disconnect(&mut self);
}

type SharedSink = Arc<Mutex<Option<TransportSink>>>;

/// Transport driven by hand through a [`ManualHandle`]
///
/// Useful for tests and for embedding the pipeline behind a callback API.
#[derive(Debug)]
pub struct ManualTransport {
    sink: SharedSink,
    fail_with: Option<String>,
}

/// Feeding side of a [`ManualTransport`]
#[derive(Debug, Clone)]
pub struct ManualHandle {
    sink: SharedSink,
}

impl ManualTransport {
    /// Create a transport and its handle
    pub fn new() -> (Self, ManualHandle) {
        let sink: SharedSink = Arc::new(Mutex::new(None));
        (
            Self {
                sink: Arc::clone(&sink),
                fail_with: None,
            },
            ManualHandle { sink },
        )
    }

    /// Create a transport whose `connect` fails
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
            fail_with: Some(reason.into()),
        }
    }
}

impl Transport for ManualTransport {
    fn connect(&mut self, sink: TransportSink) -> Result<()> {
        if let Some(reason) = &self.fail_with {
            return Err(TransportError::ConnectFailed {
                reason: reason.clone(),
            }
            .into());
        }

        let mut slot = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(TransportError::AlreadyConnected.into());
        }
        sink.on_status(ConnectionStatus::Connected);
        *slot = Some(sink);
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut slot = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sink) = slot.take() {
            sink.on_status(ConnectionStatus::Disconnected);
        }
    }
}

impl ManualHandle {
    fn with_sink<T>(&self, f: impl FnOnce(&TransportSink) -> T) -> Option<T> {
        let slot = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(f)
    }

    /// Deliver a payload. Returns `false` when not connected.
    pub fn send(&self, raw: impl Into<RawReading>) -> bool {
        let raw = raw.into();
        self.with_sink(|sink| sink.on_reading(raw)).unwrap_or(false)
    }

    /// Report a status change. Ignored when not connected.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.with_sink(|sink| sink.on_status(status));
    }

    /// Whether a session is attached
    pub fn is_connected(&self) -> bool {
        self.with_sink(TransportSink::is_open).unwrap_or(false)
    }
}
