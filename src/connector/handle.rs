//! Public connector handle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use crossbeam_channel::TrySendError;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::{
    config::{ConnectorConfig, ConnectorSettings},
    drop_report::DropReporter,
    error::{EnqueueError, InitError},
    reports::{CATEGORY_EXCEPTIONS, CATEGORY_REQUESTS, ExceptionReport, request_lines},
    transaction::LogTransaction,
};

use super::{
    machine::Shared,
    state::ConnectionState,
    worker::{WorkerHandle, flush_worker, shutdown_worker, spawn_worker},
};

/// Client for the UstRouter log sink.
///
/// Producers call [`log_to_ust_transaction`](Self::log_to_ust_transaction)
/// from any thread; the call only appends to the pending queue and wakes the
/// worker, which owns the socket and runs the protocol.
pub struct UstRouterConnector {
    settings: ConnectorSettings,
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
    drops: DropReporter,
    closed: AtomicBool,
}

impl UstRouterConnector {
    /// A disabled connector with default settings.
    pub fn new() -> Self {
        Self::with_settings(ConnectorSettings::default())
    }

    /// A disabled connector with explicit tuning values.
    pub fn with_settings(settings: ConnectorSettings) -> Self {
        Self {
            shared: Arc::new(Shared::new(settings.queue_capacity)),
            drops: DropReporter::new(settings.warn_interval),
            worker: Mutex::new(None),
            closed: AtomicBool::new(false),
            settings,
        }
    }

    /// Supply the Router configuration and start connecting.
    ///
    /// Rejected while a connection cycle is under way. An incomplete
    /// configuration disables the connector until the next successful call.
    pub fn init(&self, config: ConnectorConfig) -> Result<(), InitError> {
        let mut worker = self.worker.lock();
        let state = self.shared.state.load();
        if state.is_active() {
            warn!("UST Router connector init ignored: connection cycle active ({state})");
            return Err(InitError::AlreadyActive(state));
        }

        if let Some(previous) = worker.take() {
            self.stop_worker(previous);
        }

        let address = match config.validate() {
            Ok(address) => address,
            Err(err) => {
                self.shared.state.store(ConnectionState::Disabled);
                info!("UST Router connector disabled: {err}");
                return Err(err.into());
            }
        };

        debug!("UST Router connector initialising for [{address}]");
        let handle = spawn_worker(config, address, &self.settings, Arc::clone(&self.shared))
            .map_err(|err| {
                self.shared.state.store(ConnectionState::Disabled);
                InitError::Spawn(err)
            })?;
        *worker = Some(handle);
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.state.load() != ConnectionState::Disabled
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    /// Number of transactions queued and not yet dequeued for delivery.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Queue a transaction of `lines` under `category`.
    ///
    /// `correlation_id` becomes the transaction id; when absent the Router
    /// assigns one. Never blocks on network I/O.
    pub fn log_to_ust_transaction<I>(
        &self,
        category: &str,
        lines: I,
        correlation_id: Option<&str>,
    ) -> Result<(), EnqueueError>
    where
        I: IntoIterator,
        I::Item: Into<Vec<u8>>,
    {
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            return Err(if self.closed.load(Ordering::Acquire) {
                EnqueueError::Closed
            } else {
                EnqueueError::Disabled
            });
        };
        if self.shared.state.load() == ConnectionState::Disabled {
            return Err(EnqueueError::Disabled);
        }

        let txn = LogTransaction::new(
            self.shared.clock.now_micros(),
            category,
            lines.into_iter().map(Into::into).collect(),
            correlation_id
                .filter(|id| !id.is_empty())
                .map(str::to_owned),
        );
        let admitted = self.shared.queue.lock().push(txn).is_ok();
        if !admitted {
            self.drops.record(category);
            if let Some(summary) = self.drops.due(Instant::now()) {
                debug!("UST Router queue full; dropped {summary}");
            }
        }

        // Wake on rejection too: a full queue may be waiting on a reconnect.
        match worker.wake.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) if admitted => Ok(()),
            Ok(()) | Err(TrySendError::Full(())) => Err(EnqueueError::QueueFull),
            Err(TrySendError::Disconnected(())) => Err(EnqueueError::Closed),
        }
    }

    /// Record that a request for `url` was received.
    ///
    /// Requests without a correlation id are skipped.
    pub fn log_request(&self, url: &str, correlation_id: Option<&str>) -> Result<(), EnqueueError> {
        match correlation_id.filter(|id| !id.is_empty()) {
            Some(id) => self.log_to_ust_transaction(CATEGORY_REQUESTS, request_lines(url), Some(id)),
            None => {
                debug!("not logging request for {url}: no transaction id");
                Ok(())
            }
        }
    }

    /// Record an exception report.
    pub fn log_exception(&self, report: &ExceptionReport) -> Result<(), EnqueueError> {
        self.log_to_ust_transaction(CATEGORY_EXCEPTIONS, report.to_lines(), None)
    }

    /// Wait until the queue is drained and no reply is outstanding.
    ///
    /// Returns `false` if that does not happen within the flush timeout or
    /// the connector is not running.
    pub fn flush(&self) -> bool {
        let Some(control) = self.worker.lock().as_ref().map(|w| w.control.clone()) else {
            return false;
        };
        if let Some(summary) = self.drops.take() {
            warn!("UST Router queue full; dropped {summary} in the last interval");
        }
        flush_worker(&control, self.settings.flush_timeout)
    }

    /// Stop the worker and close the socket. Queued transactions stay
    /// undelivered.
    pub fn close(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.closed.store(true, Ordering::Release);
        self.stop_worker(worker);
        self.shared.state.store(ConnectionState::Disabled);
        if let Some(summary) = self.drops.take() {
            warn!("UST Router queue full; dropped {summary} before close");
        }
        let pending = self.pending();
        if pending > 0 {
            warn!("UST Router connector closed with {pending} undelivered transactions");
        }
    }

    fn stop_worker(&self, worker: WorkerHandle) {
        if !shutdown_worker(&worker.control, self.settings.flush_timeout) {
            warn!("UST Router connector worker did not acknowledge shutdown");
        }
        if worker.thread.join().is_err() {
            warn!("UST Router connector worker thread panicked");
        }
    }
}

impl Default for UstRouterConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UstRouterConnector {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for UstRouterConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UstRouterConnector")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .field("settings", &self.settings)
            .finish()
    }
}
