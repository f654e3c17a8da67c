//! Protocol state machine for the Router connection.
//!
//! [`StateMachine`] owns the connection state, the watchdog, the retry timer
//! and the read buffer, and is driven by four inputs: delivery attempts,
//! link events, deadline ticks, and shutdown. All I/O goes through a
//! [`RouterLink`], which keeps the machine free of sockets and lets tests
//! feed it events directly.
//!
//! At most one command awaits a reply at any time. The only exception is
//! the burst of `log` commands and log lines that precedes
//! `closeTransaction`, which the Router accepts without acknowledgement.

use std::{sync::Arc, time::Instant};

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::{
    config::{ConnectorConfig, ConnectorSettings},
    timestamp::{MicrosClock, TimestampCodec},
    transaction::{LogTransaction, TransactionQueue, TxnPhase},
    wire::{Command, FrameReader, assigned_txn_id, encode_long, is_status_ok, is_version},
};

use super::{
    backoff::BackoffState,
    link::{LinkEvent, RouterLink},
    state::{ConnectionState, StateCell},
    watchdog::Watchdog,
};

/// State shared between producers and the worker thread.
#[derive(Debug)]
pub struct Shared {
    /// Producers append at the tail; only the worker touches the head.
    pub queue: Mutex<TransactionQueue>,
    pub state: StateCell,
    pub clock: MicrosClock,
}

impl Shared {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(TransactionQueue::new(capacity)),
            state: StateCell::new(ConnectionState::Disabled),
            clock: MicrosClock::new(),
        }
    }
}

/// Connection lifecycle and per-transaction protocol exchange.
pub struct StateMachine<L: RouterLink> {
    config: ConnectorConfig,
    shared: Arc<Shared>,
    link: L,
    state: ConnectionState,
    generation: u64,
    watchdog: Watchdog,
    backoff: BackoffState,
    retry_at: Option<Instant>,
    reader: FrameReader,
    codec: Arc<dyn TimestampCodec>,
}

impl<L: RouterLink> StateMachine<L> {
    /// Create a machine in the `Disconnected` state.
    pub fn new(
        config: ConnectorConfig,
        settings: &ConnectorSettings,
        shared: Arc<Shared>,
        link: L,
    ) -> Self {
        shared.state.store(ConnectionState::Disconnected);
        Self {
            config,
            shared,
            link,
            state: ConnectionState::Disconnected,
            generation: 0,
            watchdog: Watchdog::new(settings.watchdog_timeout),
            backoff: BackoffState::new(settings.backoff.clone()),
            retry_at: None,
            reader: FrameReader::short(),
            codec: Arc::clone(&settings.codec),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Identifier of the current (or most recent) socket.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Earliest instant at which [`on_tick`](Self::on_tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.watchdog.deadline(), self.retry_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// True when nothing is queued and no transaction is mid-exchange.
    pub fn is_idle(&self) -> bool {
        !matches!(
            self.state,
            ConnectionState::AwaitingOpenAck | ConnectionState::AwaitingCloseAck
        ) && self.shared.queue.lock().is_empty()
    }

    /// Open a fresh socket and restart the handshake.
    pub fn begin_connection(&mut self, now: Instant) {
        if self.state != ConnectionState::Disconnected {
            return;
        }
        self.generation += 1;
        self.retry_at = None;
        self.reader.clear();
        self.transition(ConnectionState::Connecting, now, None);
        debug!(
            "connecting to router at [{}] (connection {})",
            self.config.router_address, self.generation
        );
        self.link.connect(self.generation);
    }

    /// Advance delivery as far as the current state allows.
    ///
    /// Idempotent: calling it while a reply is outstanding does nothing.
    pub fn delivery_attempt(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Disconnected => {
                if !self.shared.queue.lock().is_empty() {
                    self.begin_connection(now);
                }
            }
            ConnectionState::Ready => self.send_next(now),
            _ => {}
        }
    }

    /// React to a link notification.
    pub fn handle_event(&mut self, event: LinkEvent<L::Connection>, now: Instant) {
        match event {
            LinkEvent::Connected {
                generation,
                connection,
            } => {
                if generation != self.generation || self.state != ConnectionState::Connecting {
                    debug!("discarding connection {generation} from a superseded attempt");
                    self.link.discard(connection);
                    return;
                }
                if let Err(err) = self.link.attach(connection) {
                    error!("Unable to configure router connection: {err}, will auto-retry.");
                    self.disconnect("socket setup failed", now);
                    return;
                }
                self.transition(ConnectionState::AwaitingVersion, now, None);
            }
            LinkEvent::Data { generation, bytes } => {
                if !self.is_current(generation) {
                    return;
                }
                self.reader.push(&bytes);
                while self.is_current(generation) {
                    let Some(fields) = self.reader.next_fields() else {
                        break;
                    };
                    self.on_reply(fields, now);
                }
            }
            LinkEvent::Closed { generation, error } => {
                if !self.is_current(generation) {
                    return;
                }
                let reason = match error {
                    Some(err) if self.state == ConnectionState::Connecting => {
                        error!(
                            "Unable to connect to router at [{}]: {err}, will auto-retry.",
                            self.config.router_address
                        );
                        "connect failed"
                    }
                    Some(err) => {
                        error!("Unexpected error in router connection: {err}, will auto-retry.");
                        "socket error"
                    }
                    None => "socket end",
                };
                self.disconnect(reason, now);
            }
        }
    }

    /// Fire the watchdog or a scheduled retry whose deadline has passed.
    pub fn on_tick(&mut self, now: Instant) {
        if self.watchdog.expired(now) {
            error!(
                "Router did not respond within {:?} while {}, will auto-retry.",
                self.watchdog.timeout(),
                self.state
            );
            self.disconnect("watchdog timeout", now);
        }
        if self.retry_at.is_some_and(|at| now >= at) {
            self.retry_at = None;
            self.delivery_attempt(now);
        }
    }

    /// Tear down the socket for good; the machine is not used afterwards.
    pub fn shutdown(&mut self) {
        self.watchdog.disarm();
        self.retry_at = None;
        self.reader.clear();
        self.link.close();
        self.state = ConnectionState::Disconnected;
        self.shared.state.store(ConnectionState::Disconnected);
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state.is_active()
    }

    fn transition(&mut self, next: ConnectionState, now: Instant, reason: Option<&str>) {
        match reason {
            Some(reason) => debug!("router state: {} -> {next} due to: {reason}", self.state),
            None => debug!("router state: {} -> {next}", self.state),
        }
        self.state = next;
        self.shared.state.store(next);
        if next.awaits_reply() {
            self.watchdog.arm(now);
        } else {
            self.watchdog.disarm();
        }
    }

    fn disconnect(&mut self, reason: &str, now: Instant) {
        self.transition(ConnectionState::Disconnected, now, Some(reason));
        self.link.close();
        self.reader.clear();
        self.schedule_retry(now);
    }

    fn schedule_retry(&mut self, now: Instant) {
        if self.shared.queue.lock().is_empty() {
            self.retry_at = None;
            return;
        }
        self.retry_at = self.backoff.next_delay(now).map(|delay| {
            debug!("retrying router connection in {delay:?}");
            now + delay
        });
        if self.retry_at.is_none() {
            warn!("router unreachable; retrying on the next logged transaction");
        }
    }

    fn send_frame(&mut self, frame: &[u8], now: Instant) -> bool {
        match self.link.send(frame) {
            Ok(()) => true,
            Err(err) => {
                error!("Router write failed: {err}, will auto-retry.");
                self.disconnect("write failed", now);
                false
            }
        }
    }

    fn verify_ok(&mut self, fields: &[String], topic: &str, now: Instant) -> bool {
        if is_status_ok(fields) {
            return true;
        }
        error!(
            "Error with router {topic}: [{}], will auto-retry.",
            fields.join(",")
        );
        self.disconnect("not OK reply", now);
        false
    }

    fn on_reply(&mut self, fields: Vec<String>, now: Instant) {
        match self.state {
            ConnectionState::AwaitingVersion => {
                if !is_version(&fields) {
                    error!(
                        "Error with router version: [{}], will auto-retry.",
                        fields.join(",")
                    );
                    self.disconnect("not OK reply", now);
                    return;
                }
                self.transition(ConnectionState::AwaitingAuth, now, None);
                self.send_credentials(now);
            }
            ConnectionState::AwaitingAuth => {
                if self.verify_ok(&fields, "authentication", now) {
                    self.transition(ConnectionState::AwaitingInit, now, None);
                    let node_name = self.config.node_name.clone();
                    self.send_command(Command::Init { node_name: &node_name }, now);
                }
            }
            ConnectionState::AwaitingInit => {
                if self.verify_ok(&fields, "initialization", now) {
                    self.backoff.reset();
                    self.transition(ConnectionState::Ready, now, None);
                    self.delivery_attempt(now);
                }
            }
            ConnectionState::Ready => {
                warn!(
                    "Unexpected data from router while idle: [{}]",
                    fields.join(",")
                );
                self.delivery_attempt(now);
            }
            ConnectionState::AwaitingOpenAck => {
                if self.verify_ok(&fields, "openTransaction", now) {
                    self.mark_head_opened(assigned_txn_id(&fields));
                    self.transition(ConnectionState::Ready, now, None);
                    self.delivery_attempt(now);
                }
            }
            ConnectionState::AwaitingCloseAck => {
                if self.verify_ok(&fields, "closeTransaction", now) {
                    self.transition(ConnectionState::Ready, now, None);
                    self.delivery_attempt(now);
                }
            }
            ConnectionState::Disabled
            | ConnectionState::Disconnected
            | ConnectionState::Connecting => {
                debug!("ignoring router frame received while {}", self.state);
            }
        }
    }

    fn send_credentials(&mut self, now: Instant) {
        let frames = encode_long(self.config.user.as_bytes()).and_then(|mut user| {
            user.extend(encode_long(self.config.password.as_bytes())?);
            Ok(user)
        });
        match frames {
            Ok(frames) => {
                self.send_frame(&frames, now);
            }
            Err(err) => {
                error!("Unable to frame router credentials: {err}");
                self.disconnect("credentials too large", now);
            }
        }
    }

    fn send_command(&mut self, command: Command<'_>, now: Instant) {
        match command.encode() {
            Ok(frame) => {
                self.send_frame(&frame, now);
            }
            Err(err) => {
                error!("Unable to frame router {} command: {err}", command.name());
                self.disconnect("command too large", now);
            }
        }
    }

    fn mark_head_opened(&mut self, assigned: Option<&str>) {
        let mut queue = self.shared.queue.lock();
        let Some(head) = queue.head_mut() else {
            return;
        };
        head.phase = TxnPhase::Opened;
        if head.txn_id.is_empty() {
            match assigned {
                Some(id) => {
                    debug!("using router-assigned transaction id {id}");
                    head.txn_id = id.to_owned();
                }
                None => warn!("router assigned no transaction id to a {} transaction", head.category),
            }
        }
    }

    fn send_next(&mut self, now: Instant) {
        let shared = Arc::clone(&self.shared);
        loop {
            let mut queue = shared.queue.lock();
            let Some(head) = queue.head() else {
                return;
            };
            match head.phase {
                TxnPhase::NotOpened => {
                    let timestamp = self.codec.encode(head.timestamp);
                    let open = Command::OpenTransaction {
                        txn_id: &head.txn_id,
                        app_group_name: &self.config.app_group_name,
                        node_name: &self.config.node_name,
                        category: &head.category,
                        timestamp: &timestamp,
                        gateway_key: &self.config.gateway_key,
                    };
                    match open.encode() {
                        Ok(frame) => {
                            debug!("open transaction ({})", head.txn_id);
                            drop(queue);
                            self.transition(ConnectionState::AwaitingOpenAck, now, None);
                            self.send_frame(&frame, now);
                            return;
                        }
                        Err(err) => {
                            warn!(
                                "Dropping {} transaction that cannot be opened: {err}",
                                head.category
                            );
                            queue.pop_head();
                        }
                    }
                }
                TxnPhase::Opened => {
                    let Some(txn) = queue.pop_head() else {
                        return;
                    };
                    drop(queue);
                    self.send_lines_and_close(txn, now);
                    return;
                }
            }
        }
    }

    fn send_lines_and_close(&mut self, txn: LogTransaction, now: Instant) {
        debug!("log & close transaction ({})", txn.txn_id);
        let created = self.codec.encode(txn.timestamp);
        let closed = self.codec.encode(self.shared.clock.now_micros());
        let close = Command::CloseTransaction {
            txn_id: &txn.txn_id,
            timestamp: &closed,
        }
        .encode();
        let log = Command::Log {
            txn_id: &txn.txn_id,
            timestamp: &created,
        }
        .encode();
        let (log, mut burst) = match (log, close) {
            (Ok(log), Ok(close)) => (log, close),
            (Err(err), _) | (_, Err(err)) => {
                warn!("Dropping {} transaction that cannot be closed: {err}", txn.category);
                self.delivery_attempt(now);
                return;
            }
        };

        let mut body = Vec::new();
        for line in &txn.lines {
            match encode_long(line) {
                Ok(frame) => {
                    body.extend_from_slice(&log);
                    body.extend(frame);
                }
                Err(err) => warn!("Skipping log line in {} transaction: {err}", txn.category),
            }
        }
        body.append(&mut burst);

        self.transition(ConnectionState::AwaitingCloseAck, now, None);
        self.send_frame(&body, now);
    }
}

impl<L: RouterLink> std::fmt::Debug for StateMachine<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("watchdog", &self.watchdog)
            .field("retry_at", &self.retry_at)
            .finish_non_exhaustive()
    }
}
