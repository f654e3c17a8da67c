//! Worker thread driving the state machine.

use std::{
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, at, bounded, never, select, unbounded};
use log::debug;

use crate::config::{ConnectorConfig, ConnectorSettings, RouterAddress};

use super::{
    link::{LinkEvent, RouterLink, SocketLink},
    machine::{Shared, StateMachine},
};

/// Control messages processed by the worker thread.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Reply `true` once the queue drains, `false` if `deadline` passes first.
    Flush { ack: Sender<bool>, deadline: Instant },
    Shutdown(Sender<()>),
}

/// Producer-side ends of a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    /// Coalescing delivery signal; a full channel already has a wake pending.
    pub wake: Sender<()>,
    pub control: Sender<WorkerCommand>,
    pub thread: thread::JoinHandle<()>,
}

/// Build the socket link and state machine, then start the worker thread.
///
/// The machine is constructed before the thread starts, so the shared state
/// reads `Disconnected` as soon as this returns.
pub fn spawn_worker(
    config: ConnectorConfig,
    address: RouterAddress,
    settings: &ConnectorSettings,
    shared: Arc<Shared>,
) -> io::Result<WorkerHandle> {
    let (event_tx, event_rx) = unbounded();
    let link = SocketLink::new(
        address,
        settings.watchdog_timeout,
        settings.write_timeout,
        event_tx,
    );
    let machine = StateMachine::new(config, settings, shared, link);
    let (wake, wake_rx) = bounded(1);
    let (control, control_rx) = unbounded();
    let thread = thread::Builder::new()
        .name("ust-router-connector".into())
        .spawn(move || worker_loop(machine, wake_rx, control_rx, event_rx))?;
    Ok(WorkerHandle {
        wake,
        control,
        thread,
    })
}

/// Run the machine until shutdown or until every producer handle is gone.
pub fn worker_loop<L: RouterLink>(
    mut machine: StateMachine<L>,
    wake: Receiver<()>,
    control: Receiver<WorkerCommand>,
    events: Receiver<LinkEvent<L::Connection>>,
) {
    let mut waiters: Vec<(Sender<bool>, Instant)> = Vec::new();
    machine.begin_connection(Instant::now());

    loop {
        let deadline = earliest(
            machine.next_deadline(),
            waiters.iter().map(|(_, deadline)| *deadline).min(),
        );
        let timer = deadline.map_or_else(never, at);

        select! {
            recv(wake) -> msg => {
                if msg.is_err() {
                    break;
                }
                machine.delivery_attempt(Instant::now());
            }
            recv(control) -> cmd => match cmd {
                Ok(WorkerCommand::Flush { ack, deadline }) => {
                    machine.delivery_attempt(Instant::now());
                    waiters.push((ack, deadline));
                }
                Ok(WorkerCommand::Shutdown(ack)) => {
                    finish(&mut machine, &mut waiters);
                    let _ = ack.send(());
                    return;
                }
                Err(_) => break,
            },
            recv(events) -> event => match event {
                Ok(event) => machine.handle_event(event, Instant::now()),
                Err(_) => break,
            },
            recv(timer) -> _ => machine.on_tick(Instant::now()),
        }

        resolve_waiters(&machine, &mut waiters, Instant::now());
    }

    finish(&mut machine, &mut waiters);
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn resolve_waiters<L: RouterLink>(
    machine: &StateMachine<L>,
    waiters: &mut Vec<(Sender<bool>, Instant)>,
    now: Instant,
) {
    if waiters.is_empty() {
        return;
    }
    if machine.is_idle() {
        for (ack, _) in waiters.drain(..) {
            let _ = ack.send(true);
        }
        return;
    }
    waiters.retain(|(ack, deadline)| {
        if now >= *deadline {
            let _ = ack.send(false);
            false
        } else {
            true
        }
    });
}

fn finish<L: RouterLink>(machine: &mut StateMachine<L>, waiters: &mut Vec<(Sender<bool>, Instant)>) {
    let idle = machine.is_idle();
    for (ack, _) in waiters.drain(..) {
        let _ = ack.send(idle);
    }
    machine.shutdown();
    debug!("ust router connector worker stopped");
}

/// Ask the worker to report once it is idle, waiting at most `timeout`.
pub fn flush_worker(control: &Sender<WorkerCommand>, timeout: Duration) -> bool {
    let (ack, ack_rx) = bounded(1);
    let deadline = Instant::now() + timeout;
    if control.send(WorkerCommand::Flush { ack, deadline }).is_err() {
        return false;
    }
    ack_rx.recv_deadline(deadline).unwrap_or(false)
}

/// Ask the worker to stop, waiting at most `timeout` for the acknowledgement.
pub fn shutdown_worker(control: &Sender<WorkerCommand>, timeout: Duration) -> bool {
    let (ack, ack_rx) = bounded(1);
    if control.send(WorkerCommand::Shutdown(ack)).is_err() {
        return false;
    }
    ack_rx.recv_timeout(timeout).is_ok()
}
