//! The state machine's view of the socket.
//!
//! [`RouterLink`] is the seam between protocol logic and I/O. The state
//! machine asks the link to connect, send frames, and close; connection
//! completion, received bytes, and socket closure come back as
//! [`LinkEvent`]s tagged with the generation that requested them, so events
//! from a torn-down socket can be recognised and ignored.

use std::{
    io::{self, Read, Write},
    thread,
    time::Duration,
};

use crossbeam_channel::Sender;
use log::debug;

use crate::config::RouterAddress;

use super::transport::{self, ActiveConnection};

const READ_CHUNK: usize = 8 * 1024;

/// Socket operations driven by the state machine.
pub trait RouterLink {
    /// Established connection handed back through [`LinkEvent::Connected`].
    type Connection;

    /// Start connecting. Completion or failure is reported asynchronously
    /// with the same `generation`.
    fn connect(&mut self, generation: u64);

    /// Adopt the connection for the current generation.
    fn attach(&mut self, connection: Self::Connection) -> io::Result<()>;

    /// Release a connection that arrived for a superseded generation.
    fn discard(&mut self, connection: Self::Connection) {
        drop(connection);
    }

    /// Write one complete frame.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Tear down the current socket, if any.
    fn close(&mut self);
}

/// Asynchronous notifications from a link.
#[derive(Debug)]
pub enum LinkEvent<C = ActiveConnection> {
    Connected { generation: u64, connection: C },
    Data { generation: u64, bytes: Vec<u8> },
    Closed {
        generation: u64,
        error: Option<io::Error>,
    },
}

/// [`RouterLink`] over a TCP or Unix-domain socket.
///
/// Each connect spawns a thread that establishes the socket, hands a write
/// handle back through the event channel, then blocks reading and forwards
/// every chunk until the socket closes.
pub struct SocketLink {
    address: RouterAddress,
    connect_timeout: Duration,
    write_timeout: Duration,
    events: Sender<LinkEvent>,
    active: Option<ActiveConnection>,
}

impl SocketLink {
    pub fn new(
        address: RouterAddress,
        connect_timeout: Duration,
        write_timeout: Duration,
        events: Sender<LinkEvent>,
    ) -> Self {
        Self {
            address,
            connect_timeout,
            write_timeout,
            events,
            active: None,
        }
    }
}

impl RouterLink for SocketLink {
    type Connection = ActiveConnection;

    fn connect(&mut self, generation: u64) {
        self.close();
        let address = self.address.clone();
        let timeout = self.connect_timeout;
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name(format!("ust-router-link-{generation}"))
            .spawn(move || run_link(address, timeout, generation, events));
        if let Err(err) = spawned {
            let _ = self.events.send(LinkEvent::Closed {
                generation,
                error: Some(err),
            });
        }
    }

    fn attach(&mut self, connection: ActiveConnection) -> io::Result<()> {
        connection.set_write_timeout(self.write_timeout)?;
        self.active = Some(connection);
        Ok(())
    }

    fn discard(&mut self, connection: ActiveConnection) {
        let _ = connection.shutdown();
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let conn = self
            .active
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no router connection"))?;
        conn.write_all(frame)?;
        conn.flush()
    }

    fn close(&mut self) {
        if let Some(conn) = self.active.take() {
            let _ = conn.shutdown();
        }
    }
}

impl Drop for SocketLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_link(
    address: RouterAddress,
    timeout: Duration,
    generation: u64,
    events: Sender<LinkEvent>,
) {
    let closed = |error| LinkEvent::Closed { generation, error };
    let connection = match transport::connect(&address, timeout) {
        Ok(conn) => conn,
        Err(err) => {
            let _ = events.send(closed(Some(err)));
            return;
        }
    };
    let mut reader = match connection.try_clone() {
        Ok(reader) => reader,
        Err(err) => {
            let _ = connection.shutdown();
            let _ = events.send(closed(Some(err)));
            return;
        }
    };
    if events
        .send(LinkEvent::Connected {
            generation,
            connection,
        })
        .is_err()
    {
        let _ = reader.shutdown();
        return;
    }

    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = events.send(closed(None));
                break;
            }
            Ok(n) => {
                let data = LinkEvent::Data {
                    generation,
                    bytes: buf[..n].to_vec(),
                };
                if events.send(data).is_err() {
                    let _ = reader.shutdown();
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                let _ = events.send(closed(Some(err)));
                break;
            }
        }
    }
    debug!("router link {generation} reader finished");
}
