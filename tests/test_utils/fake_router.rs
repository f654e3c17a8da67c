//! In-process stand-in for the UstRouter.
//!
//! The fake accepts one connection at a time, runs the server half of the
//! handshake, and reports everything the client sends over a channel so
//! tests can assert on ordering without sleeping.

use std::{
    io::{self, Read, Write},
    net::TcpListener,
    thread,
    time::Duration,
};

#[cfg(unix)]
use std::{os::unix::net::UnixListener, path::Path};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Something the client did, in the order the Router observed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Seen {
    Connected,
    Credentials { user: String, password: String },
    Init { node_name: String },
    Open(Vec<String>),
    Line(Vec<u8>),
    Close(Vec<String>),
    Disconnected,
}

/// Behaviour knobs for the fake.
#[derive(Clone, Debug)]
pub struct RouterScript {
    pub accept_credentials: bool,
    /// Number of `openTransaction` commands to leave unanswered.
    pub ignore_opens: usize,
    /// Id handed out when the client opens a transaction without one.
    pub assigned_id: String,
}

impl Default for RouterScript {
    fn default() -> Self {
        Self {
            accept_credentials: true,
            ignore_opens: 0,
            assigned_id: "router-assigned".into(),
        }
    }
}

/// Handle to a running fake Router.
pub struct FakeRouter {
    pub address: String,
    pub seen: Receiver<Seen>,
}

impl FakeRouter {
    pub fn tcp(script: RouterScript) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind fake router");
        let port = listener.local_addr().expect("listener address").port();
        let (tx, rx) = unbounded();
        thread::spawn(move || {
            let mut script = script;
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                serve(stream, &mut script, &tx);
            }
        });
        Self {
            address: format!("127.0.0.1:{port}"),
            seen: rx,
        }
    }

    #[cfg(unix)]
    pub fn unix(path: &Path, script: RouterScript) -> Self {
        let listener = UnixListener::bind(path).expect("bind fake router socket");
        let (tx, rx) = unbounded();
        thread::spawn(move || {
            let mut script = script;
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                serve(stream, &mut script, &tx);
            }
        });
        Self {
            address: format!("unix:{}", path.display()),
            seen: rx,
        }
    }

    /// Collect observations until `done` returns true or `timeout` passes
    /// without a new one.
    pub fn collect_until(&self, timeout: Duration, done: impl Fn(&[Seen]) -> bool) -> Vec<Seen> {
        let mut seen = Vec::new();
        while !done(&seen) {
            match self.seen.recv_timeout(timeout) {
                Ok(event) => seen.push(event),
                Err(_) => break,
            }
        }
        seen
    }
}

fn serve<S: Read + Write>(mut stream: S, script: &mut RouterScript, seen: &Sender<Seen>) {
    let _ = seen.send(Seen::Connected);
    let _ = converse(&mut stream, script, seen);
    let _ = seen.send(Seen::Disconnected);
}

fn converse<S: Read + Write>(
    stream: &mut S,
    script: &mut RouterScript,
    seen: &Sender<Seen>,
) -> io::Result<()> {
    write_short(stream, &["version", "1"])?;
    let user = String::from_utf8_lossy(&read_long(stream)?).into_owned();
    let password = String::from_utf8_lossy(&read_long(stream)?).into_owned();
    let _ = seen.send(Seen::Credentials { user, password });
    if !script.accept_credentials {
        write_short(stream, &["status", "error", "invalid credentials"])?;
        // Keep reading so a stray `init` would still be observed.
        return drain_commands(stream, seen);
    }
    write_short(stream, &["status", "ok"])?;

    let init = read_short(stream)?;
    let _ = seen.send(Seen::Init {
        node_name: init.get(1).cloned().unwrap_or_default(),
    });
    write_short(stream, &["status", "ok"])?;

    loop {
        let command = read_short(stream)?;
        match command[0].as_str() {
            "openTransaction" => {
                let anonymous = command[1].is_empty();
                let _ = seen.send(Seen::Open(command));
                if script.ignore_opens > 0 {
                    script.ignore_opens -= 1;
                    continue;
                }
                if anonymous {
                    write_short(stream, &["status", "ok", script.assigned_id.as_str()])?;
                } else {
                    write_short(stream, &["status", "ok"])?;
                }
            }
            "log" => {
                let line = read_long(stream)?;
                let _ = seen.send(Seen::Line(line));
            }
            "closeTransaction" => {
                let _ = seen.send(Seen::Close(command));
                write_short(stream, &["status", "ok"])?;
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected command {other}"),
                ));
            }
        }
    }
}

fn drain_commands<S: Read + Write>(stream: &mut S, seen: &Sender<Seen>) -> io::Result<()> {
    loop {
        let command = read_short(stream)?;
        if command[0] == "init" {
            let _ = seen.send(Seen::Init {
                node_name: command.get(1).cloned().unwrap_or_default(),
            });
        }
    }
}

pub fn read_short<R: Read>(reader: &mut R) -> io::Result<Vec<String>> {
    let mut len = [0u8; 2];
    reader.read_exact(&mut len)?;
    let mut payload = vec![0u8; usize::from(u16::from_be_bytes(len))];
    reader.read_exact(&mut payload)?;
    Ok(payload
        .split(|b| *b == 0)
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect())
}

pub fn read_long<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_short<W: Write>(writer: &mut W, fields: &[&str]) -> io::Result<()> {
    let payload = fields.join("\0");
    let len = u16::try_from(payload.len()).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload.as_bytes())?;
    writer.flush()
}
