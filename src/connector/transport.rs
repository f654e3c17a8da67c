//! Socket primitives for the Router connection.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    path::Path,
    time::Duration,
};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::config::RouterAddress;

/// Open socket to the Router.
#[derive(Debug)]
pub enum ActiveConnection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ActiveConnection {
    /// Second handle onto the same socket, used by the reader thread.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            ActiveConnection::Tcp(stream) => stream.try_clone().map(ActiveConnection::Tcp),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.try_clone().map(ActiveConnection::Unix),
        }
    }

    pub fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            ActiveConnection::Tcp(stream) => stream.set_write_timeout(Some(timeout)),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.set_write_timeout(Some(timeout)),
        }
    }

    /// Close both directions, waking any thread blocked in `read`.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            ActiveConnection::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

impl Read for ActiveConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ActiveConnection::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ActiveConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ActiveConnection::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.flush(),
        }
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {host}:{port}"),
        )
    }))
}

#[cfg(unix)]
fn connect_unix(path: &Path) -> io::Result<ActiveConnection> {
    UnixStream::connect(path).map(ActiveConnection::Unix)
}

#[cfg(not(unix))]
fn connect_unix(_path: &Path) -> io::Result<ActiveConnection> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix domain sockets are not supported on this platform",
    ))
}

/// Establish a blocking connection to the Router.
pub fn connect(address: &RouterAddress, timeout: Duration) -> io::Result<ActiveConnection> {
    match address {
        RouterAddress::Tcp { host, port } => {
            connect_tcp(host, *port, timeout).map(ActiveConnection::Tcp)
        }
        RouterAddress::Unix { path } => connect_unix(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::net::TcpListener;

    #[rstest]
    fn connects_over_tcp_and_shuts_down() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
        let port = listener.local_addr().expect("listener has address").port();
        let address = RouterAddress::Tcp {
            host: "127.0.0.1".into(),
            port,
        };
        let mut conn = connect(&address, Duration::from_secs(1)).expect("connect");
        let (mut server, _) = listener.accept().expect("accept connection");

        conn.write_all(b"ping").expect("write");
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"ping");

        let mut reader = conn.try_clone().expect("clone");
        conn.shutdown().expect("shutdown");
        let read = reader.read(&mut buf).expect("read after shutdown");
        assert_eq!(read, 0);
    }

    #[rstest]
    fn refused_connection_is_an_error() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
        let port = listener.local_addr().expect("listener has address").port();
        drop(listener);
        let address = RouterAddress::Tcp {
            host: "127.0.0.1".into(),
            port,
        };
        assert!(connect(&address, Duration::from_millis(500)).is_err());
    }

    #[cfg(unix)]
    #[rstest]
    fn connects_over_unix_socket() {
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("router.sock");
        let listener = UnixListener::bind(&path).expect("bind unix listener");
        let mut conn = connect(&RouterAddress::Unix { path }, Duration::from_secs(1))
            .expect("connect");
        let (mut server, _) = listener.accept().expect("accept");
        conn.write_all(b"hi").expect("write");
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"hi");
    }
}
