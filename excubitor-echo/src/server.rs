//! TCP echo service.
//!
//! The listening socket is one [`IoSource`]; every accepted connection
//! becomes another, registered from inside the listener's callback.
//! A connection removes itself by returning `false` from its callback
//! once the peer closed and everything it sent was echoed, or on error.
//! A connection buffers at most `MAX_BUFFERED` bytes and stops reading
//! while its peer is not reading the echo.

use excubitor::{EventLoop, EventSource, EventSourceFd, Interest, IoSource, WeakEventLoop};

use std::cell::Cell;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::rc::Rc;

use tracing::{debug, info, warn};

/// A running echo service.
///
/// Dropping it unregisters the listener; established connections keep
/// being served until they close.
pub struct EchoServer {
    source: EventSource,
    event_loop: WeakEventLoop,
    local_addr: SocketAddr,
    active: Rc<Cell<usize>>,
}

impl EchoServer {
    /// Binds `addr` and registers the listener with `event_loop`.
    pub fn bind(
        event_loop: &EventLoop,
        addr: SocketAddr,
        listener_priority: i32,
        connection_priority: i32,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let source = IoSource::new(listener.as_raw_fd(), Interest::READABLE);
        source.set_priority(listener_priority);

        let active = Rc::new(Cell::new(0));
        let handle = event_loop.downgrade();
        let counter = active.clone();

        source.set_callback(
            move |fd| accept_ready(&listener, fd, &handle, connection_priority, &counter),
            None,
        );

        if !event_loop.add_source(&source) {
            return Err(io::Error::other("listener source already registered"));
        }

        Ok(Self {
            source,
            event_loop: event_loop.downgrade(),
            local_addr,
            active,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections not yet released.
    pub fn connections(&self) -> usize {
        self.active.get()
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Some(event_loop) = self.event_loop.upgrade() {
            event_loop.del_source(&self.source);
        }
    }
}

/// Accepts every pending connection.
fn accept_ready(
    listener: &TcpListener,
    fd: &EventSourceFd,
    event_loop: &WeakEventLoop,
    priority: i32,
    active: &Rc<Cell<usize>>,
) -> bool {
    if fd.ready().is_error() {
        warn!(fd = fd.raw_fd(), "listener socket error");
        return false;
    }

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let Some(event_loop) = event_loop.upgrade() else {
                    return false;
                };
                if let Err(e) = serve(&event_loop, stream, peer, priority, active) {
                    warn!(%peer, error = %e, "failed to serve connection");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    warn!(error = %e, "accept failed");
                }
                fd.clear_ready(Interest::READABLE);
                return true;
            }
        }
    }
}

/// Registers a source echoing everything `stream` sends.
fn serve(
    event_loop: &EventLoop,
    stream: TcpStream,
    peer: SocketAddr,
    priority: i32,
    active: &Rc<Cell<usize>>,
) -> io::Result<()> {
    stream.set_nonblocking(true)?;

    let source = IoSource::new(stream.as_raw_fd(), Interest::READABLE | Interest::WRITABLE);
    source.set_priority(priority);

    let mut connection = Connection::new(stream);

    active.set(active.get() + 1);
    let released = active.clone();

    source.set_callback(
        move |fd| connection.on_ready(fd),
        Some(Box::new(move || {
            released.set(released.get() - 1);
            debug!(%peer, "connection released");
        })),
    );

    event_loop.add_source(&source);
    info!(%peer, "connection accepted");

    Ok(())
}

struct Connection {
    stream: TcpStream,

    /// Bytes read but not echoed yet, at most `MAX_BUFFERED`.
    out: Vec<u8>,

    /// Whether the socket accepted the last write without blocking.
    writable: bool,

    /// Whether the socket may hold unread bytes.
    readable: bool,

    /// Set once the peer shut down its writing half.
    read_closed: bool,
}

/// Reading pauses while this many bytes wait to be echoed.
const MAX_BUFFERED: usize = 64 * 1024;

/// Why a read pass stopped.
enum Fill {
    Drained,
    Full,
    Eof,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            out: Vec::new(),
            writable: false,
            readable: false,
            read_closed: false,
        }
    }

    /// Returns `false` once the connection should be closed.
    ///
    /// Both readiness edges are recorded on the connection and cleared
    /// from `fd`, so a connection waiting on its peer leaves the pending
    /// queue. After EOF the connection stays registered until every
    /// buffered byte is echoed.
    fn on_ready(&mut self, fd: &EventSourceFd) -> bool {
        let ready = fd.ready();

        if ready.is_error() || (ready.contains(Interest::HANGUP) && !ready.is_readable()) {
            return false;
        }

        if ready.is_writable() {
            self.writable = true;
        }
        if ready.is_readable() {
            self.readable = true;
        }
        fd.clear_ready(Interest::READABLE | Interest::WRITABLE);

        if let Err(e) = self.pump() {
            debug!(error = %e, "connection failed");
            return false;
        }

        !(self.read_closed && self.out.is_empty())
    }

    /// Echoes until the peer has nothing to send or cannot take more.
    fn pump(&mut self) -> io::Result<()> {
        loop {
            if self.readable && !self.read_closed && self.out.len() < MAX_BUFFERED {
                match self.fill()? {
                    Fill::Drained => self.readable = false,
                    Fill::Eof => {
                        self.readable = false;
                        self.read_closed = true;
                    }
                    Fill::Full => {}
                }
            }

            self.flush()?;

            // Read again only if writing made room for unread bytes.
            if !(self.readable && !self.read_closed && self.out.len() < MAX_BUFFERED) {
                return Ok(());
            }
        }
    }

    /// Reads until the socket would block, EOF, or the buffer is full.
    fn fill(&mut self) -> io::Result<Fill> {
        let mut buf = [0u8; 4096];

        while self.out.len() < MAX_BUFFERED {
            let room = (MAX_BUFFERED - self.out.len()).min(buf.len());

            match self.stream.read(&mut buf[..room]) {
                Ok(0) => return Ok(Fill::Eof),
                Ok(n) => self.out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Fill::Drained),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(Fill::Full)
    }

    /// Writes buffered bytes while the socket accepts them.
    fn flush(&mut self) -> io::Result<()> {
        while self.writable && !self.out.is_empty() {
            match self.stream.write(&self.out) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.out.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.writable = false,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
