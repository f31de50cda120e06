//! Event loop serving the decision protocol.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Buf, BytesMut};
use faultline_orchestrator::DecisionService;
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::http::{http_response, parse_request};

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
const FIRST_CONNECTION_TOKEN: usize = 2;

/// Stops a running [`DecisionServer`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake server for shutdown");
        }
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("requested", &self.requested.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Per-connection buffers. One request, one response, then close.
struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::new(),
        }
    }

    /// Returns `true` if the peer has not closed its side.
    fn read(&mut self) -> io::Result<bool> {
        let mut temp_buf = [0u8; 4096];
        loop {
            match self.stream.read(&mut temp_buf) {
                Ok(0) => return Ok(false),
                Ok(n) => self.read_buf.extend_from_slice(&temp_buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Returns `true` once the whole response is written.
    fn write(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    ));
                }
                Ok(n) => self.write_buf.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

/// Serves a [`DecisionService`] over HTTP/1.1 on a single thread.
pub struct DecisionServer {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
    handler: RequestHandler,
}

impl DecisionServer {
    /// Binds `addr`. Port 0 picks a free port; see [`local_addr`](Self::local_addr).
    pub fn bind(addr: SocketAddr, service: Arc<dyn DecisionService>) -> ServerResult<Self> {
        let poll = Poll::new()?;
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "decision service listening");

        Ok(Self {
            poll,
            listener,
            local_addr,
            waker,
            shutdown: Arc::new(AtomicBool::new(false)),
            handler: RequestHandler::new(service),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            waker: Arc::clone(&self.waker),
            requested: Arc::clone(&self.shutdown),
        }
    }

    /// Runs until a [`ShutdownHandle`] fires.
    pub fn run(mut self) -> ServerResult<()> {
        let mut events = Events::with_capacity(128);
        let mut connections: HashMap<Token, Connection> = HashMap::new();
        let mut next_token = FIRST_CONNECTION_TOKEN;

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in &events {
                match event.token() {
                    LISTENER_TOKEN => self.accept(&mut connections, &mut next_token)?,
                    WAKER_TOKEN => {
                        if self.shutdown.load(Ordering::SeqCst) {
                            info!(open = connections.len(), "decision service shutting down");
                            return Ok(());
                        }
                    }
                    token => {
                        let Some(conn) = connections.get_mut(&token) else {
                            continue;
                        };
                        if self.drive(token, conn, event) {
                            if let Some(mut conn) = connections.remove(&token) {
                                let _ = self.poll.registry().deregister(&mut conn.stream);
                            }
                        }
                    }
                }
            }
        }
    }

    fn accept(
        &self,
        connections: &mut HashMap<Token, Connection>,
        next_token: &mut usize,
    ) -> ServerResult<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(*next_token);
                    *next_token += 1;
                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)?;
                    debug!(%addr, ?token, "connection accepted");
                    connections.insert(token, Connection::new(stream));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return Ok(());
                }
            }
        }
    }

    /// Advances one connection. Returns `true` when it should be closed.
    fn drive(&self, token: Token, conn: &mut Connection, event: &Event) -> bool {
        if event.is_readable() && conn.write_buf.is_empty() {
            let open = match conn.read() {
                Ok(open) => open,
                Err(e) => {
                    debug!(?token, error = %e, "read failed");
                    return true;
                }
            };

            let response = match parse_request(&conn.read_buf) {
                Ok(Some(request)) => {
                    debug!(?token, method = %request.method, path = %request.path, "request");
                    self.handler.handle(&request)
                }
                Ok(None) if open => return false,
                Ok(None) => {
                    debug!(?token, "peer closed mid-request");
                    return true;
                }
                Err(e) => http_response(
                    e.status(),
                    "application/json",
                    &serde_json::json!({ "error": e.to_string() }).to_string(),
                ),
            };
            conn.read_buf.clear();
            conn.write_buf.extend_from_slice(response.as_bytes());
        }

        if conn.write_buf.is_empty() {
            return false;
        }
        match conn.write() {
            Ok(true) => true,
            Ok(false) => {
                if let Err(e) = self.poll.registry().reregister(
                    &mut conn.stream,
                    token,
                    Interest::READABLE | Interest::WRITABLE,
                ) {
                    debug!(?token, error = %e, "reregister failed");
                    return true;
                }
                false
            }
            Err(e) => {
                debug!(?token, error = %e, "write failed");
                true
            }
        }
    }
}

impl std::fmt::Debug for DecisionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}
