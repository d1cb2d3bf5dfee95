//! Lifecycle of a single TCP exchange.
//!
//! A [`Session`] walks `Pending → Connected → Receiving → Closed` on the happy
//! path and lands in `Failed` on any error. The connection it owns is
//! released by [`Session::close`], or by dropping the session when the
//! surrounding future is cancelled.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::core::endpoint::Endpoint;
use crate::core::error::RequestError;
use crate::metrics;

/// The only request this client ever sends.
pub const REQUEST_LINE: &[u8] = b"GET / HTTP/1.0\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Connected,
    Receiving,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Pending => "pending",
            SessionState::Connected => "connected",
            SessionState::Receiving => "receiving",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counts connections that are currently held open. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct ConnectionGauge {
    open: Arc<AtomicUsize>,
}

impl ConnectionGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    fn lease(&self) -> ConnectionLease {
        self.open.fetch_add(1, Ordering::AcqRel);
        ConnectionLease {
            open: Arc::clone(&self.open),
        }
    }
}

/// RAII token that decrements its gauge when the connection goes away.
#[derive(Debug)]
struct ConnectionLease {
    open: Arc<AtomicUsize>,
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    _lease: ConnectionLease,
}

#[derive(Debug)]
pub struct Session {
    endpoint: Endpoint,
    conn: Option<Connection>,
    payload: BytesMut,
    state: SessionState,
    read_buffer_size: usize,
    nodelay: bool,
    connect_timeout: Option<Duration>,
    gauge: ConnectionGauge,
}

impl Session {
    pub fn new(endpoint: Endpoint, config: &ClientConfig, gauge: ConnectionGauge) -> Self {
        Self {
            endpoint,
            conn: None,
            payload: BytesMut::new(),
            state: SessionState::Pending,
            read_buffer_size: config.read_buffer_size.max(1),
            nodelay: config.nodelay,
            connect_timeout: config.connect_timeout,
            gauge,
        }
    }

    /// Runs `open → send → receive_until_closed` and closes the session on
    /// every path before returning.
    pub async fn fetch(
        endpoint: Endpoint,
        request: &[u8],
        config: &ClientConfig,
        gauge: ConnectionGauge,
    ) -> Result<Bytes, RequestError> {
        let mut session = Session::new(endpoint, config, gauge);
        let result = session.exchange(request).await;
        session.close();
        result
    }

    async fn exchange(&mut self, request: &[u8]) -> Result<Bytes, RequestError> {
        self.open().await?;
        self.send(request).await?;
        self.receive_until_closed().await
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session still holds its connection.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Bytes accumulated so far. Empty once the payload has been handed out.
    pub fn received(&self) -> &[u8] {
        &self.payload
    }

    pub async fn open(&mut self) -> Result<(), RequestError> {
        self.expect(SessionState::Pending, "open")?;

        let connect = TcpStream::connect((self.endpoint.host(), self.endpoint.port()));
        let result = match self.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connect).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {limit:?}"),
                )),
            },
            None => connect.await,
        };

        let stream = match result {
            Ok(stream) => stream,
            Err(source) => {
                metrics::inc_connect_failures();
                let err = RequestError::Connect {
                    endpoint: self.endpoint.clone(),
                    source,
                };
                return Err(self.fail(err));
            }
        };

        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(endpoint = %self.endpoint, "set_nodelay failed: {}", e);
            }
        }

        self.conn = Some(Connection {
            stream,
            _lease: self.gauge.lease(),
        });
        self.state = SessionState::Connected;
        metrics::inc_sessions_opened();
        debug!(endpoint = %self.endpoint, "connected");
        Ok(())
    }

    pub async fn send(&mut self, request: &[u8]) -> Result<(), RequestError> {
        self.expect(SessionState::Connected, "send")?;
        let Some(conn) = self.conn.as_mut() else {
            return Err(self.invalid("send"));
        };

        let result = async {
            conn.stream.write_all(request).await?;
            conn.stream.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                trace!(endpoint = %self.endpoint, bytes = request.len(), "request sent");
                Ok(())
            }
            Err(source) => {
                let err = RequestError::Write {
                    endpoint: self.endpoint.clone(),
                    source,
                };
                Err(self.fail(err))
            }
        }
    }

    /// Reads until the peer closes its write side and hands out everything
    /// received. On a read error the bytes gathered so far travel inside
    /// [`RequestError::Read`].
    pub async fn receive_until_closed(&mut self) -> Result<Bytes, RequestError> {
        self.expect(SessionState::Connected, "receive")?;
        self.state = SessionState::Receiving;

        loop {
            let Some(conn) = self.conn.as_mut() else {
                return Err(self.invalid("receive"));
            };

            // read_buf returns 0 on a full buffer too, so keep spare room.
            self.payload.reserve(self.read_buffer_size);

            match conn.stream.read_buf(&mut self.payload).await {
                Ok(0) => {
                    self.state = SessionState::Closed;
                    metrics::inc_sessions_closed();
                    debug!(
                        endpoint = %self.endpoint,
                        bytes = self.payload.len(),
                        "peer closed connection"
                    );
                    return Ok(self.payload.split().freeze());
                }
                Ok(n) => {
                    metrics::inc_bytes_received(n as u64);
                    trace!(endpoint = %self.endpoint, bytes = n, total = self.payload.len(), "received");
                }
                Err(source) => {
                    let partial = self.payload.split().freeze();
                    let err = RequestError::Read {
                        endpoint: self.endpoint.clone(),
                        partial,
                        source,
                    };
                    return Err(self.fail(err));
                }
            }
        }
    }

    /// Releases the connection. Safe to call repeatedly; closing a session
    /// that has not finished aborts it.
    pub fn close(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
            metrics::inc_sessions_failed();
            debug!(endpoint = %self.endpoint, "session aborted");
        }

        if let Some(conn) = self.conn.take() {
            drop(conn);
            trace!(endpoint = %self.endpoint, state = %self.state, "connection released");
        }
    }

    fn expect(&self, state: SessionState, op: &'static str) -> Result<(), RequestError> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.invalid(op))
        }
    }

    fn invalid(&self, op: &'static str) -> RequestError {
        RequestError::InvalidState {
            endpoint: self.endpoint.clone(),
            state: self.state,
            op,
        }
    }

    fn fail(&mut self, err: RequestError) -> RequestError {
        self.state = SessionState::Failed;
        metrics::inc_sessions_failed();
        debug!(endpoint = %self.endpoint, "session failed: {}", err);
        err
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.is_some() || !self.state.is_terminal() {
            trace!(endpoint = %self.endpoint, state = %self.state, "session dropped before finishing");
            self.close();
        }
    }
}
