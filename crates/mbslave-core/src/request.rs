//! Inbound requests and the connections responses are written back to.

use crate::frame::Frame;
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::SystemTime;

/// Write half of whatever delivered a request.
///
/// The engine writes exactly one response per request through it and does
/// not keep it afterwards.
pub trait Connection: Send + Sync {
    /// Write one encoded response frame.
    ///
    /// # Errors
    ///
    /// Any I/O error from the underlying transport.
    fn write_response(&self, bytes: &[u8]) -> io::Result<()>;

    /// Peer description for logs.
    fn peer(&self) -> String;
}

impl Connection for TcpStream {
    fn write_response(&self, bytes: &[u8]) -> io::Result<()> {
        let mut stream = self;
        stream.write_all(bytes)
    }

    fn peer(&self) -> String {
        self.peer_addr()
            .map_or_else(|_| String::from("<disconnected>"), |addr| addr.to_string())
    }
}

/// A byte sink (serial port, pipe) shared behind a lock.
pub struct StreamConnection<W> {
    writer: Mutex<W>,
    name: String,
}

impl<W: Write + Send> StreamConnection<W> {
    /// Wrap `writer`, naming it `name` in logs.
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            name: name.into(),
        }
    }
}

impl<W: Write + Send> Connection for StreamConnection<W> {
    fn write_response(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(bytes)?;
        writer.flush()
    }

    fn peer(&self) -> String {
        self.name.clone()
    }
}

/// One decoded frame waiting for the engine.
pub struct Request {
    connection: Arc<dyn Connection>,
    frame: Box<dyn Frame>,
    timestamp: SystemTime,
}

impl Request {
    /// Request received now.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>, frame: Box<dyn Frame>) -> Self {
        Self::with_timestamp(connection, frame, SystemTime::now())
    }

    /// Request received at `timestamp`.
    #[must_use]
    pub fn with_timestamp(
        connection: Arc<dyn Connection>,
        frame: Box<dyn Frame>,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            connection,
            frame,
            timestamp,
        }
    }

    /// The decoded request frame.
    #[must_use]
    pub fn frame(&self) -> &dyn Frame {
        self.frame.as_ref()
    }

    /// Capture time.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Where the response goes.
    #[must_use]
    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("peer", &self.connection.peer())
            .field("frame", &self.frame)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
