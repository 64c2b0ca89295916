//! Transport listeners feeding the request engine.
//!
//! Each listener runs on its own threads, decodes frames from its byte
//! stream and submits them; responses flow back through the
//! [`Connection`] carried by each request.

use crate::frame::Frame;
use crate::request::{Connection, Request, StreamConnection};
use crate::rtu::{request_len, RtuFrame};
use crate::server::{Server, Submitter};
use crate::tcp::{split_frame, TcpFrame};
use mbslave_common::config::TcpConfig;
use mbslave_common::error::{SlaveError, SlaveResult};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Accept loop poll interval.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Read chunk size; larger than any single Modbus frame.
const READ_CHUNK: usize = 512;

impl Server {
    /// Serve Modbus TCP on `config.address`.
    ///
    /// Returns the bound address (useful with port 0). Connections are
    /// served until the server closes.
    ///
    /// # Errors
    ///
    /// [`SlaveError::Closed`] after close, [`SlaveError::Io`] if the address
    /// cannot be bound or the accept thread cannot be spawned.
    pub fn listen_tcp(&self, config: &TcpConfig) -> SlaveResult<SocketAddr> {
        if self.shared().is_stopping() {
            return Err(SlaveError::Closed);
        }

        let listener = TcpListener::bind(&config.address)
            .map_err(|e| SlaveError::Io(format!("failed to bind {}: {e}", config.address)))?;
        let local = listener
            .local_addr()
            .map_err(|e| SlaveError::Io(format!("failed to read local address: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| SlaveError::Io(format!("failed to set nonblocking: {e}")))?;

        let submitter = self.submitter();
        let read_timeout = config.read_timeout;
        let handle = thread::Builder::new()
            .name(format!("mbslave-tcp-{}", local.port()))
            .spawn(move || accept_loop(&listener, &submitter, read_timeout))
            .map_err(|e| SlaveError::Io(format!("failed to spawn TCP accept thread: {e}")))?;
        self.listeners.lock().push(handle);

        info!(address = %local, "Modbus TCP listener started");
        Ok(local)
    }

    /// Serve Modbus RTU over a byte stream split into read and write halves.
    ///
    /// `reader` must time out (`TimedOut` or `WouldBlock`) after the
    /// inter-frame silence; a timeout with buffered bytes ends a frame whose
    /// length is not implied by its function code. Frames with a bad CRC
    /// and frames for other unit ids are discarded.
    ///
    /// # Errors
    ///
    /// [`SlaveError::Closed`] after close, [`SlaveError::Io`] if the reader
    /// thread cannot be spawned.
    pub fn listen_rtu<R, W>(&self, reader: R, writer: W, name: &str) -> SlaveResult<()>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        if self.shared().is_stopping() {
            return Err(SlaveError::Closed);
        }

        let connection: Arc<dyn Connection> = Arc::new(StreamConnection::new(writer, name));
        let submitter = self.submitter();
        let handle = thread::Builder::new()
            .name(format!("mbslave-rtu-{name}"))
            .spawn(move || rtu_loop(reader, &connection, &submitter))
            .map_err(|e| SlaveError::Io(format!("failed to spawn RTU thread: {e}")))?;
        self.listeners.lock().push(handle);

        info!(line = name, "Modbus RTU listener started");
        Ok(())
    }
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn accept_loop(listener: &TcpListener, submitter: &Submitter, read_timeout: Duration) {
    let mut connections = Vec::new();

    while !submitter.shared.is_stopping() {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!(%peer, "Modbus TCP connection accepted");
                let submitter = submitter.clone();
                let spawned = thread::Builder::new()
                    .name(format!("mbslave-tcp-conn-{peer}"))
                    .spawn(move || serve_tcp_connection(stream, peer, &submitter, read_timeout));
                match spawned {
                    Ok(handle) => connections.push(handle),
                    Err(e) => warn!(%peer, error = %e, "Failed to spawn connection thread"),
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!(error = %e, "Accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
        connections.retain(|handle: &thread::JoinHandle<()>| !handle.is_finished());
    }

    for handle in connections {
        let _ = handle.join();
    }
    debug!("Modbus TCP accept loop stopped");
}

fn serve_tcp_connection(
    stream: TcpStream,
    peer: SocketAddr,
    submitter: &Submitter,
    read_timeout: Duration,
) {
    let setup = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(read_timeout)))
        .and_then(|()| stream.set_nodelay(true))
        .and_then(|()| stream.try_clone());
    let writer = match setup {
        Ok(writer) => writer,
        Err(e) => {
            warn!(%peer, error = %e, "Failed to configure connection");
            return;
        }
    };
    let connection: Arc<dyn Connection> = Arc::new(writer);

    let mut reader = stream;
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    while !submitter.shared.is_stopping() {
        match reader.read(&mut chunk) {
            Ok(0) => {
                info!(%peer, "Modbus TCP connection closed by peer");
                return;
            }
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                loop {
                    match split_frame(&buf) {
                        Ok(Some(len)) => {
                            let packet: Vec<u8> = buf.drain(..len).collect();
                            if !deliver_tcp(&packet, &connection, submitter) {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(%peer, error = %e, "Dropping connection after bad MBAP header");
                            return;
                        }
                    }
                }
            }
            Err(e) if is_timeout(e.kind()) || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                debug!(%peer, error = %e, "Modbus TCP connection read failed");
                return;
            }
        }
    }
}

/// Decode and submit one MBAP frame; `false` once the server is closed.
fn deliver_tcp(packet: &[u8], connection: &Arc<dyn Connection>, submitter: &Submitter) -> bool {
    match TcpFrame::decode(packet) {
        Ok(frame) => submit(Box::new(frame), connection, submitter),
        Err(e) => {
            warn!(error = %e, "Discarding undecodable TCP frame");
            true
        }
    }
}

fn rtu_loop<R: Read>(mut reader: R, connection: &Arc<dyn Connection>, submitter: &Submitter) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    while !submitter.shared.is_stopping() {
        match reader.read(&mut chunk) {
            Ok(0) => {
                if !buf.is_empty() {
                    deliver_rtu(&buf, connection, submitter);
                }
                info!(line = %connection.peer(), "Modbus RTU stream ended");
                return;
            }
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                while let Some(len) = request_len(&buf).filter(|&len| buf.len() >= len) {
                    let packet: Vec<u8> = buf.drain(..len).collect();
                    if !deliver_rtu(&packet, connection, submitter) {
                        return;
                    }
                }
                if buf.len() > RtuFrame::MAX_REQUEST_SIZE {
                    warn!(bytes = buf.len(), "Discarding oversized RTU input");
                    buf.clear();
                }
            }
            Err(e) if is_timeout(e.kind()) => {
                if !buf.is_empty() {
                    let packet = std::mem::take(&mut buf);
                    if !deliver_rtu(&packet, connection, submitter) {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(line = %connection.peer(), error = %e, "Modbus RTU read failed");
                return;
            }
        }
    }
}

/// Decode, filter by unit id and submit one RTU frame; `false` once closed.
fn deliver_rtu(packet: &[u8], connection: &Arc<dyn Connection>, submitter: &Submitter) -> bool {
    let frame = match RtuFrame::decode(packet) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Discarding RTU frame");
            return true;
        }
    };

    if frame.address() != submitter.shared.slave_id {
        debug!(
            unit = frame.address(),
            slave_id = submitter.shared.slave_id,
            "Ignoring RTU frame for another unit"
        );
        return true;
    }

    submit(Box::new(frame), connection, submitter)
}

fn submit(frame: Box<dyn Frame>, connection: &Arc<dyn Connection>, submitter: &Submitter) -> bool {
    submitter
        .submit(Request::new(Arc::clone(connection), frame))
        .is_ok()
}
