//! The Modbus slave: memory banks, dispatch table and request engine.

use crate::engine;
use crate::exception::Exception;
use crate::frame::Frame;
use crate::function::{default_handlers, FunctionHandler, HandlerResult};
use crate::memory::MemoryMap;
use crate::request::Request;
use crossbeam_channel::{bounded, Receiver, Sender};
use mbslave_common::config::{ServerConfig, MAX_SLAVE_ID, MIN_SLAVE_ID};
use mbslave_common::error::{SlaveError, SlaveResult};
use mbslave_common::metrics::{DispatchMetrics, DispatchStats};
use mbslave_common::state::EngineState;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Inbound queue length; producers block once it is full.
pub const REQUEST_QUEUE_CAPACITY: usize = 256;

/// Largest response payload: a 253-byte PDU less its function code.
pub const MAX_RESPONSE_DATA: usize = 252;

/// State shared between the server handle, the engine and the listeners.
pub(crate) struct Shared {
    pub(crate) slave_id: u8,
    /// Held for the whole of each handler call.
    pub(crate) memory: Mutex<MemoryMap>,
    /// Held only for lookup and registration.
    pub(crate) functions: RwLock<HashMap<u8, FunctionHandler>>,
    pub(crate) trace: Mutex<Option<Sender<String>>>,
    pub(crate) debug: AtomicBool,
    pub(crate) metrics: Mutex<DispatchMetrics>,
    pub(crate) state: RwLock<EngineState>,
    /// Set by `close`; listeners poll it.
    pub(crate) stop: AtomicBool,
}

impl Shared {
    /// Build the response for `frame`.
    ///
    /// The request frame is never mutated; the response starts as a copy so
    /// transport fields (unit id, transaction id) carry over.
    pub(crate) fn handle(&self, frame: &dyn Frame) -> Box<dyn Frame> {
        let mut response = frame.copy();

        let function = frame.function();
        let handler = self.functions.read().get(&function).cloned();

        let exception = match handler {
            None => Exception::IllegalFunction,
            Some(handler) => match self.invoke(&handler, frame) {
                Ok(data) if data.len() > MAX_RESPONSE_DATA => {
                    warn!(
                        function,
                        bytes = data.len(),
                        "Handler response exceeds the Modbus PDU limit"
                    );
                    Exception::SlaveDeviceFailure
                }
                Ok(data) => {
                    response.set_data(data);
                    Exception::Success
                }
                Err(exception) => exception,
            },
        };

        if !exception.is_success() {
            response.set_exception(exception);
        }
        response
    }

    fn invoke(&self, handler: &FunctionHandler, frame: &dyn Frame) -> HandlerResult {
        let mut memory = self.memory.lock();
        panic::catch_unwind(AssertUnwindSafe(|| handler(&mut *memory, frame))).unwrap_or_else(
            |_| {
                error!(
                    function = frame.function(),
                    "Function handler panicked; answering with slave device failure"
                );
                Err(Exception::SlaveDeviceFailure)
            },
        )
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Cloneable producer side of the inbound queue.
#[derive(Clone)]
pub(crate) struct Submitter {
    pub(crate) shared: Arc<Shared>,
    requests: Sender<Request>,
}

impl Submitter {
    pub(crate) fn submit(&self, request: Request) -> SlaveResult<()> {
        if self.shared.is_stopping() {
            return Err(SlaveError::Closed);
        }
        self.requests.send(request).map_err(|_| SlaveError::Closed)
    }
}

/// A Modbus slave answering to one unit identifier.
///
/// Building a server starts its engine thread. Requests reach it through
/// [`Server::submit`] or the transport listeners and are dispatched one at
/// a time, in arrival order, against the memory map.
pub struct Server {
    submitter: Submitter,
    shutdown: Mutex<Option<Sender<()>>>,
    engine: Mutex<Option<JoinHandle<()>>>,
    pub(crate) listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Create a slave with default-sized memory banks.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::InvalidSlaveId`] unless `slave_id` is in 1..=247,
    /// or [`SlaveError::Io`] if the engine thread cannot be spawned.
    pub fn new(slave_id: u8) -> SlaveResult<Self> {
        Self::with_memory_map(slave_id, MemoryMap::new())
    }

    /// Create a slave serving `memory`.
    ///
    /// # Errors
    ///
    /// As [`Server::new`].
    pub fn with_memory_map(slave_id: u8, memory: MemoryMap) -> SlaveResult<Self> {
        if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&slave_id) {
            return Err(SlaveError::InvalidSlaveId(slave_id));
        }

        let shared = Arc::new(Shared {
            slave_id,
            memory: Mutex::new(memory),
            functions: RwLock::new(default_handlers()),
            trace: Mutex::new(None),
            debug: AtomicBool::new(false),
            metrics: Mutex::new(DispatchMetrics::default()),
            state: RwLock::new(EngineState::Running),
            stop: AtomicBool::new(false),
        });

        let (request_tx, request_rx) = bounded(REQUEST_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let engine_shared = Arc::clone(&shared);
        let engine = thread::Builder::new()
            .name(format!("mbslave-engine-{slave_id}"))
            .spawn(move || engine::run(&engine_shared, &request_rx, &shutdown_rx))
            .map_err(|e| SlaveError::Io(format!("failed to spawn engine thread: {e}")))?;

        info!(slave_id, "Modbus slave created");

        Ok(Self {
            submitter: Submitter {
                shared,
                requests: request_tx,
            },
            shutdown: Mutex::new(Some(shutdown_tx)),
            engine: Mutex::new(Some(engine)),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Create a slave from configuration.
    ///
    /// Only the slave id and debug flag are applied here; listeners are
    /// started separately.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::Config`] if the configuration does not validate.
    pub fn from_config(config: &ServerConfig) -> SlaveResult<Self> {
        config
            .validate()
            .map_err(|e| SlaveError::Config(e.to_string()))?;
        let server = Self::new(config.slave_id)?;
        server.set_debug(config.debug);
        Ok(server)
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.submitter.shared
    }

    pub(crate) fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Unit identifier this slave answers to.
    #[must_use]
    pub fn slave_id(&self) -> u8 {
        self.shared().slave_id
    }

    /// Install or replace the handler for `function`.
    ///
    /// Takes effect for the next request with that function code; a
    /// dispatch already in progress keeps the handler it started with.
    pub fn register_function_handler<F>(&self, function: u8, handler: F)
    where
        F: Fn(&mut MemoryMap, &dyn Frame) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared()
            .functions
            .write()
            .insert(function, Arc::new(handler));
    }

    /// Remove the handler for `function`; later requests get `IllegalFunction`.
    ///
    /// Returns whether a handler was installed.
    pub fn unregister_function_handler(&self, function: u8) -> bool {
        self.shared().functions.write().remove(&function).is_some()
    }

    /// Queue a request for the engine.
    ///
    /// Blocks while the inbound queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::Closed`] once the server is closed.
    pub fn submit(&self, request: Request) -> SlaveResult<()> {
        self.submitter.submit(request)
    }

    /// Attach a trace sink and enable tracing.
    ///
    /// The engine pushes a marker line and a frame dump before and after
    /// each dispatch. Lines that do not fit in `capacity` are dropped and
    /// counted. The channel disconnects when the engine stops. A second
    /// call replaces the previous sink.
    #[must_use]
    pub fn listen_requests(&self, capacity: usize) -> Receiver<String> {
        let (tx, rx) = bounded(capacity.max(1));
        *self.shared().trace.lock() = Some(tx);
        self.set_debug(true);
        rx
    }

    /// Enable or disable tracing without touching the sink.
    pub fn set_debug(&self, debug: bool) {
        self.shared().debug.store(debug, Ordering::Release);
    }

    /// Whether tracing is enabled.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.shared().debug.load(Ordering::Acquire)
    }

    /// Read the memory map; never interleaves with a dispatch.
    pub fn with_memory<R>(&self, f: impl FnOnce(&MemoryMap) -> R) -> R {
        f(&*self.shared().memory.lock())
    }

    /// Modify the memory map; never interleaves with a dispatch.
    pub fn with_memory_mut<R>(&self, f: impl FnOnce(&mut MemoryMap) -> R) -> R {
        f(&mut *self.shared().memory.lock())
    }

    /// Snapshot of dispatch statistics.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.shared().metrics.lock().snapshot()
    }

    /// Current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.shared().state.read()
    }

    /// Stop listeners, close the inbound queue and wait for the engine.
    ///
    /// A dispatch in progress runs to completion; queued requests are
    /// dropped. Calling `close` again is a no-op.
    pub fn close(&self) {
        self.shared().stop.store(true, Ordering::Release);

        let Some(shutdown) = self.shutdown.lock().take() else {
            return;
        };
        drop(shutdown);

        let engine = self.engine.lock().take();
        if let Some(engine) = engine {
            if engine.join().is_err() {
                error!(slave_id = self.slave_id(), "Engine thread panicked");
            }
        }

        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            if listener.join().is_err() {
                error!(slave_id = self.slave_id(), "Listener thread panicked");
            }
        }

        info!(slave_id = self.slave_id(), "Modbus slave closed");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}
