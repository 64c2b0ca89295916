//! The single request worker.
//!
//! Exactly one engine thread exists per server. It is the only caller of
//! `Shared::handle`, so at most one dispatch runs at any instant and
//! requests are answered in queue order.

use crate::frame::get_exception;
use crate::request::Request;
use crate::server::Shared;
use crate::trace::{frame_to_string, REQUEST_MARKER, RESPONSE_MARKER};
use crossbeam_channel::{select, Receiver, TrySendError};
use mbslave_common::state::EngineState;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, info, trace, warn};

/// Drain `requests` until `shutdown` disconnects.
pub(crate) fn run(shared: &Arc<Shared>, requests: &Receiver<Request>, shutdown: &Receiver<()>) {
    info!(slave_id = shared.slave_id, "Request engine started");

    loop {
        select! {
            recv(requests) -> msg => match msg {
                Ok(request) => process(shared, &request),
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }

    // Closing the trace sink: its receiver sees a disconnect.
    shared.trace.lock().take();

    if let Err(e) = shared.state.write().transition_to(EngineState::Closed) {
        warn!(error = %e, "Unexpected engine state on exit");
    }

    info!(
        slave_id = shared.slave_id,
        total_requests = shared.metrics.lock().total_requests(),
        "Request engine stopped"
    );
}

fn process(shared: &Shared, request: &Request) {
    let tracing = shared.debug.load(Ordering::Acquire);

    if tracing {
        emit(
            shared,
            REQUEST_MARKER,
            frame_to_string(request.frame(), request.timestamp()),
        );
    }

    let started = Instant::now();
    let response = shared.handle(request.frame());
    let elapsed = started.elapsed();

    let exception = get_exception(response.as_ref());
    shared
        .metrics
        .lock()
        .record(elapsed, (!exception.is_success()).then_some(exception.code()));

    trace!(
        function = request.frame().function(),
        address = request.frame().address(),
        exception = %exception,
        elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        "Dispatched request"
    );

    if tracing {
        emit(
            shared,
            RESPONSE_MARKER,
            frame_to_string(response.as_ref(), SystemTime::now()),
        );
    }

    if let Err(e) = request.connection().write_response(&response.bytes()) {
        warn!(
            peer = %request.connection().peer(),
            error = %e,
            "Failed to write response"
        );
        shared.metrics.lock().record_write_failure();
    }
}

/// Push a marker and a dump without blocking the engine.
fn emit(shared: &Shared, marker: &str, dump: String) {
    let mut sink = shared.trace.lock();
    let Some(tx) = sink.as_ref() else {
        return;
    };

    for line in [marker.to_owned(), dump] {
        match tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Trace sink full; dropping line");
                shared.metrics.lock().record_dropped_trace();
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Trace sink receiver dropped; detaching");
                *sink = None;
                return;
            }
        }
    }
}
