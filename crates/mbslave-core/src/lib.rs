//! Modbus slave protocol engine.
//!
//! This crate provides:
//! - [`Frame`] trait with [`rtu::RtuFrame`] and [`tcp::TcpFrame`] encodings
//! - [`accessors`] for reading and building request/response payloads
//! - [`function`] with the dispatch table types and standard handlers
//! - [`Server`], which owns the memory banks and serializes every request
//!   through a single engine thread
//! - TCP and RTU listeners, and a bounded trace sink for frame dumps

pub mod accessors;
pub mod crc;
mod engine;
pub mod exception;
pub mod frame;
pub mod function;
mod listener;
pub mod memory;
pub mod request;
pub mod rtu;
pub mod server;
pub mod tcp;
pub mod trace;

pub use exception::Exception;
pub use frame::{get_exception, Frame};
pub use function::{FunctionCode, FunctionHandler, HandlerResult};
pub use memory::MemoryMap;
pub use request::{Connection, Request, StreamConnection};
pub use rtu::RtuFrame;
pub use server::Server;
pub use tcp::TcpFrame;
