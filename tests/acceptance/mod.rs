//! Whole-system tests for the Modbus slave.

mod common;
mod config_test;
mod latency_test;
mod soak_test;
