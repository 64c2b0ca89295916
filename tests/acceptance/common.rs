//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Starting a slave on an ephemeral loopback port
//! - A blocking Modbus TCP master
//! - Collecting round-trip timing statistics

#![allow(dead_code)]

use mbslave_common::config::TcpConfig;
use mbslave_core::Server;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Socket read timeout for masters.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a slave with a TCP listener on 127.0.0.1 and an ephemeral port.
pub fn start_tcp_slave(slave_id: u8) -> (Server, SocketAddr) {
    let server = Server::new(slave_id).expect("valid slave id");
    let addr = server
        .listen_tcp(&TcpConfig {
            address: "127.0.0.1:0".into(),
            read_timeout: Duration::from_millis(20),
        })
        .expect("bind loopback listener");
    (server, addr)
}

/// Blocking Modbus TCP master.
pub struct Master {
    stream: TcpStream,
    unit_id: u8,
    transaction_id: u16,
}

impl Master {
    /// Connect to `addr`, addressing `unit_id`.
    pub fn connect(addr: SocketAddr, unit_id: u8) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to slave");
        stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
        stream.set_nodelay(true).unwrap();
        Self {
            stream,
            unit_id,
            transaction_id: 0,
        }
    }

    /// Send one PDU and return the response PDU.
    pub fn transact(&mut self, pdu: &[u8]) -> Vec<u8> {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        let length = u16::try_from(pdu.len() + 1).unwrap();

        let mut frame = Vec::with_capacity(7 + pdu.len());
        frame.extend_from_slice(&self.transaction_id.to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&length.to_be_bytes());
        frame.push(self.unit_id);
        frame.extend_from_slice(pdu);
        self.stream.write_all(&frame).unwrap();

        let mut header = [0u8; 7];
        self.stream.read_exact(&mut header).unwrap();
        assert_eq!(
            u16::from_be_bytes([header[0], header[1]]),
            self.transaction_id,
            "transaction id echo"
        );
        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        let mut response = vec![0u8; length - 1];
        self.stream.read_exact(&mut response).unwrap();
        response
    }

    /// Write one holding register; panics on an exception response.
    pub fn write_register(&mut self, address: u16, value: u16) {
        let pdu = request_pdu(0x06, address, value);
        assert_eq!(self.transact(&pdu), pdu);
    }

    /// Read `count` holding registers; panics on an exception response.
    pub fn read_registers(&mut self, start: u16, count: u16) -> Vec<u16> {
        let response = self.transact(&request_pdu(0x03, start, count));
        assert_eq!(response[0], 0x03, "exception {response:02x?}");
        response[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    }
}

/// `[function][first][second]` with big-endian fields.
pub fn request_pdu(function: u8, first: u16, second: u16) -> Vec<u8> {
    let mut pdu = vec![function];
    pdu.extend_from_slice(&first.to_be_bytes());
    pdu.extend_from_slice(&second.to_be_bytes());
    pdu
}

/// Round-trip timing summary.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    /// Minimum round trip in microseconds.
    pub min_us: u64,
    /// Average round trip in microseconds.
    pub avg_us: u64,
    /// Maximum round trip in microseconds.
    pub max_us: u64,
    /// 99th percentile in microseconds.
    pub p99_us: u64,
    /// Number of samples.
    pub samples: u64,
}

impl LatencyStats {
    /// Summarize raw samples.
    pub fn from_samples(samples: &mut [Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        let micros = |d: Duration| u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        let total: u128 = samples.iter().map(Duration::as_micros).sum();
        let count = samples.len();
        let p99_index = (count * 99 / 100).min(count - 1);

        Self {
            min_us: micros(samples[0]),
            avg_us: u64::try_from(total / count as u128).unwrap_or(u64::MAX),
            max_us: micros(samples[count - 1]),
            p99_us: micros(samples[p99_index]),
            samples: count as u64,
        }
    }
}

/// Time `iterations` calls of `op`.
pub fn measure(iterations: usize, mut op: impl FnMut(usize)) -> LatencyStats {
    let mut samples = Vec::with_capacity(iterations);
    for i in 0..iterations {
        let start = Instant::now();
        op(i);
        samples.push(start.elapsed());
    }
    LatencyStats::from_samples(&mut samples)
}

/// Acceptance thresholds for loopback round trips.
#[derive(Debug, Clone)]
pub struct AcceptanceCriteria {
    /// Maximum 99th percentile in microseconds.
    pub max_p99_us: u64,
}

impl Default for AcceptanceCriteria {
    fn default() -> Self {
        Self { max_p99_us: 50_000 }
    }
}

impl AcceptanceCriteria {
    /// Whether `stats` meet the criteria.
    pub fn check(&self, stats: &LatencyStats) -> bool {
        stats.samples > 0 && stats.p99_us <= self.max_p99_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats_from_samples() {
        let mut samples: Vec<Duration> = (1..=100).map(Duration::from_micros).collect();
        let stats = LatencyStats::from_samples(&mut samples);
        assert_eq!(stats.min_us, 1);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.avg_us, 50);
        assert_eq!(stats.p99_us, 100);
        assert_eq!(stats.samples, 100);
    }

    #[test]
    fn test_empty_samples() {
        let stats = LatencyStats::from_samples(&mut []);
        assert_eq!(stats.samples, 0);
        assert!(!AcceptanceCriteria::default().check(&stats));
    }
}
