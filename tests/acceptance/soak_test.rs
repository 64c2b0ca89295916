//! Soak tests: sustained mixed traffic from several masters.
//!
//! Each master owns a disjoint block of holding registers, writes a
//! sequence into it and reads it back. The final memory image must match
//! what every master last wrote.

use super::common::{start_tcp_slave, Master};
use std::thread;
use std::time::{Duration, Instant};

const BLOCK: u16 = 50;

fn run_soak(masters: u16, duration: Duration) -> u64 {
    let (server, addr) = start_tcp_slave(1);

    let workers: Vec<_> = (0..masters)
        .map(|id| {
            thread::spawn(move || {
                let mut master = Master::connect(addr, 1);
                let base = id * BLOCK;
                let deadline = Instant::now() + duration;
                let mut rounds: u64 = 0;
                let mut value: u16 = 0;
                while Instant::now() < deadline {
                    rounds += 1;
                    value = value.wrapping_add(1);
                    let register = base + value % BLOCK;
                    master.write_register(register, value);
                    assert_eq!(master.read_registers(register, 1), vec![value]);
                }
                (rounds, value)
            })
        })
        .collect();

    let mut requests = 0;
    for (id, worker) in (0..masters).zip(workers) {
        let (rounds, last_value) = worker.join().unwrap();
        requests += rounds * 2;
        let register = usize::from(id * BLOCK + last_value % BLOCK);
        assert_eq!(
            server.with_memory(|memory| memory.holding_register(register)),
            Some(last_value)
        );
    }

    let stats = server.stats();
    assert_eq!(stats.total_requests, requests);
    assert_eq!(stats.exception_responses, 0);
    assert_eq!(stats.write_failures, 0);
    requests
}

#[test]
fn test_short_soak() {
    let requests = run_soak(4, Duration::from_secs(1));
    println!("short soak: {requests} requests");
    assert!(requests > 0);
}

#[test]
#[ignore = "Long-running soak test (5 minutes)"]
fn test_soak_five_minutes() {
    let requests = run_soak(8, Duration::from_secs(300));
    println!("5 minute soak: {requests} requests");
}
