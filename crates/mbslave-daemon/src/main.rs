//! Modbus slave daemon entry point.
//!
//! Loads a [`ServerConfig`], starts the configured TCP and serial RTU
//! listeners, and serves until SIGTERM or SIGINT.

mod signals;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mbslave_common::config::{Parity, RtuConfig, ServerConfig, TcpConfig};
use mbslave_core::Server;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

use crate::signals::{wait_for_shutdown, SignalHandler};

/// Modbus slave daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "mbslave",
    about = "Modbus slave serving coils and registers over TCP and serial RTU",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Unit identifier to answer to (overrides config file).
    #[arg(long, short = 'u')]
    slave_id: Option<u8>,

    /// Serve Modbus TCP on this address, e.g. 0.0.0.0:502.
    #[arg(long, value_name = "ADDR")]
    tcp: Option<String>,

    /// Serve Modbus RTU on this serial device.
    #[arg(long, value_name = "DEVICE")]
    rtu: Option<String>,

    /// Serial line speed (requires an RTU port).
    #[arg(long)]
    baud: Option<u32>,

    /// Log a dump of every request and response.
    #[arg(long, short = 'd')]
    debug: bool,

    /// Interval between status log lines.
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    status_interval: Duration,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Modbus slave");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    if config.tcp.is_none() && config.rtu.is_none() {
        bail!("No transport configured: pass --tcp or --rtu, or add a [tcp] or [rtu] section");
    }

    info!(
        slave_id = config.slave_id,
        tcp = ?config.tcp.as_ref().map(|tcp| &tcp.address),
        rtu = ?config.rtu.as_ref().map(|rtu| &rtu.port),
        debug = config.debug,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::install().context("Failed to set up signal handlers")?;

    run_daemon(&config, &signal_handler, args.status_interval)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("mbslave_daemon={level},mbslave_core={level},mbslave_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `MBSLAVE_CONFIG_PATH` environment variable
/// 3. `/etc/mbslave/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<ServerConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return ServerConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("MBSLAVE_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from MBSLAVE_CONFIG_PATH");
            return ServerConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from MBSLAVE_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "MBSLAVE_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/mbslave/config.toml", "config/default.toml"] {
        let config_path = PathBuf::from(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config file");
            return ServerConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(ServerConfig::default())
}

/// Command-line values win over the file.
fn apply_overrides(config: &mut ServerConfig, args: &Args) {
    if let Some(slave_id) = args.slave_id {
        config.slave_id = slave_id;
    }
    if args.debug {
        config.debug = true;
    }
    if let Some(address) = &args.tcp {
        let tcp = config.tcp.get_or_insert_with(TcpConfig::default);
        tcp.address.clone_from(address);
    }
    if let Some(port) = &args.rtu {
        let rtu = config.rtu.get_or_insert_with(RtuConfig::default);
        rtu.port.clone_from(port);
    }
    if let (Some(baud), Some(rtu)) = (args.baud, config.rtu.as_mut()) {
        rtu.baud_rate = baud;
    }
}

fn run_daemon(
    config: &ServerConfig,
    signal_handler: &SignalHandler,
    status_interval: Duration,
) -> Result<()> {
    let server = Server::from_config(config).context("Failed to create Modbus slave")?;
    let trace_drain = if config.debug {
        Some(spawn_trace_drain(&server, config.trace.capacity)?)
    } else {
        None
    };

    if let Some(tcp) = &config.tcp {
        let local = server
            .listen_tcp(tcp)
            .with_context(|| format!("Failed to start Modbus TCP on {}", tcp.address))?;
        info!(address = %local, "Serving Modbus TCP");
    }

    if let Some(rtu) = &config.rtu {
        let (reader, writer) = open_serial(rtu)?;
        server
            .listen_rtu(reader, writer, &rtu.port)
            .with_context(|| format!("Failed to start Modbus RTU on {}", rtu.port))?;
        info!(port = %rtu.port, baud = rtu.baud_rate, "Serving Modbus RTU");
    }

    while !wait_for_shutdown(signal_handler, status_interval) {
        let stats = server.stats();
        info!(
            requests = stats.total_requests,
            exceptions = stats.exception_responses,
            write_failures = stats.write_failures,
            dropped_traces = stats.dropped_traces,
            mean_ns = stats.mean_ns.unwrap_or(0),
            p99_ns = stats.p99_ns.unwrap_or(0),
            max_ns = stats.max_ns.unwrap_or(0),
            "Periodic status"
        );
    }

    info!("Shutting down...");
    server.close();
    if let Some(handle) = trace_drain {
        if handle.join().is_err() {
            warn!("Trace drain thread panicked");
        }
    }

    let stats = server.stats();
    match serde_json::to_string(&stats) {
        Ok(json) => info!(stats = %json, "Final statistics"),
        Err(e) => warn!(error = %e, "Failed to serialize final statistics"),
    }
    info!(
        total_requests = stats.total_requests,
        signals = signal_handler.state().signal_count(),
        final_state = %server.state(),
        "Daemon shutdown complete"
    );

    Ok(())
}

/// Forward trace lines to the log until the engine stops.
fn spawn_trace_drain(server: &Server, capacity: usize) -> Result<JoinHandle<()>> {
    let traces = server.listen_requests(capacity);
    std::thread::Builder::new()
        .name("mbslave-trace".into())
        .spawn(move || {
            for line in traces {
                info!(target: "mbslave_daemon::trace", "{line}");
            }
        })
        .context("Failed to spawn trace drain thread")
}

type SerialHalves = (Box<dyn serialport::SerialPort>, Box<dyn serialport::SerialPort>);

/// Open the serial device and split it into reader and writer handles.
fn open_serial(config: &RtuConfig) -> Result<SerialHalves> {
    let data_bits = match config.data_bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        8 => serialport::DataBits::Eight,
        other => bail!("Unsupported data bits: {other}"),
    };
    let stop_bits = match config.stop_bits {
        1 => serialport::StopBits::One,
        2 => serialport::StopBits::Two,
        other => bail!("Unsupported stop bits: {other}"),
    };
    let parity = match config.parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    };

    let reader = serialport::new(&config.port, config.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .timeout(config.timeout)
        .open()
        .with_context(|| format!("Failed to open serial port {}", config.port))?;
    let writer = reader
        .try_clone()
        .with_context(|| format!("Failed to clone serial port {}", config.port))?;
    Ok((reader, writer))
}
