//! Startup from configuration files.

use super::common::Master;
use mbslave_common::config::ServerConfig;
use mbslave_common::error::SlaveError;
use mbslave_core::Server;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_server_from_config_file() {
    let file = write_temp_config(
        r#"
        slave_id = 42
        debug = true

        [trace]
        capacity = 16

        [tcp]
        address = "127.0.0.1:0"
        read_timeout = "20ms"
        "#,
    );
    let config = ServerConfig::from_file(file.path()).unwrap();

    let server = Server::from_config(&config).unwrap();
    assert_eq!(server.slave_id(), 42);
    assert!(server.debug());

    let tcp = config.tcp.as_ref().unwrap();
    let addr = server.listen_tcp(tcp).unwrap();
    let mut master = Master::connect(addr, 42);
    master.write_register(1, 0x4242);
    assert_eq!(master.read_registers(1, 1), vec![0x4242]);

    server.close();
    assert_eq!(server.stats().total_requests, 2);
}

#[test]
fn test_invalid_slave_id_in_config() {
    let file = write_temp_config("slave_id = 0\n");
    let config = ServerConfig::from_file(file.path()).unwrap();

    assert!(matches!(
        Server::from_config(&config),
        Err(SlaveError::Config(_))
    ));
}

#[test]
fn test_config_roundtrip_through_file() {
    let mut config = ServerConfig::default();
    config.slave_id = 5;
    let file = write_temp_config(&config.to_toml().unwrap());
    let parsed = ServerConfig::from_file(file.path()).unwrap();

    assert_eq!(parsed.slave_id, 5);
    assert!(parsed.validate().is_ok());
}
