use std::io::Write;
use std::time::Duration;

use longlink::protocol::WireFormat;
use longlink::service::{AppConfig, AppError, AppResult};

#[test]
fn load_config_file() -> AppResult<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        r#"
[network]
port = 9100
max_frame_length = 65536
wire_format = "json"

[idle]
read_idle_seconds = 5
write_idle_seconds = 0

[heartbeat]
max_missed_heartbeats = 5

[auth]
auth_timeout_seconds = 30
"#
    )?;

    let config = AppConfig::set_up_config(file.path())?;
    assert_eq!(config.network.port, 9100);
    assert_eq!(config.network.max_frame_length, 65536);
    assert_eq!(config.network.wire_format, WireFormat::Json);
    // unset keys keep their defaults
    assert_eq!(config.network.host, "127.0.0.1");
    assert_eq!(config.idle.all_idle_seconds, 40);

    let timeouts = config.idle_timeouts();
    assert_eq!(timeouts.read, Some(Duration::from_secs(5)));
    assert_eq!(timeouts.write, None);
    assert_eq!(config.heartbeat.max_missed_heartbeats, 5);
    assert_eq!(config.auth_timeout(), Some(Duration::from_secs(30)));
    Ok(())
}

#[test]
fn environment_overrides_file() -> AppResult<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(file, "[client]\nclient_id = \"from-file\"\nreconnect_delay_seconds = 3")?;

    std::env::set_var("LONGLINK__CLIENT__CLIENT_ID", "from-env");
    let config = AppConfig::from_sources(Some(file.path()));
    std::env::remove_var("LONGLINK__CLIENT__CLIENT_ID");

    let config = config?;
    assert_eq!(config.client.client_id, "from-env");
    assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
    Ok(())
}

#[test]
fn invalid_threshold_is_rejected() -> AppResult<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(file, "[heartbeat]\nmax_missed_heartbeats = 0")?;

    let res = AppConfig::set_up_config(file.path());
    assert!(matches!(res, Err(AppError::InvalidValue(_))));
    Ok(())
}

#[test]
fn missing_file_is_an_error() {
    let res = AppConfig::set_up_config("/nonexistent/longlink.toml");
    assert!(matches!(res, Err(AppError::ConfigFileError(_))));
}
