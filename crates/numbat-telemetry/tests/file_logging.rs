//! Installing the global subscriber. Kept in its own binary because the
//! subscriber can only be set once per process.

use std::fs;

use numbat_telemetry::{init_logging, LogConfig, TelemetryError, LOG_FILE_NAME};

#[test]
fn test_json_lines_are_written_to_the_log_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        directory: Some(dir.path().to_path_buf()),
        ..LogConfig::production()
    };

    let guard = init_logging(&config).unwrap();
    tracing::info!(target: "numbat::access", status = 201, "request");
    tracing::debug!("filtered out");
    drop(guard);

    let contents = fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1, "{contents}");
    assert!(lines[0].contains(r#""status":201"#), "{contents}");
    assert!(lines[0].contains(r#""target":"numbat::access""#), "{contents}");

    let err = init_logging(&LogConfig::default()).unwrap_err();
    assert!(matches!(err, TelemetryError::AlreadyInitialized(_)));
}
