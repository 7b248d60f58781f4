//! Integration tests for logging system

use core_runtime::logging::{init_logging, strip_path, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_initialization() {
    // Logging can only be installed once per process, so the second call must fail
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_spans(true);

    assert!(init_logging(config.clone()).is_ok());
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}

#[test]
fn test_path_stripping() {
    assert_eq!(
        strip_path("/home/user/.cache/rangecache/9f86d081.cache"),
        "9f86d081.cache"
    );
    assert_eq!(strip_path("C:\\Users\\John\\AppData\\9f86d081.complete"), "9f86d081.complete");
    assert_eq!(strip_path("filename.txt"), "filename.txt");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_format_selection() {
    // Debug builds should default to Pretty
    #[cfg(debug_assertions)]
    {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
    }

    // Release builds should default to JSON
    #[cfg(not(debug_assertions))]
    {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Json);
    }
}

#[test]
fn test_filter_configuration() {
    let config = LoggingConfig::default().with_filter("core_loader=debug,bridge_desktop=trace");

    assert_eq!(
        config.filter,
        Some("core_loader=debug,bridge_desktop=trace".to_string())
    );
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
