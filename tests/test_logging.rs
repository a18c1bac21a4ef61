//! Tests for logging configuration and format parsing

use mqtt_http_bridge::observability::logging::{parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_is_case_insensitive() {
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    // Invalid formats should default to JSON for production safety
    for input in ["invalid", "", "xml", "  json  "] {
        assert_eq!(LogFormat::parse(input), LogFormat::Json, "{input:?}");
    }
}

#[test]
fn test_parse_level() {
    let cases = [
        ("ERROR", Level::ERROR),
        ("warn", Level::WARN),
        ("Info", Level::INFO),
        ("DEBUG", Level::DEBUG),
        ("trace", Level::TRACE),
        ("verbose", Level::INFO),
        ("", Level::INFO),
    ];

    for (input, expected) in cases {
        assert_eq!(parse_level(input), expected, "{input:?}");
    }
}
