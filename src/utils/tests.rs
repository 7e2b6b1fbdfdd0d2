use super::error::PubSubError;
use super::logging;
use crate::transport::TransportError;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
fn test_parse_level() {
    assert_eq!(logging::parse_level("ERROR"), tracing::Level::ERROR);
    assert_eq!(logging::parse_level("warning"), tracing::Level::WARN);
    assert_eq!(logging::parse_level(" debug "), tracing::Level::DEBUG);
    assert_eq!(logging::parse_level("trace"), tracing::Level::TRACE);
    assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
}

#[test]
fn test_transport_error_is_wrapped_unchanged() {
    let err: PubSubError = TransportError::NotFound("projects/p/topics/t".to_string()).into();
    assert!(matches!(
        err,
        PubSubError::Transport(TransportError::NotFound(ref name)) if name == "projects/p/topics/t"
    ));
    assert_eq!(err.to_string(), "not found: projects/p/topics/t");
}
