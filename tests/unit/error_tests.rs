//! Unit tests for `AppError` display and conversions.

use acp_harness::AppError;

#[test]
fn display_prefixes_name_the_failure_class() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Io("x".into()), "io: x"),
        (AppError::Acp("x".into()), "acp: x"),
        (AppError::Rpc("x".into()), "rpc: x"),
        (AppError::Timeout("x".into()), "timeout: x"),
        (AppError::NoContent("x".into()), "no content: x"),
        (AppError::Interrupted("x".into()), "interrupted: x"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("pipe closed")));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
    let err: AppError = toml_err.into();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    let err = AppError::Rpc("session/new failed".into());
    assert_error(&err);
    assert!(format!("{err:?}").contains("Rpc"));
}
