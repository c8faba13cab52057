//! Unit tests for `AppError` display format and classification.

use hub_orchestrator::AppError;

#[test]
fn display_prefixes_each_variant() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Db("x".into()), "db: x"),
        (AppError::Http("x".into()), "http: x"),
        (AppError::Backend("x".into()), "backend: x"),
        (AppError::Timeout("x".into()), "timeout: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::StateInconsistency("x".into()), "state inconsistency: x"),
        (AppError::InvalidTransition("x".into()), "invalid transition: x"),
        (AppError::Bus("x".into()), "bus: x"),
        (AppError::Ipc("x".into()), "ipc: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn backend_failures_are_transient() {
    assert!(AppError::Backend("tmux exited 1".into()).is_transient());
    assert!(AppError::Timeout("capture_output".into()).is_transient());
    assert!(AppError::Http("502".into()).is_transient());
}

#[test]
fn logic_failures_are_not_transient() {
    assert!(!AppError::StateInconsistency("gone".into()).is_transient());
    assert!(!AppError::InvalidTransition("error -> running".into()).is_transient());
    assert!(!AppError::Config("bad".into()).is_transient());
}

#[test]
fn toml_errors_convert_to_config() {
    let err = toml::from_str::<toml::Value>("a = ").expect_err("invalid toml");
    assert!(matches!(AppError::from(err), AppError::Config(_)));
}

#[test]
fn io_errors_convert_to_io() {
    let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let app: AppError = err.into();
    assert_eq!(app.to_string(), "io: pipe closed");
}

#[test]
fn implements_std_error() {
    fn takes_error(_: &dyn std::error::Error) {}
    takes_error(&AppError::Bus("dropped".into()));
}
