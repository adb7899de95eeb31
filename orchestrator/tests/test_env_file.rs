//! Runtime configuration file tests

use std::path::Path;

use secrecy::ExposeSecret;

use deckhand::config::env_file::{parse, DeploymentConfig};

const SECRET_KEYS: &[&str] = &["POSTGRES_PASSWORD"];

fn secret_keys() -> Vec<String> {
    SECRET_KEYS.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_parse_full_file() {
    let contents = "\
# Stack configuration
POSTGRES_USER=app
POSTGRES_DB=board
export APP_HOSTNAME=board.example.com
POSTGRES_PASSWORD=\"s3cret value\"

# overridden below
SECRET_KEY_BASE=old
SECRET_KEY_BASE=new
";
    let values = parse(contents).unwrap();
    assert_eq!(values.get("POSTGRES_USER").map(String::as_str), Some("app"));
    assert_eq!(
        values.get("APP_HOSTNAME").map(String::as_str),
        Some("board.example.com")
    );
    assert_eq!(
        values.get("POSTGRES_PASSWORD").map(String::as_str),
        Some("s3cret value")
    );
    assert_eq!(values.get("SECRET_KEY_BASE").map(String::as_str), Some("new"));
}

#[test]
fn test_secret_values_are_fenced_off() {
    let values = parse("POSTGRES_USER=app\nPOSTGRES_PASSWORD=hunter2\n").unwrap();
    let config = DeploymentConfig::from_values(Path::new("/tmp/.env"), values, &secret_keys());

    // Plain access never yields the secret.
    assert_eq!(config.get("POSTGRES_USER"), Some("app"));
    assert_eq!(config.get("POSTGRES_PASSWORD"), None);

    // The secret is only reachable through explicit exposure.
    let secret = config.secret("POSTGRES_PASSWORD").unwrap();
    assert_eq!(secret.expose_secret(), "hunter2");

    // Debug formatting must not leak it.
    let debug = format!("{:?}", config);
    assert!(!debug.contains("hunter2"));

    // Blankness checks still see it.
    assert!(!config.is_blank("POSTGRES_PASSWORD"));
    assert!(config.is_blank("REDIS_PASSWORD"));
}

#[tokio::test]
async fn test_load_missing_file_is_a_config_error() {
    let err = DeploymentConfig::load(
        Path::new("/nonexistent/.env"),
        &["POSTGRES_USER".to_string()],
        &secret_keys(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("/nonexistent/.env"));
}

#[tokio::test]
async fn test_environment_overrides_required_keys() {
    let dir = tempfile::tempdir().unwrap();
    let env_file = dir.path().join(".env");
    std::fs::write(&env_file, "DECKHAND_TEST_OVERRIDE=from-file\n").unwrap();

    std::env::set_var("DECKHAND_TEST_OVERRIDE", "from-env");
    let config = DeploymentConfig::load(
        &env_file,
        &["DECKHAND_TEST_OVERRIDE".to_string()],
        &secret_keys(),
    )
    .await
    .unwrap();
    std::env::remove_var("DECKHAND_TEST_OVERRIDE");

    assert_eq!(config.get("DECKHAND_TEST_OVERRIDE"), Some("from-env"));
}
