//! Precondition checker tests

use std::collections::BTreeMap;
use std::path::Path;

use deckhand::config::env_file::DeploymentConfig;
use deckhand::config::settings::Settings;
use deckhand::errors::OrchestratorError;
use deckhand::preflight;

fn full_values(settings: &Settings) -> BTreeMap<String, String> {
    settings
        .required_keys
        .iter()
        .map(|key| (key.clone(), format!("value-for-{}", key)))
        .collect()
}

fn config_from(settings: &Settings, values: BTreeMap<String, String>) -> DeploymentConfig {
    DeploymentConfig::from_values(Path::new("/tmp/.env"), values, &settings.secret_keys)
}

#[test]
fn test_removing_any_single_required_key_is_detected() {
    let settings = Settings::default();
    for removed in &settings.required_keys {
        let mut values = full_values(&settings);
        values.remove(removed);
        let config = config_from(&settings, values);

        let missing = preflight::missing_keys(&config, &settings.required_keys);
        assert_eq!(missing, vec![removed.clone()]);
    }
}

#[test]
fn test_blank_value_counts_as_missing() {
    let settings = Settings::default();
    let mut values = full_values(&settings);
    values.insert("POSTGRES_PASSWORD".to_string(), "   ".to_string());
    let config = config_from(&settings, values);

    let missing = preflight::missing_keys(&config, &settings.required_keys);
    assert_eq!(missing, vec!["POSTGRES_PASSWORD".to_string()]);
}

#[test]
fn test_all_missing_keys_are_reported_together() {
    let settings = Settings::default();
    let config = config_from(&settings, BTreeMap::new());

    let err = preflight::check(&settings_with_manifest(&settings), &config).unwrap_err();
    let message = err.to_string();
    for key in &settings.required_keys {
        assert!(message.contains(key.as_str()), "{} not named in {}", key, message);
    }
}

#[test]
fn test_missing_manifest_is_fatal_before_key_checks() {
    let mut settings = Settings::default();
    settings.compose_file = "/nonexistent/docker-compose.yml".into();
    let config = config_from(&settings, full_values(&settings));

    let err = preflight::check(&settings, &config).unwrap_err();
    assert!(matches!(err, OrchestratorError::Config(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("/nonexistent/docker-compose.yml"));
}

#[test]
fn test_satisfied_preconditions_pass() {
    let settings = settings_with_manifest(&Settings::default());
    let config = config_from(&settings, full_values(&settings));

    preflight::check(&settings, &config).unwrap();
}

/// Settings pointing at a manifest that exists, with the disk floor disabled
/// so the check is host-independent.
fn settings_with_manifest(base: &Settings) -> Settings {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("docker-compose.yml");
    std::fs::write(&manifest, "services: {}\n").unwrap();

    let mut settings = base.clone();
    settings.compose_file = manifest;
    settings.backup.min_free_mb = 0;
    // Leak the tempdir so the manifest outlives this helper.
    std::mem::forget(dir);
    settings
}
