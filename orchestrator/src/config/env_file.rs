//! Runtime configuration (KEY=VALUE) file parsing

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::errors::OrchestratorError;
use crate::filesys::file::File;

/// Deployment configuration consumed by the stack at startup.
///
/// Loaded once from the stack's env file, with the process environment
/// taking precedence for the required keys. Keys named in the secret set
/// are held as [`SecretString`] and never come back out of `get()`.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    path: PathBuf,
    values: BTreeMap<String, String>,
    secrets: BTreeMap<String, SecretString>,
}

impl DeploymentConfig {
    /// Load the env file at `path`. For each key in `required` the process
    /// environment overrides the file.
    pub async fn load(
        path: &Path,
        required: &[String],
        secret_keys: &[String],
    ) -> Result<Self, OrchestratorError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(OrchestratorError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let contents = file.read_string().await?;
        let mut values = parse(&contents)?;
        for key in required {
            if let Ok(value) = std::env::var(key) {
                values.insert(key.clone(), value);
            }
        }

        Ok(Self::from_values(path, values, secret_keys))
    }

    /// Build a config from an already-parsed map, splitting off secrets.
    pub fn from_values(
        path: &Path,
        values: BTreeMap<String, String>,
        secret_keys: &[String],
    ) -> Self {
        let mut plain = BTreeMap::new();
        let mut secrets = BTreeMap::new();
        for (key, value) in values {
            if secret_keys.iter().any(|s| s == &key) {
                secrets.insert(key, SecretString::from(value));
            } else {
                plain.insert(key, value);
            }
        }
        Self {
            path: path.to_path_buf(),
            values: plain,
            secrets,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-secret value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Secret value for `key`
    pub fn secret(&self, key: &str) -> Option<&SecretString> {
        self.secrets.get(key)
    }

    /// True when the key is absent or holds only whitespace
    pub fn is_blank(&self, key: &str) -> bool {
        if let Some(value) = self.values.get(key) {
            return value.trim().is_empty();
        }
        if let Some(secret) = self.secrets.get(key) {
            return secret.expose_secret().trim().is_empty();
        }
        true
    }

    /// All known key names (secret keys included; values are not exposed)
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values
            .keys()
            .chain(self.secrets.keys())
            .map(String::as_str)
    }
}

/// Parse `KEY=VALUE` lines.
///
/// `#` comments and blank lines are skipped, an optional `export ` prefix is
/// tolerated, and matching single or double quotes around values are
/// stripped. Later assignments override earlier ones.
pub fn parse(contents: &str) -> Result<BTreeMap<String, String>, OrchestratorError> {
    let mut values = BTreeMap::new();

    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            return Err(OrchestratorError::Config(format!(
                "malformed line {} in configuration file: {:?}",
                lineno + 1,
                raw
            )));
        };

        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(OrchestratorError::Config(format!(
                "invalid configuration key on line {}: {:?}",
                lineno + 1,
                key
            )));
        }

        values.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    Ok(values)
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
