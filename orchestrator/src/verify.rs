//! External health verification
//!
//! Probes the externally reachable endpoint after a successful deployment.
//! Failure here is advisory: the deployed services already reported healthy,
//! so an unreachable endpoint usually means DNS or the reverse proxy, which
//! the orchestrator does not manage. The attempt still succeeds, with a
//! warning pointing the operator at the right logs.

use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};
use url::Url;

/// Well-known health path exposed by the reverse proxy
pub const HEALTH_PATH: &str = "/health";

/// Verification outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Passed { target: String },
    Warning { message: String },
}

/// Probe the external endpoint with a bounded timeout.
pub async fn probe(external_url: Option<&str>, timeout: Duration) -> VerifyOutcome {
    let Some(base) = external_url else {
        return VerifyOutcome::Warning {
            message: "external_url is not configured; reachability was not verified; probe the \
                      stack manually or set external_url in the settings document"
                .to_string(),
        };
    };

    let target = match join_health(base) {
        Ok(url) => url,
        Err(message) => return VerifyOutcome::Warning { message },
    };

    let client = match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            return VerifyOutcome::Warning {
                message: format!("cannot build probe client: {}", e),
            }
        }
    };

    match client.get(target.clone()).send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(%target, status = %resp.status(), "external health probe passed");
            VerifyOutcome::Passed {
                target: target.to_string(),
            }
        }
        Ok(resp) => {
            warn!(%target, status = %resp.status(), "external health probe failed");
            VerifyOutcome::Warning {
                message: format!(
                    "{} answered {}; the proxy or application may still be warming up; inspect \
                     the web service logs and the reverse proxy configuration",
                    target,
                    resp.status()
                ),
            }
        }
        Err(e) => {
            warn!(%target, error = %e, "external health probe unreachable");
            VerifyOutcome::Warning {
                message: format!(
                    "{} unreachable within {:?}: {}; likely DNS or the reverse proxy; the \
                     deployed services themselves reported healthy",
                    target, timeout, e
                ),
            }
        }
    }
}

fn join_health(base: &str) -> Result<Url, String> {
    let url = Url::parse(base).map_err(|e| format!("invalid external_url {:?}: {}", base, e))?;
    url.join(HEALTH_PATH)
        .map_err(|e| format!("invalid external_url {:?}: {}", base, e))
}
