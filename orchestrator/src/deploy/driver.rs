//! Deployment driver
//!
//! Brings the stack up and walks the service graph in topological order,
//! waiting for each node's readiness predicate under a bounded deadline.
//! A service that exits, reports unhealthy, or never becomes ready fails
//! the deployment; the stack is left as-is for inspection.

use std::time::Duration;

use reqwest::Client;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

use crate::deploy::compose::ContainerRuntime;
use crate::deploy::graph::{Probe, ServiceDescriptor, ServiceGraph};
use crate::errors::OrchestratorError;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Separator introducing the collected log tail inside a deploy error
pub const LOG_TAIL_MARKER: &str = "--- recent logs";

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Fallback readiness budget for services without their own retry budget
    pub grace_period: Duration,

    /// Poll pacing between readiness checks
    pub poll: CooldownOptions,

    /// Log lines collected from a failing service
    pub log_tail_lines: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(60),
            poll: CooldownOptions::default(),
            log_tail_lines: 50,
        }
    }
}

enum Readiness {
    Ready,
    NotReady(String),
    /// The service can no longer become ready; waiting further is pointless
    Fatal(String),
}

/// Full deployment: pull images, start the stack, wait for readiness.
pub async fn deploy(
    runtime: &dyn ContainerRuntime,
    graph: &ServiceGraph,
    options: &DriverOptions,
) -> Result<(), OrchestratorError> {
    info!("pulling images");
    runtime
        .pull()
        .await
        .map_err(|e| OrchestratorError::Deploy(format!("image pull failed: {}", e)))?;

    info!("starting services");
    runtime
        .up_detached()
        .await
        .map_err(|e| OrchestratorError::Deploy(format!("service startup failed: {}", e)))?;

    await_ready(runtime, graph, options).await
}

/// Wait for every service, dependencies first, then sweep the whole stack
/// once more for late failures.
pub async fn await_ready(
    runtime: &dyn ContainerRuntime,
    graph: &ServiceGraph,
    options: &DriverOptions,
) -> Result<(), OrchestratorError> {
    let probe_client = Client::new();

    for service in graph.startup_order() {
        wait_for_service(runtime, &probe_client, service, options).await?;
    }

    let entries = runtime
        .ps()
        .await
        .map_err(|e| OrchestratorError::Deploy(format!("cannot inspect services: {}", e)))?;
    for service in graph.services() {
        let entry = entries.iter().find(|e| e.service == service.name);
        match entry {
            Some(e) if e.is_exited() => {
                return Err(fail_with_logs(
                    runtime,
                    &service.name,
                    &format!("exited with code {}", e.exit_code),
                    options,
                )
                .await);
            }
            Some(e) if e.is_unhealthy() => {
                return Err(
                    fail_with_logs(runtime, &service.name, "reports unhealthy", options).await,
                );
            }
            Some(_) => {}
            None => {
                return Err(fail_with_logs(
                    runtime,
                    &service.name,
                    "has no container after startup",
                    options,
                )
                .await);
            }
        }
    }

    info!("all services ready");
    Ok(())
}

async fn wait_for_service(
    runtime: &dyn ContainerRuntime,
    probe_client: &Client,
    service: &ServiceDescriptor,
    options: &DriverOptions,
) -> Result<(), OrchestratorError> {
    let budget = service.health.wait_budget(options.grace_period);
    let deadline = Instant::now() + budget;
    info!(service = %service.name, ?budget, "waiting for readiness");

    let mut attempt: u32 = 0;
    loop {
        match readiness(runtime, probe_client, service).await? {
            Readiness::Ready => {
                info!(service = %service.name, "ready");
                return Ok(());
            }
            Readiness::Fatal(reason) => {
                return Err(fail_with_logs(runtime, &service.name, &reason, options).await);
            }
            Readiness::NotReady(reason) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(fail_with_logs(
                        runtime,
                        &service.name,
                        &format!("not ready after {:?}: {}", budget, reason),
                        options,
                    )
                    .await);
                }
                let delay = calc_exp_backoff(&options.poll, attempt).min(deadline - now);
                debug!(service = %service.name, %reason, ?delay, "not ready yet");
                sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

async fn readiness(
    runtime: &dyn ContainerRuntime,
    probe_client: &Client,
    service: &ServiceDescriptor,
) -> Result<Readiness, OrchestratorError> {
    let entries = runtime
        .ps()
        .await
        .map_err(|e| OrchestratorError::Deploy(format!("cannot inspect services: {}", e)))?;

    let Some(entry) = entries.iter().find(|e| e.service == service.name) else {
        return Ok(Readiness::NotReady("no container reported yet".to_string()));
    };

    if entry.is_exited() {
        return Ok(Readiness::Fatal(format!(
            "exited with code {}",
            entry.exit_code
        )));
    }
    if entry.is_unhealthy() {
        return Ok(Readiness::Fatal("reports unhealthy".to_string()));
    }
    if !entry.is_running() {
        return Ok(Readiness::NotReady(format!("state {}", entry.state)));
    }

    // Runtime-reported health wins when the manifest defines a check.
    if entry.has_health() {
        return Ok(if entry.is_healthy() {
            Readiness::Ready
        } else {
            Readiness::NotReady(format!("health {}", entry.health))
        });
    }

    match &service.health.probe {
        Probe::Runtime => Ok(Readiness::Ready),
        Probe::Exec { command } => {
            let output = runtime.exec(&service.name, command).await?;
            Ok(if output.status_ok {
                Readiness::Ready
            } else {
                Readiness::NotReady(format!(
                    "probe command failed: {}",
                    output.stderr.trim()
                ))
            })
        }
        Probe::Http { url } => {
            let request = probe_client
                .get(url)
                .timeout(service.health.probe_timeout());
            Ok(match request.send().await {
                Ok(resp) if resp.status().is_success() => Readiness::Ready,
                Ok(resp) => Readiness::NotReady(format!("probe answered {}", resp.status())),
                Err(e) => Readiness::NotReady(format!("probe unreachable: {}", e)),
            })
        }
    }
}

async fn fail_with_logs(
    runtime: &dyn ContainerRuntime,
    service: &str,
    reason: &str,
    options: &DriverOptions,
) -> OrchestratorError {
    error!(service = %service, reason = %reason, "deployment failed");
    let tail = runtime
        .logs_tail(Some(service), options.log_tail_lines)
        .await
        .unwrap_or_else(|e| format!("(logs unavailable: {})", e));
    OrchestratorError::Deploy(format!(
        "service {} {}\n{} ({}) ---\n{}",
        service, reason, LOG_TAIL_MARKER, service, tail
    ))
}
