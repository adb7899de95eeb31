//! Service descriptors and the startup dependency graph

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

/// Expected owner of a service's persistent data directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// How a running service is judged ready
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Probe {
    /// Trust the runtime's own health reporting. A running service without
    /// a manifest healthcheck is considered ready.
    #[default]
    Runtime,

    /// Run a command inside the container; exit 0 means ready.
    Exec { command: Vec<String> },

    /// HTTP GET from the host; a 2xx answer means ready.
    Http { url: String },
}

/// Readiness probing parameters for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Delay between probe attempts
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Per-attempt timeout (HTTP probes)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts before the service is declared failed; 0 falls back to the
    /// driver-wide grace period
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Settle time granted before the attempt budget starts counting
    #[serde(default)]
    pub start_period_secs: u64,

    #[serde(default)]
    pub probe: Probe,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_retries() -> u32 {
    12
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            start_period_secs: 0,
            probe: Probe::Runtime,
        }
    }
}

impl HealthCheck {
    /// Total time the driver waits for this service before giving up.
    pub fn wait_budget(&self, default_grace: Duration) -> Duration {
        let start = Duration::from_secs(self.start_period_secs);
        if self.retries > 0 {
            start + Duration::from_secs(self.interval_secs) * self.retries
        } else {
            start + default_grace
        }
    }

    /// Per-attempt probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One long-running containerized process of the stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service name as it appears in the compose manifest
    pub name: String,

    /// Image reference
    pub image: String,

    /// Services that must be ready before this one is waited on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Persistent data directory, relative to the stack data root
    #[serde(default)]
    pub data_dir: Option<String>,

    /// uid/gid the data directory must belong to
    #[serde(default)]
    pub owner: Option<Owner>,

    #[serde(default)]
    pub health: HealthCheck,
}

/// Validated service dependency DAG with a fixed startup order
#[derive(Debug, Clone)]
pub struct ServiceGraph {
    services: Vec<ServiceDescriptor>,
    order: Vec<usize>,
}

impl ServiceGraph {
    /// Validate the descriptor set and compute a topological startup order.
    ///
    /// Rejects duplicate names, unknown dependencies, and cycles.
    pub fn build(services: Vec<ServiceDescriptor>) -> Result<Self, OrchestratorError> {
        if services.is_empty() {
            return Err(OrchestratorError::Config(
                "no services defined in the stack topology".to_string(),
            ));
        }

        let mut index: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, service) in services.iter().enumerate() {
            if index.insert(service.name.as_str(), i).is_some() {
                return Err(OrchestratorError::Config(format!(
                    "duplicate service name: {}",
                    service.name
                )));
            }
        }

        for service in &services {
            for dep in &service.depends_on {
                if !index.contains_key(dep.as_str()) {
                    return Err(OrchestratorError::Config(format!(
                        "service {} depends on unknown service {}",
                        service.name, dep
                    )));
                }
                if dep == &service.name {
                    return Err(OrchestratorError::Config(format!(
                        "service {} depends on itself",
                        service.name
                    )));
                }
            }
        }

        // Kahn's algorithm; the ready set is kept sorted by name so the
        // startup order is deterministic.
        let mut in_degree: Vec<usize> = services.iter().map(|s| s.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); services.len()];
        for (i, service) in services.iter().enumerate() {
            for dep in &service.depends_on {
                dependents[index[dep.as_str()]].push(i);
            }
        }

        let mut ready: BTreeSet<(&str, usize)> = services
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] == 0)
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut order = Vec::with_capacity(services.len());
        while let Some(&(name, i)) = ready.iter().next() {
            ready.remove(&(name, i));
            order.push(i);
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert((services[next].name.as_str(), next));
                }
            }
        }

        if order.len() != services.len() {
            let stuck: Vec<&str> = services
                .iter()
                .enumerate()
                .filter(|(i, _)| !order.contains(i))
                .map(|(_, s)| s.name.as_str())
                .collect();
            return Err(OrchestratorError::Config(format!(
                "dependency cycle involving: {}",
                stuck.join(", ")
            )));
        }

        Ok(Self { services, order })
    }

    /// All descriptors, in declaration order
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// Descriptors in dependency-respecting startup order
    pub fn startup_order(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.order.iter().map(|&i| &self.services[i])
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, deps: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.to_string(),
            image: format!("example/{}:latest", name),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            data_dir: None,
            owner: None,
            health: HealthCheck::default(),
        }
    }

    #[test]
    fn test_startup_order_respects_dependencies() {
        let graph = ServiceGraph::build(vec![
            svc("web", &["db", "cache"]),
            svc("db", &[]),
            svc("cache", &[]),
            svc("worker", &["db", "cache"]),
        ])
        .unwrap();

        let order: Vec<&str> = graph.startup_order().map(|s| s.name.as_str()).collect();
        let pos = |name: &str| order.iter().position(|n| *n == name).unwrap();
        assert!(pos("db") < pos("web"));
        assert!(pos("cache") < pos("web"));
        assert!(pos("db") < pos("worker"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = ServiceGraph::build(vec![svc("a", &["b"]), svc("b", &["a"])]).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let err = ServiceGraph::build(vec![svc("web", &["ghost"])]).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_wait_budget() {
        let mut health = HealthCheck::default();
        health.interval_secs = 5;
        health.retries = 12;
        health.start_period_secs = 10;
        assert_eq!(
            health.wait_budget(Duration::from_secs(60)),
            Duration::from_secs(70)
        );

        health.retries = 0;
        assert_eq!(
            health.wait_budget(Duration::from_secs(60)),
            Duration::from_secs(70)
        );
    }
}
