//! Deployment driver tests

mod common;

use std::time::Duration;

use tokio_test::assert_ok;

use common::{entry, service, service_with_exec_probe, FakeRuntime};
use deckhand::deploy::compose::ExecOutput;
use deckhand::deploy::driver::{self, DriverOptions};
use deckhand::deploy::graph::ServiceGraph;
use deckhand::errors::OrchestratorError;
use deckhand::utils::CooldownOptions;

fn fast_options() -> DriverOptions {
    DriverOptions {
        grace_period: Duration::from_millis(100),
        poll: CooldownOptions {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        },
        log_tail_lines: 20,
    }
}

fn stack_graph() -> ServiceGraph {
    ServiceGraph::build(vec![
        service("db", &[]),
        service("cache", &[]),
        service("web", &["db", "cache"]),
        service("worker", &["db", "cache"]),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_deploy_happy_path() {
    let runtime = FakeRuntime::new(vec![vec![
        entry("db", "running", "healthy"),
        entry("cache", "running", "healthy"),
        entry("web", "running", "healthy"),
        entry("worker", "running", ""),
    ]]);

    assert_ok!(driver::deploy(&runtime, &stack_graph(), &fast_options()).await);

    let calls = runtime.calls();
    assert_eq!(calls[0], "pull");
    assert_eq!(calls[1], "up");
    assert!(calls[2..].iter().all(|c| c == "ps"));
}

#[tokio::test]
async fn test_exited_service_fails_with_log_tail() {
    let mut web = entry("web", "exited", "");
    web.exit_code = 137;
    let runtime = FakeRuntime::new(vec![vec![
        entry("db", "running", "healthy"),
        entry("cache", "running", "healthy"),
        web,
        entry("worker", "running", ""),
    ]]);

    let err = driver::deploy(&runtime, &stack_graph(), &fast_options())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Deploy(_)));
    assert_eq!(err.exit_code(), 4);
    let message = err.to_string();
    assert!(message.contains("web"));
    assert!(message.contains("137"));
    assert!(message.contains("log line one"));
    assert!(runtime.calls().iter().any(|c| c == "logs:web:20"));
}

#[tokio::test]
async fn test_unhealthy_service_fails() {
    let runtime = FakeRuntime::new(vec![vec![
        entry("db", "running", "unhealthy"),
        entry("cache", "running", "healthy"),
        entry("web", "running", "healthy"),
        entry("worker", "running", ""),
    ]]);

    let err = driver::deploy(&runtime, &stack_graph(), &fast_options())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("unhealthy"));
}

#[tokio::test]
async fn test_never_ready_service_times_out() {
    let runtime = FakeRuntime::new(vec![vec![entry("solo", "running", "starting")]]);
    let graph = ServiceGraph::build(vec![service("solo", &[])]).unwrap();

    let err = driver::deploy(&runtime, &graph, &fast_options())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("not ready after"));
}

#[tokio::test]
async fn test_exec_probe_gates_readiness() {
    // No manifest healthcheck; readiness comes from the in-container probe,
    // which fails once before passing.
    let runtime = FakeRuntime::new(vec![vec![entry("cache", "running", "")]]).with_exec(vec![
        ExecOutput {
            status_ok: false,
            stdout: Vec::new(),
            stderr: "NOAUTH Authentication required.".to_string(),
        },
        ExecOutput {
            status_ok: true,
            stdout: b"PONG".to_vec(),
            stderr: String::new(),
        },
    ]);
    let graph =
        ServiceGraph::build(vec![service_with_exec_probe("cache", &["redis-cli", "ping"])])
            .unwrap();

    assert_ok!(driver::deploy(&runtime, &graph, &fast_options()).await);

    let probes = runtime
        .calls()
        .iter()
        .filter(|c| c.starts_with("exec:cache:"))
        .count();
    assert_eq!(probes, 2);
}

#[tokio::test]
async fn test_missing_container_detected_in_final_sweep() {
    // The worker never gets a container; the per-node wait times out on it.
    let runtime = FakeRuntime::new(vec![vec![entry("db", "running", "healthy")]]);
    let graph = ServiceGraph::build(vec![service("db", &[]), service("worker", &["db"])]).unwrap();

    let err = driver::deploy(&runtime, &graph, &fast_options())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("worker"));
}
