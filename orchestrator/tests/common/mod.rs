//! Shared test support
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use deckhand::deploy::compose::{ContainerRuntime, ExecOutput, PsEntry};
use deckhand::deploy::graph::{HealthCheck, Probe, ServiceDescriptor};
use deckhand::errors::OrchestratorError;

/// Scripted container runtime: serves canned `ps` snapshots in order (the
/// last one repeats) and records every call it receives.
pub struct FakeRuntime {
    ps_script: Mutex<VecDeque<Vec<PsEntry>>>,
    exec_script: Mutex<VecDeque<ExecOutput>>,
    calls: Mutex<Vec<String>>,
    pub logs_text: String,
}

impl FakeRuntime {
    pub fn new(ps_script: Vec<Vec<PsEntry>>) -> Self {
        Self {
            ps_script: Mutex::new(ps_script.into()),
            exec_script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            logs_text: "log line one\nlog line two\n".to_string(),
        }
    }

    pub fn with_exec(self, results: Vec<ExecOutput>) -> Self {
        *self.exec_script.lock().unwrap() = results.into();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn version(&self) -> Result<String, OrchestratorError> {
        self.record("version");
        Ok("2.29.0-fake".to_string())
    }

    async fn pull(&self) -> Result<(), OrchestratorError> {
        self.record("pull");
        Ok(())
    }

    async fn up_detached(&self) -> Result<(), OrchestratorError> {
        self.record("up");
        Ok(())
    }

    async fn down(&self) -> Result<(), OrchestratorError> {
        self.record("down");
        Ok(())
    }

    async fn ps(&self) -> Result<Vec<PsEntry>, OrchestratorError> {
        self.record("ps");
        let mut script = self.ps_script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.pop_front().unwrap())
        } else {
            Ok(script.front().cloned().unwrap_or_default())
        }
    }

    async fn logs_tail(
        &self,
        service: Option<&str>,
        lines: u32,
    ) -> Result<String, OrchestratorError> {
        self.record(format!("logs:{}:{}", service.unwrap_or("*"), lines));
        Ok(self.logs_text.clone())
    }

    async fn exec(
        &self,
        service: &str,
        command: &[String],
    ) -> Result<ExecOutput, OrchestratorError> {
        self.record(format!("exec:{}:{}", service, command.join(" ")));
        let mut script = self.exec_script.lock().unwrap();
        Ok(script.pop_front().unwrap_or(ExecOutput {
            status_ok: true,
            stdout: b"ok".to_vec(),
            stderr: String::new(),
        }))
    }
}

/// `ps` entry for a service in the given state
pub fn entry(service: &str, state: &str, health: &str) -> PsEntry {
    PsEntry {
        name: format!("board-{}-1", service),
        service: service.to_string(),
        state: state.to_string(),
        health: health.to_string(),
        exit_code: 0,
    }
}

/// Descriptor with a runtime-trusting health check
pub fn service(name: &str, deps: &[&str]) -> ServiceDescriptor {
    ServiceDescriptor {
        name: name.to_string(),
        image: format!("example/{}:latest", name),
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
        data_dir: None,
        owner: None,
        health: HealthCheck {
            retries: 0,
            ..HealthCheck::default()
        },
    }
}

/// Descriptor judged ready by an in-container command
pub fn service_with_exec_probe(name: &str, command: &[&str]) -> ServiceDescriptor {
    let mut descriptor = service(name, &[]);
    descriptor.health.probe = Probe::Exec {
        command: command.iter().map(|c| c.to_string()).collect(),
    };
    descriptor
}
