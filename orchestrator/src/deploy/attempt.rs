//! Deployment attempt record and stage state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preconditions,
    Backup,
    Deploy,
    Verify,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Preconditions => Some(Stage::Backup),
            Stage::Backup => Some(Stage::Deploy),
            Stage::Deploy => Some(Stage::Verify),
            Stage::Verify => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Preconditions => "preconditions",
            Stage::Backup => "backup",
            Stage::Deploy => "deploy",
            Stage::Verify => "verify",
        }
    }

    /// Process exit code when the attempt aborts in this stage
    pub fn exit_code(&self) -> i32 {
        match self {
            Stage::Preconditions => 2,
            Stage::Backup => 3,
            Stage::Deploy => 4,
            Stage::Verify => 1,
        }
    }
}

/// Attempt state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    /// Created, nothing started
    Pending,

    /// A stage is executing
    Running(Stage),

    /// A stage finished, the next one has not started
    Passed(Stage),

    /// A stage failed; terminal
    Aborted { stage: Stage },

    /// Every fatal stage passed; terminal
    Succeeded { warning: Option<String> },
}

/// Attempt event
#[derive(Debug, Clone)]
pub enum AttemptEvent {
    /// A stage begins executing
    StageStarted(Stage),

    /// The running stage completed
    StagePassed,

    /// The running stage failed
    StageFailed(String),

    /// Verification downgraded its failure to a warning
    VerifyWarned(String),
}

/// Ephemeral record of one deployment run.
///
/// Created at invocation start, reported at the end, never persisted.
#[derive(Debug, Clone)]
pub struct DeploymentAttempt {
    id: Uuid,
    started_at: DateTime<Utc>,
    state: AttemptState,
    error: Option<String>,
    log_tail: Option<String>,
}

impl DeploymentAttempt {
    /// Create a new attempt in pending state
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: AttemptState::Pending,
            error: None,
            log_tail: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get current state
    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    /// Error message recorded by a failed stage, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Log tail collected from the failing service, if any
    pub fn log_tail(&self) -> Option<&str> {
        self.log_tail.as_deref()
    }

    /// Attach the recent log lines collected for diagnosis
    pub fn record_log_tail(&mut self, tail: String) {
        self.log_tail = Some(tail);
    }

    /// Stage the attempt aborted in, if it aborted
    pub fn failing_stage(&self) -> Option<Stage> {
        match self.state {
            AttemptState::Aborted { stage } => Some(stage),
            _ => None,
        }
    }

    /// Process exit code for the attempt's terminal state
    pub fn exit_code(&self) -> i32 {
        match &self.state {
            AttemptState::Succeeded { .. } => 0,
            AttemptState::Aborted { stage } => stage.exit_code(),
            _ => 1,
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: AttemptEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            // From Pending
            (AttemptState::Pending, AttemptEvent::StageStarted(Stage::Preconditions)) => {
                AttemptState::Running(Stage::Preconditions)
            }

            // From Running
            (AttemptState::Running(stage), AttemptEvent::StagePassed) => match stage.next() {
                Some(_) => AttemptState::Passed(*stage),
                None => AttemptState::Succeeded { warning: None },
            },
            (AttemptState::Running(stage), AttemptEvent::StageFailed(err)) => {
                self.error = Some(err.clone());
                AttemptState::Aborted { stage: *stage }
            }
            (AttemptState::Running(Stage::Verify), AttemptEvent::VerifyWarned(msg)) => {
                AttemptState::Succeeded {
                    warning: Some(msg.clone()),
                }
            }

            // From Passed
            (AttemptState::Passed(done), AttemptEvent::StageStarted(next))
                if done.next() == Some(*next) =>
            {
                AttemptState::Running(*next)
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeploymentAttempt {
    fn default() -> Self {
        Self::new()
    }
}
