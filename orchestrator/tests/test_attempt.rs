//! Attempt state machine tests

use deckhand::deploy::attempt::{AttemptEvent, AttemptState, DeploymentAttempt, Stage};

#[test]
fn test_attempt_initial_state() {
    let attempt = DeploymentAttempt::new();
    assert_eq!(attempt.state(), &AttemptState::Pending);
    assert!(attempt.error().is_none());
    assert!(attempt.failing_stage().is_none());
}

#[test]
fn test_attempt_success_flow() {
    let mut attempt = DeploymentAttempt::new();

    for stage in [Stage::Preconditions, Stage::Backup, Stage::Deploy, Stage::Verify] {
        attempt.process(AttemptEvent::StageStarted(stage)).unwrap();
        attempt.process(AttemptEvent::StagePassed).unwrap();
    }

    assert_eq!(attempt.state(), &AttemptState::Succeeded { warning: None });
    assert_eq!(attempt.exit_code(), 0);
}

#[test]
fn test_attempt_verify_warning_still_succeeds() {
    let mut attempt = DeploymentAttempt::new();

    for stage in [Stage::Preconditions, Stage::Backup, Stage::Deploy] {
        attempt.process(AttemptEvent::StageStarted(stage)).unwrap();
        attempt.process(AttemptEvent::StagePassed).unwrap();
    }
    attempt
        .process(AttemptEvent::StageStarted(Stage::Verify))
        .unwrap();
    attempt
        .process(AttemptEvent::VerifyWarned(
            "https://board.example.com/health unreachable".to_string(),
        ))
        .unwrap();

    match attempt.state() {
        AttemptState::Succeeded { warning: Some(msg) } => assert!(msg.contains("unreachable")),
        other => panic!("expected success with warning, got {:?}", other),
    }
    assert_eq!(attempt.exit_code(), 0);
}

#[test]
fn test_attempt_exit_codes_per_stage() {
    for (stage, code) in [
        (Stage::Preconditions, 2),
        (Stage::Backup, 3),
        (Stage::Deploy, 4),
    ] {
        let mut attempt = DeploymentAttempt::new();
        attempt
            .process(AttemptEvent::StageStarted(Stage::Preconditions))
            .unwrap();
        let mut current = Stage::Preconditions;
        while current != stage {
            attempt.process(AttemptEvent::StagePassed).unwrap();
            current = current.next().unwrap();
            attempt
                .process(AttemptEvent::StageStarted(current))
                .unwrap();
        }
        attempt
            .process(AttemptEvent::StageFailed("boom".to_string()))
            .unwrap();

        assert_eq!(attempt.failing_stage(), Some(stage));
        assert_eq!(attempt.exit_code(), code);
    }
}

#[test]
fn test_verify_never_starts_after_deploy_failure() {
    let mut attempt = DeploymentAttempt::new();

    for stage in [Stage::Preconditions, Stage::Backup] {
        attempt.process(AttemptEvent::StageStarted(stage)).unwrap();
        attempt.process(AttemptEvent::StagePassed).unwrap();
    }
    attempt
        .process(AttemptEvent::StageStarted(Stage::Deploy))
        .unwrap();
    attempt
        .process(AttemptEvent::StageFailed("service web exited".to_string()))
        .unwrap();

    assert!(attempt
        .process(AttemptEvent::StageStarted(Stage::Verify))
        .is_err());
    assert_eq!(attempt.exit_code(), 4);
    assert_eq!(attempt.error(), Some("service web exited"));
}

#[test]
fn test_log_tail_is_recorded() {
    let mut attempt = DeploymentAttempt::new();
    attempt.record_log_tail("last lines".to_string());
    assert_eq!(attempt.log_tail(), Some("last lines"));
}
