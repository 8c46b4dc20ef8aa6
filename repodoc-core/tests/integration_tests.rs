//! Integration tests for repodoc-core infrastructure

use repodoc_core::{
    config_error, not_found_error, repository_error, storage_error, validation_error,
    AnalysisEvent, AnalysisJob, AnalysisStep, ErrorContext, JobStatus, OverviewState,
    RepodocConfig, RepodocError,
};

#[test]
fn test_error_handling() {
    let error = repository_error!("Test repository error", "test_component");

    match &error {
        RepodocError::Repository {
            message, context, ..
        } => {
            assert_eq!(message, "Test repository error");
            assert_eq!(context.component, "test_component");
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Repository error"),
    }

    // Should not panic without a subscriber
    error.log();

    let network_error = RepodocError::Network {
        message: "Connection failed".to_string(),
        source: None,
        context: ErrorContext::new("test"),
    };
    assert!(network_error.is_recoverable());
    assert!(network_error.retry_delay_ms().is_some());

    let config_error = config_error!("Invalid config", "test");
    assert!(!config_error.is_recoverable());
    assert!(config_error.retry_delay_ms().is_none());
}

#[test]
fn test_error_macros_carry_context() {
    let not_found = not_found_error!("acme/missing", "github");
    assert!(not_found.is_not_found());
    assert!(!not_found
        .context()
        .map(|c| c.recovery_suggestions.is_empty())
        .unwrap_or(true));

    let validation = validation_error!("bad range", "start_line", "fragmenter");
    match validation {
        RepodocError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("start_line")),
        _ => panic!("Expected Validation error"),
    }

    let storage = storage_error!(
        "write failed",
        "sqlite",
        std::io::Error::new(std::io::ErrorKind::Other, "disk full")
    );
    assert!(std::error::Error::source(&storage).is_some());
}

#[test]
fn test_rate_limit_retry_hint() {
    let error = RepodocError::RateLimit {
        message: "API rate limit exceeded".to_string(),
        retry_after_ms: Some(30_000),
        context: ErrorContext::new("github"),
    };
    assert!(error.is_recoverable());
    assert_eq!(error.retry_delay_ms(), Some(30_000));
}

#[test]
fn test_new_job_is_pending_without_overview() {
    let job = AnalysisJob::new("repo-1", "user-1", "main");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress.current_step, AnalysisStep::Fetching);
    assert_eq!(job.progress.percentage, 0);
    assert_eq!(job.overview, OverviewState::NotRequested);
    assert!(job.error.is_none());
}

#[test]
fn test_job_serializes_step_durations_by_name() {
    let mut job = AnalysisJob::new("repo-1", "user-1", "main");
    job.performance
        .step_durations
        .insert(AnalysisStep::Fragmenting, 12);

    let json = serde_json::to_value(&job).unwrap();
    assert_eq!(json["performance"]["step_durations"]["fragmenting"], 12);

    let restored: AnalysisJob = serde_json::from_value(json).unwrap();
    assert_eq!(restored, job);
}

#[test]
fn test_event_payloads() {
    let event = AnalysisEvent::Progress {
        analysis_id: "a-1".to_string(),
        step: AnalysisStep::Analyzing,
        percentage: 72,
        message: "Analyzed 3/5 code chunks".to_string(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "progress");
    assert_eq!(json["step"], "analyzing");
    assert_eq!(event.analysis_id(), "a-1");
}

#[test]
fn test_config_defaults_match_fetch_rules() {
    let config = RepodocConfig::default();
    assert!(config.repository.excluded_dirs.contains(&"node_modules".to_string()));
    assert!(config.repository.excluded_files.contains(&"yarn.lock".to_string()));
    assert!(config.repository.supported_extensions.contains(&".rs".to_string()));
    assert!(config.repository.special_files.contains(&"Makefile".to_string()));
}
