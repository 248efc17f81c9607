//! End-to-end tests for the standard pipeline.
//!
//! The container engine is the in-memory mock runtime and the HTTP side is
//! scripted, so these run without Docker or network access.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use opera_core::{
    ContainerRole, ExecutionState, HttpProbe, Pipeline, PipelineContext,
    PipelineOptions, ProbeError, ProbeErrorKind, ReportError, Reporter, RunReport, StageStatus,
    Tuning,
};
use opera_runner::{LogSink, MockRuntime};

/// Refuses the first `refusals` probes, then answers.
struct ScriptedProbe {
    refusals: u32,
    calls: AtomicU32,
}

impl ScriptedProbe {
    fn up_after(refusals: u32) -> Arc<Self> {
        Arc::new(Self {
            refusals,
            calls: AtomicU32::new(0),
        })
    }

    fn never_up() -> Arc<Self> {
        Self::up_after(u32::MAX)
    }
}

#[async_trait]
impl HttpProbe for ScriptedProbe {
    async fn probe(&self, _url: &str) -> Result<(), ProbeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.refusals {
            Err(ProbeError::new(ProbeErrorKind::ConnectionRefused, "connection refused"))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<RunReport>>,
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, report: &RunReport) -> Result<(), ReportError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

fn options() -> PipelineOptions {
    PipelineOptions {
        app_build_cmd: "npm run build".to_string(),
        app_server_cmd: "npm start".to_string(),
        app_server_hostname: "dev.walmart.com".to_string(),
        mock_server_cmd: Some("npm run mock".to_string()),
        mock_server_hostname: "dev.walmart.com".to_string(),
        git_sha: "0a1b2c3".to_string(),
        github_org: "perf".to_string(),
        github_repo: "shopFront".to_string(),
        github_token: "token".to_string(),
        kairos_host: Some("kairos.local".to_string()),
        prefix: "rapido".to_string(),
        profile: "default".to_string(),
        resource_timing: false,
        sample_size: 5,
        screenshot: false,
        timestamp: 1_700_000_000_000,
        urls: vec!["http://dev.walmart.com:3000/".to_string()],
        builder_override: None,
        tuning: Tuning::default(),
    }
}

fn context(options: PipelineOptions, runtime: &MockRuntime) -> PipelineContext {
    let sink: LogSink = Arc::new(Mutex::new(Vec::<u8>::new()));
    PipelineContext::new(options, Arc::new(runtime.clone())).with_log_sink(sink)
}

fn status_of(report: &opera_core::PipelineReport, stage: &str) -> StageStatus {
    report.stage(stage).map(|s| s.status).unwrap()
}

/// A clean run creates every container, tears all of them down, and exits 0.
#[tokio::test(start_paused = true)]
async fn test_full_run_succeeds_and_cleans_up() {
    let runtime = MockRuntime::new();
    let reporter = Arc::new(RecordingReporter::default());
    let pipeline = Pipeline::standard(
        ScriptedProbe::up_after(2),
        Some(reporter.clone() as Arc<dyn Reporter>),
    );

    let report = pipeline.run(context(options(), &runtime)).await;

    assert_eq!(report.state, ExecutionState::Completed);
    assert!(report.stages.iter().all(|s| s.status == StageStatus::Succeeded));
    assert_eq!(report.exit_code(), 0);

    let mut created = runtime.created_ids();
    let mut removed = report.teardown.removed.clone();
    created.sort();
    removed.sort();
    assert_eq!(created, removed);
    assert_eq!(created.len(), 4);

    let reports = reporter.reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].tenant, "perf_shop_front");
    assert!(reports[0].load_tests[0].succeeded);
}

/// Stages after a failure never run and teardown still removes what exists.
#[tokio::test(start_paused = true)]
async fn test_build_failure_short_circuits() {
    let runtime = MockRuntime::new().exit_codes("electrode-app-builder", vec![137]);
    let pipeline = Pipeline::standard(ScriptedProbe::up_after(0), None);

    let report = pipeline.run(context(options(), &runtime)).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.stage, "build");
    assert_eq!(failure.kind, "non_zero_exit");
    assert!(failure.message.contains("returned status code 137"));
    for stage in ["mock-server", "app-server", "wait", "load-test", "report"] {
        assert_eq!(status_of(&report, stage), StageStatus::NotRun);
    }

    assert_eq!(runtime.created_ids().len(), 1);
    assert_eq!(runtime.removal_attempts(), runtime.created_ids());
    assert_eq!(report.exit_code(), 1);
}

/// An adopted builder container is never removed.
#[tokio::test(start_paused = true)]
async fn test_builder_override_is_protected() {
    let runtime = MockRuntime::new();
    let mut options = options();
    options.builder_override = Some("prebuilt-builder".to_string());

    let report = Pipeline::standard(ScriptedProbe::up_after(0), None)
        .run(context(options, &runtime))
        .await;

    assert!(report.succeeded());
    assert_eq!(report.teardown.protected, vec!["prebuilt-builder"]);
    assert!(!runtime
        .removal_attempts()
        .contains(&"prebuilt-builder".to_string()));
    let mock_config = &runtime.created_configs()[0];
    assert_eq!(mock_config.volumes_from, vec!["prebuilt-builder"]);
}

/// The mock-server stage is skipped without a command and the app server
/// points its hostname at the wildcard address instead.
#[tokio::test(start_paused = true)]
async fn test_without_mock_server() {
    let runtime = MockRuntime::new();
    let mut options = options();
    options.mock_server_cmd = None;

    let report = Pipeline::standard(ScriptedProbe::up_after(0), None)
        .run(context(options, &runtime))
        .await;

    assert!(report.succeeded());
    assert_eq!(status_of(&report, "mock-server"), StageStatus::Skipped);
    assert_eq!(status_of(&report, "report"), StageStatus::Skipped);
    let app = runtime
        .created_configs()
        .into_iter()
        .find(|c| c.image == "electrode-app")
        .unwrap();
    assert_eq!(app.extra_hosts, vec!["dev.walmart.com:0.0.0.0"]);
    assert!(app.links.is_empty());
}

/// Readiness gives up after the attempt budget and the load test never runs.
#[tokio::test(start_paused = true)]
async fn test_readiness_timeout() {
    let runtime = MockRuntime::new();
    let probe = ScriptedProbe::never_up();
    let pipeline = Pipeline::standard(probe.clone(), None);

    let report = pipeline.run(context(options(), &runtime)).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.stage, "wait");
    assert_eq!(failure.kind, "readiness_timeout");
    assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
    assert_eq!(status_of(&report, "load-test"), StageStatus::NotRun);
    assert!(!runtime
        .created_configs()
        .iter()
        .any(|c| c.image.starts_with("sitespeedio")));
    assert_eq!(report.teardown.removed.len(), 3);
}

/// One URL exhausting its retries does not affect another URL's outcome.
#[tokio::test(start_paused = true)]
async fn test_load_test_isolation() {
    for concurrent in [false, true] {
        let runtime = MockRuntime::new().exit_codes("http://broken/", vec![1]);
        let mut options = options();
        options.urls = vec!["http://broken/ http://healthy/".to_string()];
        options.tuning.load_test.concurrent = concurrent;

        let report = Pipeline::standard(ScriptedProbe::up_after(0), None)
            .run(context(options, &runtime))
            .await;

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.stage, "load-test");
        assert_eq!(failure.kind, "load_test_exhausted");
        assert!(failure.message.contains("http://broken/"));

        assert_eq!(report.load_tests.len(), 2);
        assert!(!report.load_tests[0].succeeded);
        assert_eq!(report.load_tests[0].attempts, 3);
        assert!(report.load_tests[1].succeeded);
        assert_eq!(report.load_tests[1].attempts, 1);

        let load_test_containers = report
            .containers
            .iter()
            .filter(|e| matches!(e.role, ContainerRole::LoadTest { .. }))
            .count();
        assert_eq!(load_test_containers, 4);
        assert_eq!(report.teardown.removed.len(), 7);
        assert_eq!(report.exit_code(), 1);
    }
}

/// Removal failures turn an otherwise successful run into exit code 1.
#[tokio::test(start_paused = true)]
async fn test_teardown_failures_are_reported() {
    let runtime = MockRuntime::new()
        .fail_remove("otto-mock-server")
        .fail_remove("electrode-app");

    let report = Pipeline::standard(ScriptedProbe::up_after(0), None)
        .run(context(options(), &runtime))
        .await;

    assert!(report.failure.is_none());
    assert_eq!(report.teardown.error_count(), 2);
    assert_eq!(report.teardown.removed.len(), 2);
    assert_eq!(runtime.removal_attempts().len(), 4);
    assert_eq!(report.exit_code(), 1);
}

/// The run report serializes for `--report-file`.
#[tokio::test(start_paused = true)]
async fn test_report_serializes() {
    let runtime = MockRuntime::new();
    let report = Pipeline::standard(ScriptedProbe::up_after(0), None)
        .run(context(options(), &runtime))
        .await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["state"], "completed");
    assert_eq!(json["stages"][0]["name"], "initialize");
    assert_eq!(json["containers"][0]["role"]["role"], "builder");
}
