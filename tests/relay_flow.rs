//! End-to-end relay through real backend services.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mrt_relay::admin::{self, AdminState};
use mrt_relay::config::SourceConfig;
use mrt_relay::lifecycle::Shutdown;
use mrt_relay::relay::source::load_payloads;
use mrt_relay::relay::{JsonReportSink, MetricsAggregator, Relay, Source, Stage, TracingSink};
use mrt_relay::service::{Classification, Classifier, ClassifyError, ServiceResponse};

mod common;

#[tokio::test]
async fn request_crosses_both_groups() {
    let shutdown = Shutdown::new();
    let lb1 = common::start_services(2, &shutdown).await;
    let lb2 = common::start_services(2, &shutdown).await;
    let relay = Relay::from_config(&common::relay_config(&lb1, &lb2)).unwrap();

    let outcome = relay.dispatch(&common::jpeg(0x10, 256)).await.unwrap();

    match serde_json::from_slice::<ServiceResponse>(&outcome.response).unwrap() {
        ServiceResponse::Success { class, confidence, .. } => {
            assert_eq!(class, "car");
            assert!((0.5..=1.0).contains(&confidence));
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert!(lb1.contains(&outcome.lb1_backend));
    assert!(lb2.contains(&outcome.lb2_backend));

    let record = outcome.record;
    assert_eq!(record.total(), record.stages().map(|(_, d)| d).sum::<Duration>());
    assert_eq!(record.average_intermediate(), record.total() / 6);

    let lb2_status = relay.lb2().status(&outcome.lb2_backend).unwrap();
    assert!(lb2_status.available);
    assert_eq!(lb2_status.error_count, 0);
    assert_eq!(
        lb2_status.response_time,
        Some(record.total() - record.stage(Stage::SourceToLb1) - record.stage(Stage::Lb1ToBackend))
    );

    shutdown.trigger();
}

/// Classifier that takes a fixed time per image.
struct SlowClassifier(Duration);

impl Classifier for SlowClassifier {
    fn classify(&self, _image: &[u8]) -> Result<Classification, ClassifyError> {
        std::thread::sleep(self.0);
        Ok(Classification {
            label: "car".to_string(),
            confidence: 0.9,
        })
    }
}

#[tokio::test]
async fn classification_time_lands_in_processing_stage() {
    let work = Duration::from_millis(300);
    let shutdown = Shutdown::new();
    let lb1 = common::start_service_with(SlowClassifier(work), &shutdown).await;
    let lb2 = common::start_service_with(SlowClassifier(work), &shutdown).await;
    let relay = Relay::from_config(&common::relay_config(&[lb1], &[lb2])).unwrap();

    let outcome = relay.dispatch(&common::jpeg(0x10, 64)).await.unwrap();
    let record = outcome.record;

    // Exactly one classification, and it runs on the processing hop.
    assert!(record.stage(Stage::Processing) >= work);
    for stage in Stage::ALL.iter().filter(|s| s.is_network()) {
        assert!(record.stage(*stage) < work, "{} took {:?}", stage, record.stage(*stage));
    }
    assert!(record.network() < work);
    assert!(record.total() < work * 2);

    match serde_json::from_slice::<ServiceResponse>(&outcome.response).unwrap() {
        ServiceResponse::Success { class, processing_time, .. } => {
            assert_eq!(class, "car");
            assert!(processing_time >= work.as_secs_f64());
        }
        other => panic!("expected success, got {:?}", other),
    }

    shutdown.trigger();
}

#[tokio::test]
async fn invalid_payload_is_an_error_frame_not_a_failure() {
    let shutdown = Shutdown::new();
    let lb1 = common::start_services(1, &shutdown).await;
    let lb2 = common::start_services(1, &shutdown).await;
    let relay = Relay::from_config(&common::relay_config(&lb1, &lb2)).unwrap();

    let outcome = relay.dispatch(b"plain text, not an image").await.unwrap();
    let response: ServiceResponse = serde_json::from_slice(&outcome.response).unwrap();
    assert!(matches!(response, ServiceResponse::Error { .. }));
    assert_eq!(relay.lb1().status(&lb1[0]).unwrap().error_count, 0);

    shutdown.trigger();
}

#[tokio::test]
async fn source_run_writes_report() {
    let shutdown = Shutdown::new();
    let lb1 = common::start_services(2, &shutdown).await;
    let lb2 = common::start_services(2, &shutdown).await;
    let relay = Arc::new(Relay::from_config(&common::relay_config(&lb1, &lb2)).unwrap());

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("dark.jpg"), common::jpeg(0x05, 128)).unwrap();
    std::fs::write(dir.path().join("bright.jpg"), common::jpeg(0xf0, 128)).unwrap();
    let report_path = dir.path().join("performance_data.json");

    let config = SourceConfig {
        request_rate: 10.0,
        duration_secs: Some(1),
        payload_dir: dir.path().display().to_string(),
        report_path: None,
    };
    let aggregator = Arc::new(MetricsAggregator::new());
    let source = Source::new(
        Arc::clone(&relay),
        Arc::clone(&aggregator),
        load_payloads(dir.path()).unwrap(),
        &config,
    )
    .unwrap()
    .with_sink(TracingSink)
    .with_sink(JsonReportSink::new(&report_path));

    let report = source.run(shutdown.subscribe()).await;
    assert!(report.successes >= 5, "only {} successes", report.successes);
    assert_eq!(report.failures, 0);
    assert_eq!(report.summary.requests, report.successes);
    assert!(report.summary.mrt > Duration::ZERO);
    assert_eq!(report.summary.network + report.summary.processing, report.summary.mrt);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(written["successes"], report.successes);
    assert_eq!(written["records"].as_array().unwrap().len() as u64, report.successes);

    shutdown.trigger();
}

#[tokio::test]
async fn admin_api_requires_key_and_reports_state() {
    let shutdown = Shutdown::new();
    let lb1 = common::start_services(1, &shutdown).await;
    let lb2 = common::start_services(1, &shutdown).await;
    let relay = Relay::from_config(&common::relay_config(&lb1, &lb2)).unwrap();
    let aggregator = Arc::new(MetricsAggregator::new());

    let outcome = relay.dispatch(&common::jpeg(0x80, 64)).await.unwrap();
    aggregator.record(outcome.record);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AdminState {
        lb1: Arc::clone(relay.lb1()),
        lb2: Arc::clone(relay.lb2()),
        aggregator,
        api_key: Arc::from("test-key"),
        started: Instant::now(),
    };
    let server = tokio::spawn(admin::serve(listener, state, shutdown.subscribe()));

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let base = format!("http://{}", addr);

    let res = client.get(format!("{}/admin/status", base)).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(format!("{}/admin/status", base))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let status: serde_json::Value = client
        .get(format!("{}/admin/status", base))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["requests"], 1);

    let groups: serde_json::Value = client
        .get(format!("{}/admin/backends", base))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(groups[0]["group"], "lb1");
    assert_eq!(groups[1]["group"], "lb2");
    assert_eq!(groups[0]["backends"][0]["address"], lb1[0].to_string());
    assert_eq!(groups[0]["backends"][0]["available"], true);

    let summary: serde_json::Value = client
        .get(format!("{}/admin/summary", base))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["requests"], 1);
    assert_eq!(summary["stages"].as_array().unwrap().len(), 6);

    shutdown.trigger();
    server.await.unwrap().unwrap();
}
