//! BigQuery REST client tests against a mock jobs API

use serde_json::json;
use std::time::Duration;
use testload::warehouse::{
    BigQuery, BulkLoader, JobHandle, JobPhase, LoadConfig, LoadRequest, TableRef, Warehouse,
    WarehouseConfig,
};
use testload::Error;
use wiremock::{
    matchers::{body_partial_json, header, method, path, path_regex, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn warehouse_config(server: &MockServer) -> WarehouseConfig {
    WarehouseConfig {
        api_url: server.uri(),
        access_token: Some("test-token".to_string()),
        location: Some("EU".to_string()),
        ..WarehouseConfig::new("proj", "ci", "go_tests")
    }
}

fn load_request() -> LoadRequest {
    LoadRequest::append_ndjson(
        "gs://results/acme/widgets/main/42-test-abc123",
        TableRef::new("proj", "ci", "go_tests"),
    )
}

fn job_handle() -> JobHandle {
    JobHandle {
        project_id: "proj".to_string(),
        job_id: "testload_fixed".to_string(),
        location: Some("EU".to_string()),
    }
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_submit_load_posts_append_job() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/proj/jobs"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "jobReference": {"projectId": "proj", "location": "EU"},
            "configuration": {
                "load": {
                    "sourceUris": ["gs://results/acme/widgets/main/42-test-abc123"],
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "autodetect": true,
                    "writeDisposition": "WRITE_APPEND",
                    "destinationTable": {
                        "projectId": "proj",
                        "datasetId": "ci",
                        "tableId": "go_tests"
                    }
                }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "proj", "jobId": "testload_fixed", "location": "EU"},
            "status": {"state": "PENDING"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let bigquery = BigQuery::new(&warehouse_config(&server)).unwrap();
    let handle = bigquery.submit_load(&load_request()).await.unwrap();

    assert_eq!(handle, job_handle());
}

#[tokio::test]
async fn test_submit_load_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/proj/jobs"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "Access Denied: Dataset proj:ci",
                "status": "PERMISSION_DENIED"
            }
        })))
        .mount(&server)
        .await;

    let bigquery = BigQuery::new(&warehouse_config(&server)).unwrap();
    let err = bigquery.submit_load(&load_request()).await.unwrap_err();

    assert!(matches!(err, Error::Submission(_)));
    assert!(err.to_string().contains("Access Denied: Dataset proj:ci"));
}

#[tokio::test]
async fn test_submit_without_token_sends_no_authorization() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/proj/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "proj", "jobId": "testload_fixed"}
        })))
        .mount(&server)
        .await;

    let config = WarehouseConfig {
        access_token: None,
        location: None,
        ..warehouse_config(&server)
    };
    let bigquery = BigQuery::new(&config).unwrap();
    bigquery.submit_load(&load_request()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

// ============================================================================
// Status polling
// ============================================================================

#[tokio::test]
async fn test_job_status_reads_output_rows() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/proj/jobs/testload_fixed"))
        .and(query_param("location", "EU"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "proj", "jobId": "testload_fixed"},
            "status": {"state": "DONE"},
            "statistics": {"load": {"inputFiles": "1", "outputRows": "812"}}
        })))
        .mount(&server)
        .await;

    let bigquery = BigQuery::new(&warehouse_config(&server)).unwrap();
    let status = bigquery.job_status(&job_handle()).await.unwrap();

    assert_eq!(status.phase, JobPhase::Done);
    assert_eq!(status.error, None);
    assert_eq!(status.output_rows, Some(812));
}

#[tokio::test]
async fn test_job_status_server_error_is_wait_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/bigquery/v2/projects/proj/jobs/.+$"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let bigquery = BigQuery::new(&warehouse_config(&server)).unwrap();
    let err = bigquery.job_status(&job_handle()).await.unwrap_err();

    match err {
        Error::Wait { job_id, message } => {
            assert_eq!(job_id, "testload_fixed");
            assert!(message.contains("503"));
            assert!(message.contains("backend unavailable"));
        },
        other => panic!("expected wait error, got {other:?}"),
    }
}

// ============================================================================
// Loader over REST
// ============================================================================

#[tokio::test]
async fn test_loader_surfaces_error_result() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/proj/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "proj", "jobId": "testload_fixed", "location": "EU"},
            "status": {"state": "RUNNING"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/proj/jobs/testload_fixed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": {
                "state": "DONE",
                "errorResult": {
                    "reason": "invalid",
                    "message": "Error while reading data, error message: JSON table encountered too many errors"
                }
            }
        })))
        .mount(&server)
        .await;

    let bigquery = BigQuery::new(&warehouse_config(&server)).unwrap();
    let load_config = LoadConfig {
        poll_interval: Duration::from_millis(10),
        timeout: Some(Duration::from_secs(30)),
    };

    let err = BulkLoader::new(&bigquery, &load_config)
        .run(&load_request())
        .await
        .unwrap_err();

    match err {
        Error::Load { job_id, message } => {
            assert_eq!(job_id, "testload_fixed");
            assert!(message.starts_with("invalid: Error while reading data"));
        },
        other => panic!("expected load error, got {other:?}"),
    }
}
