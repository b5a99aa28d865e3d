use grsai_nodes::{
    grsai::{GenerationService, GrsaiClient, MockGenerationService},
    models::{GenerationRequest, Model, ReferenceImage},
    nodes::{self, NodeParams},
    Config, Error, JobDriver,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default()
        .with_api_key("sk-integration")
        .with_base_urls(server.uri(), server.uri());
    config.retry_base_delay = Duration::ZERO;
    config.poll_interval = Duration::from_millis(10);
    config.job_timeout = Duration::from_secs(5);
    config
}

fn driver_for(config: Config) -> JobDriver {
    let client = GrsaiClient::new(config.clone()).unwrap();
    JobDriver::new(Arc::new(client), &config)
}

fn succeeded(server: &MockServer, id: &str, files: &[&str]) -> serde_json::Value {
    let results: Vec<_> = files
        .iter()
        .map(|f| serde_json::json!({ "url": format!("{}/files/{}", server.uri(), f) }))
        .collect();
    serde_json::json!({
        "code": 0,
        "msg": "success",
        "data": { "id": id, "status": "succeeded", "progress": 100, "results": results }
    })
}

async fn serve_file(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_HEADER.to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_text_to_image_node_end_to_end() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/completions"))
        .and(header("authorization", "Bearer sk-integration"))
        .and(body_partial_json(serde_json::json!({
            "model": "sora-image",
            "variants": 2,
            "webHook": "-1",
            "shutProgress": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0, "msg": "success", "data": { "id": "job-sora" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(succeeded(&server, "job-sora", &["a.png", "b.png"])),
        )
        .mount(&server)
        .await;
    serve_file(&server, "a.png").await;
    serve_file(&server, "b.png").await;

    let driver = driver_for(config_for(&server));
    let mut params = NodeParams::new(Model::SoraImage);
    params.num_images = 2;

    let output = nodes::text_to_image(&driver, "a lighthouse at dusk", &params).await;

    assert!(output.is_success(), "status: {}", output.status);
    assert_eq!(output.images.len(), 2);
    assert_eq!(output.images[0], PNG_HEADER.to_vec());
    assert_eq!(output.status, "text-to-image | generated: 2/2 images");
}

#[tokio::test]
async fn test_image_to_image_uploads_reference_then_generates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/client/resource/newUploadToken"))
        .and(body_partial_json(serde_json::json!({ "sux": "png" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0,
            "msg": "success",
            "data": {
                "url": format!("{}/bucket", server.uri()),
                "key": "refs/input.png",
                "domain": "https://cdn.grsai.example/"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/nano-banana"))
        .and(body_partial_json(serde_json::json!({
            "model": "nano-banana",
            "urls": ["https://cdn.grsai.example/refs/input.png"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0, "msg": "success", "data": { "id": "job-edit" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(succeeded(&server, "job-edit", &["edit.png"])),
        )
        .mount(&server)
        .await;
    serve_file(&server, "edit.png").await;

    let driver = driver_for(config_for(&server));
    let params = NodeParams::new(Model::NanoBanana);

    let output = nodes::image_to_image(
        &driver,
        ReferenceImage::Bytes(PNG_HEADER.to_vec()),
        "make it snowy",
        &params,
    )
    .await;

    assert_eq!(output.status, "image-to-image | generated: 1/1 images");
    assert_eq!(output.images.len(), 1);
}

#[tokio::test]
async fn test_missing_api_key_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = Config::default().with_base_urls(server.uri(), server.uri());
    let client = GrsaiClient::new(config).unwrap();

    let err = client
        .submit(&GenerationRequest::text_to_image(Model::NanoBanana, "a fox"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
}

#[tokio::test]
async fn test_transient_poll_failures_are_retried_through_the_driver() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/nano-banana"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0, "msg": "success", "data": { "id": "job-flaky" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(succeeded(&server, "job-flaky", &["f.png"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let driver = driver_for(config_for(&server));
    let result = driver
        .generate(&GenerationRequest::text_to_image(Model::NanoBanana, "a fox"))
        .await
        .unwrap();

    assert_eq!(result.job_id, "job-flaky");
    assert_eq!(result.images.len(), 1);
}

#[tokio::test]
async fn test_stuck_job_times_out_through_the_driver() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/draw/nano-banana"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0, "msg": "success", "data": { "id": "job-stuck" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/draw/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0,
            "msg": "success",
            "data": { "id": "job-stuck", "status": "running", "progress": 40 }
        })))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.job_timeout = Duration::from_millis(150);
    let driver = driver_for(config);

    let err = driver
        .generate(&GenerationRequest::text_to_image(Model::NanoBanana, "a fox"))
        .await
        .unwrap_err();

    match err {
        Error::Timeout { job_id, elapsed } => {
            assert_eq!(job_id, "job-stuck");
            assert!(elapsed >= Duration::from_millis(150));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_node_reports_partial_success_with_mock() {
    let mock = Arc::new(MockGenerationService::new().with_failure("storm", "output_moderation"));
    let driver = JobDriver::with_limits(mock.clone(), Duration::from_secs(5), 2);

    let prompts = vec!["calm sea".to_string(), "storm".to_string(), "meadow".to_string()];
    let output = nodes::batch_generate(&driver, &prompts, &NodeParams::new(Model::NanoBanana)).await;

    assert_eq!(output.images.len(), 2);
    assert_eq!(
        output.status,
        "batch | prompts succeeded: 2/3 | images: 2/3 | failed: 1"
    );
    assert_eq!(mock.get_submit_count(), 3);
}

#[tokio::test]
async fn test_every_job_failing_yields_failed_status() {
    let mock = Arc::new(MockGenerationService::new().with_failure("doomed", "output_moderation"));
    let driver = JobDriver::with_limits(mock, Duration::from_secs(5), 2);

    let mut params = NodeParams::new(Model::NanoBanana);
    params.num_images = 2;
    let output = nodes::text_to_image(&driver, "doomed", &params).await;

    assert!(!output.is_success());
    assert!(output.status.starts_with("failed: All image generations failed."));
    assert!(output.status.contains("output_moderation"));
}
