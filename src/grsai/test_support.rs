use super::client::GrsaiHttpClient;
use super::GrsaiClient;
use crate::config::Config;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockBuilder, MockServer};

pub const RESULT_PATH: &str = "/v1/draw/result";
pub const UPLOAD_TOKEN_PATH: &str = "/client/resource/newUploadToken";

/// Config pointing both API hosts at the mock server, with zero backoff and
/// a short poll interval so retry tests run instantly.
pub fn config(server: &MockServer) -> Config {
    let mut config = Config::default()
        .with_api_key("sk-test")
        .with_base_urls(server.uri(), server.uri());
    config.retry_base_delay = Duration::ZERO;
    config.poll_interval = Duration::from_millis(10);
    config.request_timeout = Duration::from_secs(5);
    config
}

pub fn http_client(server: &MockServer) -> GrsaiHttpClient {
    GrsaiHttpClient::new(&config(server)).unwrap()
}

pub fn grsai_client(server: &MockServer) -> GrsaiClient {
    GrsaiClient::new(config(server)).unwrap()
}

pub fn post_path(p: &str) -> MockBuilder {
    Mock::given(method("POST")).and(path(p.to_string()))
}

pub fn job_body(id: &str, status: &str, urls: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "code": 0,
        "msg": "success",
        "data": {
            "id": id,
            "status": status,
            "progress": if status == "succeeded" { 100 } else { 30 },
            "results": urls.iter().map(|u| serde_json::json!({ "url": u })).collect::<Vec<_>>(),
            "failure_reason": "",
            "error": ""
        }
    })
}

pub fn submit_body(id: &str) -> serde_json::Value {
    serde_json::json!({ "code": 0, "msg": "success", "data": { "id": id } })
}
