#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use patient_flow_cell::{flow_routes, ClinicFlow};
use shared_utils::test_utils::{test_clock, test_day, MockClinicResponses, TestConfig};
use shared_utils::ManualClock;

pub struct TestClinic {
    pub server: MockServer,
    pub flow: Arc<ClinicFlow>,
    pub clock: ManualClock,
}

/// A flow wired to a mock clinic API that serves `day` and has already
/// loaded it.
pub async fn clinic_with_day(day: Value) -> TestClinic {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(day))
        .mount(&server)
        .await;

    let clock = test_clock();
    let config = TestConfig::with_url(&server.uri()).to_app_config();
    let flow = Arc::new(ClinicFlow::with_clock(&config, Arc::new(clock.clone())));
    flow.refresh(test_day()).await.expect("initial refresh");

    TestClinic { server, flow, clock }
}

/// Accept status writes for `id`, answering with `status`.
pub async fn accept_status(server: &MockServer, id: Uuid, status: &str) {
    Mock::given(method("PUT"))
        .and(path(format!("/appointments/{}/status", id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(MockClinicResponses::appointment_response(id, "09:00:00", status, None)),
        )
        .mount(server)
        .await;
}

/// Wait until the mock server has seen `count` requests matching `method`
/// and `path`.
pub async fn wait_for_request(server: &MockServer, method: &str, path: &str, count: usize) {
    for _ in 0..100 {
        let seen = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.method.as_str() == method && request.url.path() == path)
            .count();
        if seen >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} {} request(s) to {}", count, method, path);
}

pub async fn send(flow: &Arc<ClinicFlow>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = flow_routes(flow.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
