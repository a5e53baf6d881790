#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use cubewatch::calendar::CalendarZone;
use cubewatch::clock::FixedClock;
use cubewatch::config::{ClientConfig, RetryConfig};
use cubewatch::cube::{ClientContext, CubeClient, XueqiuHttp};
use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "xq_a_token=test-token; u=1";

pub const NAV_PATH: &str = "/cubes/nav_daily/all.json";
pub const HISTORY_PATH: &str = "/cubes/rebalancing/history.json";

/// 2024-06-03 (a Monday) 12:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
}

pub fn http(server: &MockServer) -> XueqiuHttp {
    XueqiuHttp::new(SecretString::from(TOKEN))
        .expect("http client")
        .with_base_url(server.uri())
}

/// Client policy with millisecond retry waits.
pub fn fast_policy(max_attempts: u32) -> ClientConfig {
    ClientConfig {
        retry: RetryConfig {
            max_attempts,
            delay: Duration::from_millis(5),
            backoff: 1.0,
            max_delay: Duration::from_millis(20),
        },
        ..ClientConfig::default()
    }
}

pub fn context(server: &MockServer) -> ClientContext {
    let mut context = ClientContext::new(http(server));
    context.clock = Arc::new(FixedClock::new(fixed_now()));
    context.zone = CalendarZone::Utc;
    context.policy = fast_policy(3);
    context
}

pub fn client(server: &MockServer, id: &str) -> CubeClient {
    CubeClient::new(id, http(server))
        .with_clock(Arc::new(FixedClock::new(fixed_now())))
        .with_zone(CalendarZone::Utc)
        .with_policy(fast_policy(3))
}

pub fn nav_body(name: &str, points: &[(&str, f64)]) -> Value {
    let list: Vec<Value> = points
        .iter()
        .map(|(date, value)| json!({"date": date, "value": value, "percent": 0.0}))
        .collect();
    json!([
        {"symbol": "ZH000000", "name": name, "list": list},
        {"symbol": "SH000300", "name": "CSI 300", "list": []}
    ])
}

pub fn not_found_body() -> Value {
    json!({"error_code": "20809", "error_description": "cube does not exist"})
}

pub fn refused_body() -> Value {
    json!({"error_code": "400016", "error_description": "please try again later"})
}

pub fn millis(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .timestamp_millis()
}

pub fn history_event(category: &str, status: &str, updated_at: i64) -> Value {
    json!({
        "id": updated_at,
        "category": category,
        "status": status,
        "updated_at": updated_at,
        "rebalancing_histories": [{
            "stock_name": "Kweichow Moutai",
            "stock_symbol": "SH600519",
            "prev_weight": null,
            "target_weight": 5.0,
            "price": 1500.0,
            "updated_at": updated_at
        }]
    })
}

pub fn history_body(events: Vec<Value>) -> Value {
    json!({"count": events.len(), "page": 1, "totalCount": events.len(), "list": events})
}

pub async fn mount_nav(server: &MockServer, cube: &str, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path(NAV_PATH))
        .and(query_param("cube_symbol", cube))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_history(server: &MockServer, cube: &str, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .and(query_param("cube_symbol", cube))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}
