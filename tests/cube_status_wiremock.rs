mod support;

use anyhow::Result;
use cubewatch::cube::{CubeStatus, BROWSER_USER_AGENT};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{client, mount_nav, nav_body, not_found_body, refused_body, requests_to, NAV_PATH};

#[tokio::test]
async fn malformed_id_is_invalid_without_any_request() -> Result<()> {
    let server = MockServer::start().await;

    for raw in ["", "ZH12345", "ZH12345678", "XX123456", "ZH12a456", " zh123456 "] {
        let status = client(&server, raw).check_status().await;
        assert_eq!(status, CubeStatus::InvalidFormat, "id {raw:?}");
    }

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty(), "expected no HTTP requests");
    Ok(())
}

#[tokio::test]
async fn lowercase_id_is_normalized_before_the_request() -> Result<()> {
    let server = MockServer::start().await;
    mount_nav(&server, "ZH123456", 200, nav_body("Test", &[("2024-06-01", 1.1)])).await;

    let status = client(&server, "zh123456").check_status().await;
    assert_eq!(status, CubeStatus::Active);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let cookie = requests[0]
        .headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(cookie, support::TOKEN);
    Ok(())
}

#[tokio::test]
async fn requests_carry_browser_headers() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(NAV_PATH))
        .and(query_param("cube_symbol", "ZH123456"))
        .and(header("user-agent", BROWSER_USER_AGENT))
        .and(header("content-type", "application/json"))
        .and(header("cookie", support::TOKEN))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(nav_body("Test", &[("2024-06-01", 1.1)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Anything the mock rejects gets an empty 404 and reads as an unknown error.
    let status = client(&server, "ZH123456").check_status().await;
    assert_eq!(status, CubeStatus::Active);
    Ok(())
}

#[tokio::test]
async fn missing_cube_is_not_found_even_with_error_status() -> Result<()> {
    let server = MockServer::start().await;
    mount_nav(&server, "ZH000001", 400, not_found_body()).await;

    let status = client(&server, "ZH000001").check_status().await;
    assert_eq!(status, CubeStatus::NotFound);
    Ok(())
}

#[tokio::test]
async fn numeric_not_found_code_is_recognized() -> Result<()> {
    let server = MockServer::start().await;
    mount_nav(&server, "ZH000002", 400, json!({"error_code": 20809})).await;

    let status = client(&server, "ZH000002").check_status().await;
    assert_eq!(status, CubeStatus::NotFound);
    Ok(())
}

#[tokio::test]
async fn other_error_envelope_is_unknown_error() -> Result<()> {
    let server = MockServer::start().await;
    mount_nav(&server, "ZH000003", 200, refused_body()).await;

    let status = client(&server, "ZH000003").check_status().await;
    assert_eq!(status, CubeStatus::UnknownError);
    // Status checks never retry.
    assert_eq!(requests_to(&server, NAV_PATH).await, 1);
    Ok(())
}

#[tokio::test]
async fn undecodable_body_is_unknown_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(path(NAV_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
        .mount(&server)
        .await;

    let status = client(&server, "ZH000004").check_status().await;
    assert_eq!(status, CubeStatus::UnknownError);
    Ok(())
}

#[tokio::test]
async fn empty_history_is_closed() -> Result<()> {
    let server = MockServer::start().await;
    mount_nav(&server, "ZH000005", 200, nav_body("Fresh", &[])).await;

    let report = client(&server, "ZH000005").inspect_status().await;
    assert_eq!(report.status, CubeStatus::Closed);
    assert_eq!(report.last_valuation, None);
    Ok(())
}

#[tokio::test]
async fn empty_series_array_is_closed() -> Result<()> {
    let server = MockServer::start().await;
    mount_nav(&server, "ZH000006", 200, json!([])).await;

    let status = client(&server, "ZH000006").check_status().await;
    assert_eq!(status, CubeStatus::Closed);
    Ok(())
}

#[tokio::test]
async fn staleness_threshold_boundary() -> Result<()> {
    let server = MockServer::start().await;
    // Today is 2024-06-03.
    mount_nav(&server, "ZH000010", 200, nav_body("Ten", &[("2024-05-24", 1.0)])).await;
    mount_nav(&server, "ZH000011", 200, nav_body("Eleven", &[("2024-05-23", 1.0)])).await;
    mount_nav(&server, "ZH000012", 200, nav_body("Four", &[("2024-05-30", 1.0)])).await;

    let ten = client(&server, "ZH000010").inspect_status().await;
    assert_eq!(ten.status, CubeStatus::Active);
    assert_eq!(ten.days_since, Some(10));
    assert!(ten.needs_review);

    let eleven = client(&server, "ZH000011").inspect_status().await;
    assert_eq!(eleven.status, CubeStatus::Closed);
    assert_eq!(eleven.days_since, Some(11));
    assert!(eleven.needs_review);

    let four = client(&server, "ZH000012").inspect_status().await;
    assert_eq!(four.status, CubeStatus::Active);
    assert!(!four.needs_review);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_unknown_error() -> Result<()> {
    let server = MockServer::start().await;
    let client = client(&server, "ZH000007");
    drop(server);

    assert_eq!(client.check_status().await, CubeStatus::UnknownError);
    Ok(())
}
