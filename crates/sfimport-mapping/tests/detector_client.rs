//! Integration tests for `HttpCategoryDetector` using wiremock HTTP mocks.

use sfimport_mapping::{
    CategoryDetector, CategoryHints, DetectionRequest, HttpCategoryDetector, MappingError,
    RetryPolicy,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> DetectionRequest {
    DetectionRequest {
        title: "Majica kratkih rukava crvena".to_string(),
        description: Some("100% pamuk".to_string()),
        hints: CategoryHints {
            domain: Some("odeća".to_string()),
            product_type: Some("majice".to_string()),
            keywords: vec!["kratki rukav".to_string()],
        },
    }
}

fn test_detector(base_url: &str) -> HttpCategoryDetector {
    HttpCategoryDetector::with_base_url(Some("test-key"), 5, base_url)
        .expect("detector construction should not fail")
        .with_retry(RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 0,
        })
}

#[tokio::test]
async fn detect_category_posts_request_and_parses_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/categories/detect"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "title": "Majica kratkih rukava crvena",
            "hints": { "domain": "odeća", "product_type": "majice" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "category_id": 2040,
            "confidence": 0.93,
            "reasoning": "apparel / t-shirts"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let detected = test_detector(&server.uri())
        .detect_category(&request())
        .await
        .expect("should parse detection");

    assert_eq!(detected.category_id, 2040);
    assert!((detected.confidence - 0.93).abs() < f64::EPSILON);
    assert_eq!(detected.reasoning.as_deref(), Some("apparel / t-shirts"));
}

#[tokio::test]
async fn reasoning_is_optional() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/categories/detect"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "category_id": 7, "confidence": 0.5 })),
        )
        .mount(&server)
        .await;

    let detected = test_detector(&server.uri())
        .detect_category(&request())
        .await
        .expect("should parse detection");
    assert_eq!(detected.category_id, 7);
    assert!(detected.reasoning.is_none());
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/categories/detect"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/categories/detect"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "category_id": 11, "confidence": 0.8 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let detected = test_detector(&server.uri())
        .detect_category(&request())
        .await
        .expect("third attempt should succeed");
    assert_eq!(detected.category_id, 11);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/categories/detect"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_detector(&server.uri())
        .detect_category(&request())
        .await
        .expect_err("401 must fail");
    assert!(matches!(
        err,
        MappingError::UnexpectedStatus { status: 401, .. }
    ));
}

#[tokio::test]
async fn malformed_body_is_a_deserialize_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/categories/detect"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_detector(&server.uri())
        .detect_category(&request())
        .await
        .expect_err("garbage body must fail");
    assert!(matches!(err, MappingError::Deserialize { .. }));
}
