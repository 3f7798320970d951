//! API integration tests for rendering, publishing and image retrieval.
//!
//! Tests verify:
//! - Direct PNG responses and their geometry
//! - Self-hosted URLs and their expiry
//! - External uploads and the fallback when they fail
//! - HTTP response codes, headers and error bodies

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Duration;
use serde_json::json;

use htmlshot::error::RenderError;
use htmlshot::render::png_dimensions;
use htmlshot::server::{RouterConfig, UPLOAD_ERROR_HEADER};
use htmlshot::store::ImageId;

use super::test_utils::{
    body_bytes, body_json, get, is_valid_png, post_json, FailingUploader, MockRenderer,
    MockUploader, TestApp,
};

/// Extract the image id from a self-hosted URL.
fn image_id_from_url(url: &str) -> ImageId {
    let id = url
        .rsplit_once("/image/")
        .map(|(_, id)| id)
        .expect("URL should contain /image/");
    id.parse().expect("URL should end with a valid image id")
}

// =============================================================================
// Direct Rendering
// =============================================================================

#[tokio::test]
async fn test_screenshot_full_page_defaults() {
    let app = TestApp::new(MockRenderer::new().with_page_height(1500));

    let response = app
        .send(post_json("/screenshot", json!({"html": "<h1>Hello</h1>"})))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=screenshot.png"
    );
    assert_eq!(response.headers()["x-image-width"], "2400");
    assert_eq!(response.headers()["x-image-height"], "3000");

    let body = body_bytes(response).await;
    assert!(is_valid_png(&body));
    // Default width 1200 at scale 2, full document height at scale 2
    assert_eq!(png_dimensions(&body), Some((2400, 3000)));
}

#[tokio::test]
async fn test_screenshot_short_page_keeps_viewport_height() {
    let app = TestApp::new(MockRenderer::new().with_page_height(200));

    let response = app
        .send(post_json(
            "/screenshot",
            json!({"html": "<p>short</p>", "deviceScaleFactor": 1}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert_eq!(png_dimensions(&body), Some((1200, 800)));
}

#[tokio::test]
async fn test_screenshot_fixed_viewport() {
    let app = TestApp::new(MockRenderer::new().with_page_height(5000));

    let response = app
        .send(post_json(
            "/screenshot",
            json!({"html": "<p>x</p>", "width": 640, "height": 480, "deviceScaleFactor": 1.5}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert_eq!(png_dimensions(&body), Some((960, 720)));
}

#[tokio::test]
async fn test_screenshot_does_not_store_image() {
    let app = TestApp::new(MockRenderer::new());

    let response = app
        .send(post_json("/screenshot", json!({"html": "<p>x</p>"})))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.is_empty().await);
}

// =============================================================================
// Input Validation
// =============================================================================

#[tokio::test]
async fn test_empty_html_rejected() {
    let renderer = MockRenderer::new();
    let calls = renderer.call_counter();
    let app = TestApp::new(renderer);

    for body in [json!({"html": ""}), json!({}), json!({"width": 800})] {
        let response = app.send(post_json("/screenshot", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error = body_json(response).await;
        assert_eq!(error, json!({"error": "HTML content is required"}));
    }

    let response = app
        .send(post_json("/screenshot-url", json!({"html": ""})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Validation happens before any rendering
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_geometry_rejected() {
    let app = TestApp::new(MockRenderer::new());

    let cases = [
        json!({"html": "<p>x</p>", "width": 0}),
        json!({"html": "<p>x</p>", "width": 20000}),
        json!({"html": "<p>x</p>", "height": 20000}),
        json!({"html": "<p>x</p>", "deviceScaleFactor": 0}),
        json!({"html": "<p>x</p>", "deviceScaleFactor": 100}),
    ];

    for body in cases {
        let response = app.send(post_json("/screenshot", body.clone())).await;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "expected 400 for {}",
            body
        );
        let error = body_json(response).await;
        assert!(error["error"].is_string());
    }
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let app = TestApp::new(MockRenderer::new());

    let request = Request::builder()
        .method("POST")
        .uri("/screenshot")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error = body_json(response).await;
    assert!(error["error"].is_string());
}

#[tokio::test]
async fn test_body_over_limit_rejected() {
    let app = TestApp::with_config(
        MockRenderer::new(),
        RouterConfig::new()
            .with_tracing(false)
            .with_max_body_bytes(1024),
    );

    let html = "x".repeat(4096);
    let response = app
        .send(post_json("/screenshot", json!({"html": html})))
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let error = body_json(response).await;
    assert_eq!(error["error"], "Request body too large");
}

// =============================================================================
// Render Failures
// =============================================================================

#[tokio::test]
async fn test_render_failure_returns_500() {
    let app = TestApp::new(MockRenderer::failing(RenderError::Timeout { seconds: 30 }));

    let response = app
        .send(post_json("/screenshot-url", json!({"html": "<p>x</p>"})))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await;
    assert!(error["error"].as_str().unwrap().contains("timed out"));

    // A failed render never reaches the store
    assert!(app.store.is_empty().await);
}

// =============================================================================
// Self-Hosted URLs
// =============================================================================

#[tokio::test]
async fn test_screenshot_url_round_trip() {
    let app = TestApp::new(MockRenderer::new());

    let response = app
        .send(post_json(
            "/screenshot-url",
            json!({"html": "<h1>Stored</h1>", "deviceScaleFactor": 1}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["format"], "png");
    assert_eq!(json["expires_in_hours"], 24);

    let url = json["url"].as_str().unwrap();
    assert!(url.starts_with("http://shots.test/image/"), "url: {}", url);
    let id = image_id_from_url(url);
    assert!(app.store.contains(&id).await);

    let path = url.trim_start_matches("http://shots.test");
    let response = app.send(get(path)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=86400, immutable"
    );

    let served = body_bytes(response).await;
    let stored = app.store.get(&id).await.unwrap();
    assert_eq!(&served, stored.bytes());
    assert_eq!(png_dimensions(&served), Some((1200, 800)));
}

#[tokio::test]
async fn test_cache_max_age_tracks_remaining_lifetime() {
    let app = TestApp::new(MockRenderer::new());

    let response = app
        .send(post_json("/screenshot-url", json!({"html": "<p>x</p>"})))
        .await;
    let json = body_json(response).await;
    let id = image_id_from_url(json["url"].as_str().unwrap());

    app.clock.advance(Duration::hours(1));

    let response = app.send(get(&format!("/image/{}", id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=82800, immutable"
    );
}

#[tokio::test]
async fn test_expired_image_returns_410_then_404() {
    let app = TestApp::new(MockRenderer::new());

    let response = app
        .send(post_json("/screenshot-url", json!({"html": "<p>x</p>"})))
        .await;
    let json = body_json(response).await;
    let id = image_id_from_url(json["url"].as_str().unwrap());

    app.clock.advance(Duration::hours(25));

    let response = app.send(get(&format!("/image/{}", id))).await;
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Image has expired"})
    );

    // The expired entry was removed on read
    assert!(!app.store.contains(&id).await);

    let response = app.send(get(&format!("/image/{}", id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_image_returns_404() {
    let app = TestApp::new(MockRenderer::new());

    let unknown = ImageId::generate();
    let response = app.send(get(&format!("/image/{}", unknown))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Image not found"}));

    let response = app.send(get("/image/not-a-uuid")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Image not found"}));
}

#[tokio::test]
async fn test_forwarded_proto_used_in_url() {
    let app = TestApp::new(MockRenderer::new());

    let request = Request::builder()
        .method("POST")
        .uri("/screenshot-url")
        .header(header::HOST, "shots.example.com")
        .header("x-forwarded-proto", "https")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"html": "<p>x</p>"}).to_string()))
        .unwrap();

    let json = body_json(app.send(request).await).await;
    assert!(json["url"]
        .as_str()
        .unwrap()
        .starts_with("https://shots.example.com/image/"));
}

#[tokio::test]
async fn test_public_url_overrides_request_host() {
    let app = TestApp::with_config(
        MockRenderer::new(),
        RouterConfig::new()
            .with_tracing(false)
            .with_public_url("https://cdn.example.com/"),
    );

    let json = body_json(
        app.send(post_json("/screenshot-url", json!({"html": "<p>x</p>"})))
            .await,
    )
    .await;

    assert!(json["url"]
        .as_str()
        .unwrap()
        .starts_with("https://cdn.example.com/image/"));
}

// =============================================================================
// returnUrl
// =============================================================================

#[tokio::test]
async fn test_return_url_without_uploader_uses_store() {
    let app = TestApp::new(MockRenderer::new());

    let response = app
        .send(post_json(
            "/screenshot",
            json!({"html": "<p>x</p>", "returnUrl": true}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

    let json = body_json(response).await;
    let id = image_id_from_url(json["url"].as_str().unwrap());
    assert!(app.store.contains(&id).await);
    assert_eq!(json["expires_in_hours"], 24);
}

#[tokio::test]
async fn test_return_url_with_uploader() {
    let uploader = MockUploader::new("https://i.ibb.co/abc/screenshot.png");
    let uploads = uploader.upload_counter();
    let app = TestApp::with_uploader(MockRenderer::new(), Arc::new(uploader));

    let response = app
        .send(post_json(
            "/screenshot",
            json!({"html": "<p>x</p>", "returnUrl": true}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["url"], "https://i.ibb.co/abc/screenshot.png");
    assert!(json.get("expires_in_hours").is_none());

    assert_eq!(uploads.load(Ordering::SeqCst), 1);
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_upload_failure_falls_back_to_bytes() {
    let app = TestApp::with_uploader(MockRenderer::new(), Arc::new(FailingUploader));

    let response = app
        .send(post_json(
            "/screenshot",
            json!({"html": "<p>x</p>", "returnUrl": true}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let reason = response.headers()[UPLOAD_ERROR_HEADER].to_str().unwrap();
    assert!(reason.starts_with("Upload failed"), "reason: {}", reason);

    let body = body_bytes(response).await;
    assert!(is_valid_png(&body));
}

#[tokio::test]
async fn test_screenshot_url_ignores_uploader() {
    let uploader = MockUploader::new("https://i.ibb.co/abc/screenshot.png");
    let uploads = uploader.upload_counter();
    let app = TestApp::with_uploader(MockRenderer::new(), Arc::new(uploader));

    let json = body_json(
        app.send(post_json(
            "/screenshot-url",
            json!({"html": "<p>x</p>", "returnUrl": true}),
        ))
        .await,
    )
    .await;

    assert!(json["url"].as_str().unwrap().contains("/image/"));
    assert_eq!(uploads.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Status and Fallbacks
// =============================================================================

#[tokio::test]
async fn test_index_reports_store_and_sweeps() {
    let app = TestApp::new(MockRenderer::new());

    for _ in 0..2 {
        app.send(post_json("/screenshot-url", json!({"html": "<p>x</p>"})))
            .await;
    }

    let json = body_json(app.send(get("/")).await).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["message"], "HTML to Image Service is running");
    assert_eq!(json["images_stored"], 2);
    assert_eq!(json["expired_cleaned"], 0);
    assert_eq!(
        json["bytes_stored"].as_u64().unwrap() as usize,
        app.store.total_bytes().await
    );
    assert!(json["bytes_stored"].as_u64().unwrap() > 0);
    assert!(json["routes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r == "/screenshot"));

    app.clock.advance(Duration::hours(48));

    let json = body_json(app.send(get("/")).await).await;
    assert_eq!(json["images_stored"], 0);
    assert_eq!(json["bytes_stored"], 0);
    assert_eq!(json["expired_cleaned"], 2);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(MockRenderer::new());

    let response = app.send(get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = TestApp::new(MockRenderer::new());

    let response = app.send(get("/does-not-exist")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Not found"}));
}

#[tokio::test]
async fn test_wrong_method_returns_json_405() {
    let app = TestApp::new(MockRenderer::new());

    let response = app.send(get("/screenshot")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Method Not Allowed"})
    );

    let response = app
        .send(post_json("/image/whatever", json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
