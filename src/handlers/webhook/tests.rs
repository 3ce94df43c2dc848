use axum::body::Body;
use axum::http::Request;
use tower::ServiceExt;

use super::*;
use crate::dispatch::{self, PurgeRequests};

fn app() -> (Router, PurgeRequests) {
    let (handle, requests) = dispatch::channel();
    (router(handle), requests)
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_post_valid_id_queues_request() {
    let (app, mut requests) = app();

    let resp = app
        .oneshot(request(Method::POST, "/webhook/purge/abc123"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let queued = requests.try_recv().expect("request should be queued");
    assert_eq!(queued.id.as_str(), "abc123");
    assert!(requests.try_recv().is_none());
}

#[tokio::test]
async fn test_each_valid_call_queues_exactly_one_request() {
    let (app, mut requests) = app();

    for id in ["a1", "B2", "c3"] {
        let resp = app
            .clone()
            .oneshot(request(Method::POST, &format!("/webhook/purge/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    let queued: Vec<String> = std::iter::from_fn(|| requests.try_recv())
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(queued, vec!["a1", "B2", "c3"]);
}

#[tokio::test]
async fn test_invalid_ids_rejected() {
    for uri in [
        "/webhook/purge/abc-123",
        "/webhook/purge/a_b",
        "/webhook/purge/a/b",
        "/webhook/purge/a%20b",
        "/webhook/purge/",
    ] {
        let (app, mut requests) = app();

        let resp = app.oneshot(request(Method::POST, uri)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "uri: {}", uri);
        assert!(!body_text(resp).await.is_empty());
        assert!(requests.try_recv().is_none(), "uri: {}", uri);
    }
}

#[tokio::test]
async fn test_empty_id_reports_reason() {
    let (app, _requests) = app();

    let resp = app
        .oneshot(request(Method::POST, "/webhook/purge/"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(resp).await,
        crate::validation::errmsg::PURGE_ID_EMPTY
    );
}

#[tokio::test]
async fn test_other_methods_not_implemented() {
    for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
        let (app, mut requests) = app();

        let resp = app
            .oneshot(request(method.clone(), "/webhook/purge/abc123"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED, "{}", method);
        assert_eq!(body_text(resp).await, "Not Implemented");
        assert!(requests.try_recv().is_none());
    }
}

#[tokio::test]
async fn test_other_methods_not_implemented_for_undecodable_id() {
    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let (app, mut requests) = app();

        let resp = app
            .oneshot(request(method.clone(), "/webhook/purge/%FF"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED, "{}", method);
        assert!(requests.try_recv().is_none());
    }
}

#[tokio::test]
async fn test_post_undecodable_id_rejected() {
    let (app, mut requests) = app();

    let resp = app
        .oneshot(request(Method::POST, "/webhook/purge/%FF"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!body_text(resp).await.is_empty());
    assert!(requests.try_recv().is_none());
}

#[tokio::test]
async fn test_worker_gone_is_server_error() {
    let (app, requests) = app();
    drop(requests);

    let resp = app
        .oneshot(request(Method::POST, "/webhook/purge/abc123"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_health() {
    let (app, _requests) = app();

    let resp = app
        .oneshot(request(Method::GET, "/health"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}
