//! FigmaService against a mocked Figma API.

use base64::Engine;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use figma_context::{FigmaAuth, FigmaError, FigmaService, ImageRequest};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

fn service(server: &MockServer) -> FigmaService {
    FigmaService::with_base_url(FigmaAuth::api_key("test-key"), server.uri())
}

#[tokio::test]
async fn test_get_nodes_sends_token_and_normalized_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/AbC123/nodes"))
        .and(query_param("ids", "1:2"))
        .and(query_param("depth", "2"))
        .and(header("X-Figma-Token", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Design",
            "nodes": { "1:2": { "document": { "id": "1:2", "name": "Frame" } } }
        })))
        .mount(&server)
        .await;

    let value = service(&server)
        .get_nodes("AbC123", &["1-2".to_string()], Some(2))
        .await
        .unwrap();
    assert_eq!(value["nodes"]["1:2"]["document"]["name"], "Frame");
}

#[tokio::test]
async fn test_api_error_surfaces_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "status": 404, "err": "Not found" })),
        )
        .mount(&server)
        .await;

    let err = service(&server).get_file("missing", None).await.unwrap_err();
    match err {
        FigmaError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Not found");
        }
        other => panic!("expected Api error, got {other}"),
    }
}

#[tokio::test]
async fn test_invalid_file_key_never_hits_network() {
    let server = MockServer::start().await;
    let err = service(&server).get_file("not/a/key", None).await.unwrap_err();
    assert!(matches!(err, FigmaError::InvalidFileKey(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_missing_credentials() {
    let server = MockServer::start().await;
    let svc = FigmaService::with_base_url(FigmaAuth::default(), server.uri());
    let err = svc.get_file("AbC123", None).await.unwrap_err();
    assert!(matches!(err, FigmaError::MissingCredentials));
}

#[tokio::test]
async fn test_node_screenshot_returns_base64_png() {
    let server = MockServer::start().await;
    let render_url = format!("{}/renders/1-2.png", server.uri());

    Mock::given(method("GET"))
        .and(path("/images/AbC123"))
        .and(query_param("ids", "1:2"))
        .and(query_param("format", "png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "err": null,
            "images": { "1:2": render_url }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/renders/1-2.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES))
        .mount(&server)
        .await;

    let data = service(&server)
        .get_node_screenshot("AbC123", "1-2")
        .await
        .unwrap()
        .expect("screenshot");
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(data)
        .unwrap();
    assert_eq!(decoded, PNG_BYTES);
}

#[tokio::test]
async fn test_node_screenshot_unrenderable_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/AbC123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "err": null,
            "images": { "1:2": null }
        })))
        .mount(&server)
        .await;

    let data = service(&server)
        .get_node_screenshot("AbC123", "1:2")
        .await
        .unwrap();
    assert!(data.is_none());
}

#[tokio::test]
async fn test_download_images_writes_renders_and_fills() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/images/AbC123"))
        .and(query_param("format", "png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": { "1:2": format!("{}/renders/a.png", server.uri()) }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/AbC123/images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": { "images": { "ref42": format!("{}/fills/ref42", server.uri()) } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/renders/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fills/ref42"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fill".to_vec()))
        .mount(&server)
        .await;

    let requests = vec![
        ImageRequest {
            node_id: "1:2".to_string(),
            image_ref: None,
            file_name: "render.png".to_string(),
        },
        ImageRequest {
            node_id: "3:4".to_string(),
            image_ref: Some("ref42".to_string()),
            file_name: "fill.png".to_string(),
        },
    ];

    let saved = service(&server)
        .download_images("AbC123", dir.path(), &requests, 2.0)
        .await
        .unwrap();

    assert_eq!(saved.len(), 2);
    assert_eq!(std::fs::read(dir.path().join("render.png")).unwrap(), PNG_BYTES);
    assert_eq!(std::fs::read(dir.path().join("fill.png")).unwrap(), b"fill");
}
