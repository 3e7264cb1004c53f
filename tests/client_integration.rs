//! Integration tests for the recipe server HTTP client.
//!
//! These tests run [`ServerClient`] against a wiremock server standing in for
//! the recipe server's REST API.

use std::time::Duration;

use importer_core::{ApiError, ImporterConfig, RecipeApi, RecipeId, ServerClient};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "tok-3f9a";

fn client_for(server: &MockServer) -> ServerClient {
    let config = ImporterConfig::new(&server.uri(), TOKEN).expect("valid config");
    ServerClient::new(&config).expect("client builds")
}

#[tokio::test]
async fn test_scrape_sends_bearer_token_and_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe-from-source/"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_json(json!({ "url": "https://cook.example.com/pie" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "recipe": { "name": "Pie", "steps": [] },
            "images": ["https://cook.example.com/pie.jpg"],
            "duplicates": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client_for(&server)
        .scrape("https://cook.example.com/pie")
        .await
        .expect("scrape should succeed");

    assert_eq!(payload.recipe.unwrap()["name"], "Pie");
    assert_eq!(payload.images, vec!["https://cook.example.com/pie.jpg"]);
    assert!(payload.duplicates.is_empty());
}

#[tokio::test]
async fn test_scrape_reports_server_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe-from-source/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "recipe": { "name": "Pie" },
            "duplicates": [{ "id": 12, "name": "Grandma's Pie" }]
        })))
        .mount(&server)
        .await;

    let payload = client_for(&server)
        .scrape("https://cook.example.com/pie")
        .await
        .unwrap();

    assert_eq!(payload.duplicates.len(), 1);
    assert_eq!(payload.duplicates[0].id, Some(RecipeId(12)));
    assert_eq!(payload.duplicates[0].name.as_deref(), Some("Grandma's Pie"));
}

#[tokio::test]
async fn test_scrape_error_body_is_not_a_recipe() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe-from-source/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": true,
            "msg": "The requested site does not provide any recipe data"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .scrape("https://blog.example.com/about")
        .await
        .unwrap_err();

    assert!(
        matches!(err, ApiError::ClientError { status: 400, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_scrape_error_flag_in_ok_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe-from-source/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": true,
            "msg": "Connection refused while fetching page"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .scrape("https://down.example.com/soup")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Network { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe-from-source/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .scrape("https://cook.example.com/pie")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(17))
        }
    );
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn test_unauthorized_and_server_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/recipe-from-source/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let create = client.create(&json!({ "name": "Soup" })).await.unwrap_err();
    let scrape = client.scrape("https://x.example.com/a").await.unwrap_err();

    assert_eq!(create, ApiError::Unauthorized { status: 401 });
    assert_eq!(scrape, ApiError::ServerError { status: 503 });
    assert_eq!(scrape.http_status(), Some(503));
}

#[tokio::test]
async fn test_create_returns_new_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe/"))
        .and(body_json(json!({ "name": "Soup", "servings": 2 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 481, "name": "Soup" })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client_for(&server)
        .create(&json!({ "name": "Soup", "servings": 2 }))
        .await
        .unwrap();

    assert_eq!(id, RecipeId(481));
}

#[tokio::test]
async fn test_create_validation_error_keeps_body_excerpt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"name":["Ensure this field has no more than 128 characters."]}"#),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create(&json!({ "name": "x" }))
        .await
        .unwrap_err();

    match err {
        ApiError::ClientError { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("128 characters"));
        }
        other => panic!("expected client error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_pages_and_falls_back_to_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/recipe/"))
        .and(query_param("page", "1"))
        .and(query_param("page_size", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": "http://server/api/recipe/?page=2&page_size=2",
            "results": [
                { "id": 1, "source_url": "https://a.example.com/one" },
                { "id": 2 }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/recipe/2/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2,
            "source_url": "https://b.example.com/two"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/recipe/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": null,
            "results": [{ "id": 3, "source_url": "" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/recipe/3/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.list_recipe_source_urls(1, 2).await.unwrap();
    let second = client.list_recipe_source_urls(2, 2).await.unwrap();

    assert_eq!(
        first.source_urls,
        vec!["https://a.example.com/one", "https://b.example.com/two"]
    );
    assert!(first.has_more);
    assert!(second.source_urls.is_empty(), "deleted recipes are skipped");
    assert_eq!(second.entries, 1);
    assert!(!second.has_more);
}

async fn mount_page_needing_detail(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/recipe/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "next": null,
            "results": [
                { "id": 1, "source_url": "https://a.example.com/one" },
                { "id": 7 }
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_list_detail_server_error_fails_page() {
    let server = MockServer::start().await;
    mount_page_needing_detail(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/recipe/7/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_recipe_source_urls(1, 100)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::ServerError { status: 500 });
}

#[tokio::test]
async fn test_list_detail_rate_limit_fails_page() {
    let server = MockServer::start().await;
    mount_page_needing_detail(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/recipe/7/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "4"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_recipe_source_urls(1, 100)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::rate_limited(Some(Duration::from_secs(4))));
}

#[tokio::test]
async fn test_recipe_detail_reads_image_and_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/recipe/12/"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12,
            "name": "Flatbread",
            "source_url": "https://cook.example.com/flatbread",
            "image": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let detail = client_for(&server).recipe_detail(RecipeId(12)).await.unwrap();
    assert_eq!(detail.id, Some(RecipeId(12)));
    assert_eq!(detail.source_url(), Some("https://cook.example.com/flatbread"));
    assert!(!detail.has_image());
}

#[tokio::test]
async fn test_attach_image_puts_image_url() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/recipe/481/image/"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "image": "/media/481.jpg" })))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .attach_image(RecipeId(481), "https://cook.example.com/pie.jpg")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"image_url\""));
    assert!(body.contains("https://cook.example.com/pie.jpg"));
}

#[tokio::test]
async fn test_server_under_sub_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/recipes/api/recipe/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 5 })))
        .mount(&server)
        .await;

    let config = ImporterConfig::new(&format!("{}/recipes", server.uri()), TOKEN).unwrap();
    let client = ServerClient::new(&config).unwrap();

    assert_eq!(client.create(&json!({ "name": "a" })).await.unwrap(), RecipeId(5));
}

#[tokio::test]
async fn test_html_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/recipe/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create(&json!({ "name": "a" }))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidResponse { .. }));
}
