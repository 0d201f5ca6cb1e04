mod common;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chat_sync::api::client::ApiClient;
use chat_sync::api::models::{Platform, SendRequest};
use chat_sync::error::SyncError;
use common::backend::{dashboard, serve, Posted};
use serde_json::json;

async fn fixture() -> (ApiClient, Posted) {
    let posted = Posted::default();
    let base = serve(dashboard(posted.clone())).await;
    (ApiClient::new(&base).unwrap(), posted)
}

#[tokio::test]
async fn conversation_pages_are_normalized() {
    let (client, _) = fixture().await;

    let first = client.conversations(1, 2).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].title, "General");
    assert!(first.items[0].updated_at.is_some());
    assert_eq!(first.items[1].id, "c2");
    assert_eq!(first.items[1].title, "Invoice");
    assert_eq!(first.items[1].platform, Platform::Gmail);
    assert_eq!(first.items[1].unread_count, 2);

    let second = client.conversations(2, 2).await.unwrap();
    assert_eq!(second.page, 2);
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].title, "random");
}

#[tokio::test]
async fn search_passes_trimmed_query() {
    let (client, _) = fixture().await;
    let page = client.search_conversations("  ali ce ", 1, 50).await.unwrap();
    assert_eq!(page.items[0].title, "match ali ce");
}

#[tokio::test]
async fn messages_fall_back_to_requested_conversation() {
    let (client, _) = fixture().await;
    let page = client.messages("c1", 1, 20, "me").await.unwrap();
    assert_eq!(page.total, 2);
    let alice = &page.items[0];
    assert_eq!(alice.id, "m2");
    assert_eq!(alice.conversation_id, "c1");
    assert_eq!(alice.body, "second in c1");
    assert!(!alice.is_own);
    assert!(page.items[1].is_own);

    assert!(matches!(client.messages("", 1, 20, "me").await, Err(SyncError::Config(_))));
}

#[tokio::test]
async fn send_posts_and_reads_the_echo() {
    let (client, posted) = fixture().await;
    let request = SendRequest {
        platform: Platform::Slack,
        channel_id: "c1".into(),
        text: "hello".into(),
    };
    let echo = client.send_message(&request, "me").await.unwrap();
    assert_eq!(echo.id, "srv-1");
    assert_eq!(echo.conversation_id, "c1");
    assert_eq!(echo.body, "hello");
    assert!(echo.is_own);

    let posted = posted.lock().unwrap();
    assert_eq!(
        posted[0],
        json!({"platform": "slack", "channelId": "c1", "text": "hello"})
    );
}

#[tokio::test]
async fn error_statuses_carry_the_server_message() {
    let app = Router::new()
        .route(
            "/api/conversations",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"success": false, "message": "boom"})),
                )
            }),
        )
        .route(
            "/api/conversations/search",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
    let client = ApiClient::new(&serve(app).await).unwrap();

    assert_eq!(
        client.conversations(1, 50).await.unwrap_err(),
        SyncError::ServerError {
            status: 500,
            message: "boom".into()
        }
    );
    assert_eq!(
        client.search_conversations("x", 1, 50).await.unwrap_err(),
        SyncError::ServerError {
            status: 502,
            message: "upstream down".into()
        }
    );
}

#[tokio::test]
async fn unusable_bodies_are_malformed() {
    let app = Router::new()
        .route("/api/conversations", get(|| async { "<html>oops</html>" }))
        .route(
            "/api/conversations/search",
            get(|| async { Json(json!({"success": true})) }),
        );
    let client = ApiClient::new(&serve(app).await).unwrap();

    assert!(matches!(
        client.conversations(1, 50).await,
        Err(SyncError::MalformedResponse(_))
    ));
    assert!(matches!(
        client.search_conversations("x", 1, 50).await,
        Err(SyncError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ApiClient::new(&format!("http://{addr}")).unwrap();
    assert!(matches!(
        client.conversations(1, 50).await,
        Err(SyncError::NetworkFailure(_))
    ));
}
