use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

pub type Posted = Arc<Mutex<Vec<Value>>>;

/// Binds `app` on an ephemeral port and returns its base url.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn page_params(params: &HashMap<String, String>) -> (usize, usize) {
    let page = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit = params.get("limit").and_then(|l| l.parse().ok()).unwrap_or(50);
    (page, limit)
}

async fn conversations(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let all = vec![
        json!({"id": "c1", "platform": "slack", "title": "General", "lastMessage": "morning", "updatedAt": "2024-05-01T10:01:00Z"}),
        json!({"conversationId": "c2", "platform": "gmail", "subject": "Invoice", "unreadCount": 2}),
        json!({"id": "c3", "platform": "slack", "name": "random"}),
    ];
    let (page, limit) = page_params(&params);
    let items: Vec<Value> = all.iter().skip((page - 1) * limit).take(limit).cloned().collect();
    Json(json!({"data": items, "total": all.len(), "page": page, "limit": limit}))
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let q = params.get("q").cloned().unwrap_or_default();
    let (page, limit) = page_params(&params);
    Json(json!({
        "data": [{"id": "c2", "platform": "gmail", "title": format!("match {q}")}],
        "total": 1,
        "page": page,
        "limit": limit,
    }))
}

async fn messages(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let (page, _) = page_params(&params);
    if page > 1 {
        return Json(json!({"data": [], "total": 2}));
    }
    Json(json!({
        "messages": [
            {"_id": "m2", "text": format!("second in {id}"), "createdAt": "2024-05-01T10:01:00Z", "senderId": "alice"},
            {"_id": "m1", "text": "first", "createdAt": "2024-05-01T10:00:00Z", "userId": "me"},
        ],
        "total": 2,
    }))
}

async fn send(State(posted): State<Posted>, Json(body): Json<Value>) -> Json<Value> {
    let id = {
        let mut posted = posted.lock().unwrap();
        posted.push(body.clone());
        format!("srv-{}", posted.len())
    };
    Json(json!({
        "success": true,
        "data": {
            "id": id,
            "channelId": body["channelId"],
            "text": body["text"],
            "createdAt": "2024-05-01T11:00:00Z",
        }
    }))
}

/// The dashboard REST surface with canned data; POST bodies are recorded in `posted`.
pub fn dashboard(posted: Posted) -> Router {
    Router::new()
        .route("/api/conversations", get(conversations))
        .route("/api/conversations/search", get(search))
        .route("/api/messages", axum::routing::post(send))
        .route("/api/messages/{id}", get(messages))
        .with_state(posted)
}
