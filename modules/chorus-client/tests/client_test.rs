//! FeedClient against an in-process axum server speaking the posts API.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use chorus_client::{ClientError, FeedClient};
use chorus_common::Post;
use serde_json::{json, Value};

const TOKEN: &str = "token-1";

#[derive(Clone, Default)]
struct Server {
    posts: Arc<Mutex<Vec<Post>>>,
    next_id: Arc<Mutex<u32>>,
}

fn post(id: &str, comment: &str) -> Post {
    Post {
        id: id.to_string(),
        comment: comment.to_string(),
        created: 1_540_000_000,
        first_name: "Ada".into(),
        last_name: "Byron".into(),
        avatar_url: "https://example.com/ada.png".into(),
        likes: vec![],
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == TOKEN)
}

async fn list(State(server): State<Server>) -> Json<Value> {
    let posts = server.posts.lock().unwrap().clone();
    Json(json!({ "data": posts }))
}

async fn create(
    State(server): State<Server>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let comment = body["comment"].as_str().ok_or(StatusCode::BAD_REQUEST)?;

    let id = {
        let mut next = server.next_id.lock().unwrap();
        *next += 1;
        format!("p{}", *next)
    };
    let created = post(&id, comment);
    server.posts.lock().unwrap().insert(0, created.clone());
    Ok(Json(json!({ "data": created })))
}

async fn like(
    State(server): State<Server>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let mut posts = server.posts.lock().unwrap();
    let post = posts
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    post.likes.push("ada".into());
    Ok(Json(json!({ "data": post.clone() })))
}

async fn remove(
    State(server): State<Server>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    server.posts.lock().unwrap().retain(|p| p.id != id);
    StatusCode::NO_CONTENT
}

async fn broken_list() -> Json<Value> {
    Json(json!({ "data": [{ "id": "1", "comment": "no author" }] }))
}

async fn spawn_server(server: Server) -> String {
    let app = Router::new()
        .route("/api/posts", get(list).post(create))
        .route("/api/posts/{id}", put(like).delete(remove))
        .route("/broken", get(broken_list))
        .with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn lists_posts_in_server_order() {
    let server = Server::default();
    server
        .posts
        .lock()
        .unwrap()
        .extend([post("2", "newer"), post("1", "older")]);
    let base = spawn_server(server).await;

    let client = FeedClient::new(&format!("{base}/api/posts/"), TOKEN).unwrap();
    let posts = client.list().await.unwrap();

    let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["2", "1"]);
}

#[tokio::test]
async fn create_like_remove_round_trip() {
    let server = Server::default();
    let base = spawn_server(server.clone()).await;
    let client = FeedClient::new(&format!("{base}/api/posts"), TOKEN).unwrap();

    let created = client.create("hi").await.unwrap();
    assert_eq!(created.comment, "hi");
    assert_eq!(created.id, "p1");

    let liked = client.like(&created.id).await.unwrap();
    assert_eq!(liked.likes, vec!["ada".to_string()]);

    client.remove(&created.id).await.unwrap();
    assert!(server.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bad_token_is_an_api_error() {
    let base = spawn_server(Server::default()).await;
    let client = FeedClient::new(&format!("{base}/api/posts"), "wrong").unwrap();

    match client.create("hi").await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 401),
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(matches!(
        client.remove("p1").await,
        Err(ClientError::Api { status: 401, .. })
    ));
}

#[tokio::test]
async fn like_of_unknown_post_is_an_api_error() {
    let base = spawn_server(Server::default()).await;
    let client = FeedClient::new(&format!("{base}/api/posts"), TOKEN).unwrap();

    assert!(matches!(
        client.like("missing").await,
        Err(ClientError::Api { status: 404, .. })
    ));
}

#[tokio::test]
async fn incomplete_post_is_a_parse_error() {
    let base = spawn_server(Server::default()).await;
    let client = FeedClient::new(&format!("{base}/broken"), TOKEN).unwrap();

    assert!(matches!(client.list().await, Err(ClientError::Parse(_))));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // Bind then drop to get a port nobody is listening on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = FeedClient::new(&format!("http://{addr}/api/posts"), TOKEN).unwrap();
    assert!(matches!(client.list().await, Err(ClientError::Network(_))));
}
