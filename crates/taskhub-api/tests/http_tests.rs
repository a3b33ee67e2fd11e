use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use taskhub_api::{AppStateInner, router};
use taskhub_db::Database;
use taskhub_gateway::{Dispatcher, Notifier, NotifyError};
use taskhub_types::api::Claims;
use taskhub_types::models::TaskAccessPolicy;

const SECRET: &str = "integration-test-secret";

struct Harness {
    app: Router,
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        let dispatcher = Dispatcher::new();
        Self::build(Arc::new(dispatcher.clone()), dispatcher)
    }

    /// Routes notifications to `notifier`; the harness dispatcher stays silent.
    fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        Self::build(notifier, Dispatcher::new())
    }

    fn build(notifier: Arc<dyn Notifier>, dispatcher: Dispatcher) -> Self {
        let db = Arc::new(Database::open_in_memory(TaskAccessPolicy::default()).unwrap());
        let state = Arc::new(AppStateInner {
            db: db.clone(),
            notifier,
            jwt_secret: SECRET.into(),
        });
        Self {
            app: router(state),
            db,
            dispatcher,
        }
    }

    fn user(&self, name: &str) -> (Uuid, String) {
        let user = self.db.create_user(name).unwrap();
        let claims = Claims {
            sub: user.id,
            username: user.username,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        (user.id, token)
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

#[tokio::test]
async fn health_is_public_everything_else_is_not() {
    let h = Harness::new();

    let (status, body) = h.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = h.call("GET", "/threads", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.call("GET", "/threads", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn direct_thread_read_cycle() {
    let h = Harness::new();
    let (user1, t1) = h.user("user1");
    let (user2, t2) = h.user("user2");
    let mut events = h.dispatcher.subscribe();

    let (status, created) = h
        .call("POST", "/direct-threads", Some(&t1), Some(json!({ "member_ids": [user2] })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["kind"], "direct");
    assert_eq!(created["member_ids"].as_array().unwrap().len(), 2);
    let thread = created["id"].as_str().unwrap().to_string();

    let (status, posted) = h
        .call(
            "POST",
            &format!("/threads/{}/messages", thread),
            Some(&t1),
            Some(json!({ "content": "Hello, User2!" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(posted["sender_id"], user1.to_string());

    let note = events.try_recv().unwrap();
    assert_eq!(note.channel, format!("thread-{}", thread));
    assert_eq!(note.event, "message_added");
    assert_eq!(note.data["content"], "Hello, User2!");

    let (_, unread) = h.call("GET", &format!("/threads/{}/unread", thread), Some(&t2), None).await;
    assert_eq!(unread["unread_count"], 1);

    let (status, by_user) = h.call("GET", "/unread/users", Some(&t2), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_user[0]["user"]["username"], "user1");
    assert_eq!(by_user[0]["unread_count"], 1);

    let (status, mark) = h.call("POST", &format!("/threads/{}/ack", thread), Some(&t2), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mark["unread_count"], 0);

    let (_, unread) = h.call("GET", &format!("/threads/{}/unread", thread), Some(&t2), None).await;
    assert_eq!(unread["unread_count"], 0);

    let (_, messages) = h.call("GET", &format!("/threads/{}/messages", thread), Some(&t2), None).await;
    assert_eq!(messages[0]["acked"], true);
    assert_eq!(messages[0]["sender"]["username"], "user1");
}

struct DownRelay;

impl Notifier for DownRelay {
    fn send(&self, _: &str, _: &str, _: Value) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable("relay is down".into()))
    }
}

#[tokio::test]
async fn posting_succeeds_when_notifications_fail() {
    let h = Harness::with_notifier(Arc::new(DownRelay));
    let (_, t1) = h.user("alice");
    let (bob, t2) = h.user("bob");

    let (status, created) = h
        .call("POST", "/direct-threads", Some(&t1), Some(json!({ "member_ids": [bob] })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let thread = created["id"].as_str().unwrap().to_string();

    let (status, posted) = h
        .call(
            "POST",
            &format!("/threads/{}/messages", thread),
            Some(&t1),
            Some(json!({ "content": "still delivered" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(posted["content"], "still delivered");

    let (_, messages) = h.call("GET", &format!("/threads/{}/messages", thread), Some(&t2), None).await;
    assert_eq!(messages.as_array().unwrap().len(), 1);
    let (_, unread) = h.call("GET", &format!("/threads/{}/unread", thread), Some(&t2), None).await;
    assert_eq!(unread["unread_count"], 1);
}

#[tokio::test]
async fn per_message_ack_over_http() {
    let h = Harness::new();
    let (_, t1) = h.user("alice");
    let (bob, t2) = h.user("bob");

    let (_, created) = h
        .call("POST", "/direct-threads", Some(&t1), Some(json!({ "member_ids": [bob] })))
        .await;
    let thread = created["id"].as_str().unwrap().to_string();
    let (_, m1) = h
        .call("POST", &format!("/threads/{}/messages", thread), Some(&t1), Some(json!({ "content": "one" })))
        .await;
    h.call("POST", &format!("/threads/{}/messages", thread), Some(&t1), Some(json!({ "content": "two" })))
        .await;

    let uri = format!("/threads/{}/messages/ack", thread);
    let first_id = m1["id"].clone();
    let body = json!({ "message_ids": [first_id] });
    let (status, acked) = h.call("POST", &uri, Some(&t2), Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked["acked"], 1);
    let (_, acked) = h.call("POST", &uri, Some(&t2), Some(body)).await;
    assert_eq!(acked["acked"], 0);

    let (_, unread) = h.call("GET", &format!("/threads/{}/unread", thread), Some(&t2), None).await;
    assert_eq!(unread["unread_count"], 1);

    let (status, err) = h
        .call("POST", &uri, Some(&t2), Some(json!({ "message_ids": [] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["field"], "message_ids");
}

#[tokio::test]
async fn context_threads_and_error_mapping() {
    let h = Harness::new();
    let (owner, t_owner) = h.user("owner");
    let (_, t_outsider) = h.user("outsider");
    let project = h.db.create_project(owner, "Apollo").unwrap().id;
    let task = h.db.create_task(project, owner, "Ship it").unwrap().id;

    let (status, err) = h
        .call(
            "POST",
            "/threads",
            Some(&t_owner),
            Some(json!({ "project_id": project, "task_id": task })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["field"], "project_id");

    let (status, _) = h
        .call("POST", "/threads", Some(&t_outsider), Some(json!({ "project_id": project })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = h
        .call("POST", "/threads", Some(&t_owner), Some(json!({ "task_id": task })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let thread = created["id"].as_str().unwrap().to_string();

    let (status, summary) = h.call("GET", &format!("/threads/{}", thread), Some(&t_owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["context"]["type"], "task");
    assert_eq!(summary["context"]["name"], "Ship it");

    let (status, _) = h.call("GET", &format!("/threads/{}", thread), Some(&t_outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, err) = h
        .call("GET", &format!("/threads/{}", Uuid::new_v4()), Some(&t_owner), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"], "thread not found");

    let (status, err) = h.call("GET", "/threads?kind=board", Some(&t_owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["field"], "kind");
}

#[tokio::test]
async fn first_post_to_a_project_opens_its_thread() {
    let h = Harness::new();
    let (owner, token) = h.user("owner");
    let project = h.db.create_project(owner, "Apollo").unwrap().id;
    let uri = format!("/projects/{}/messages", project);

    let (status, first) = h.call("POST", &uri, Some(&token), Some(json!({ "content": "kickoff" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, second) = h.call("POST", &uri, Some(&token), Some(json!({ "content": "agenda" }))).await;
    assert_eq!(first["thread_id"], second["thread_id"]);

    let (status, _) = h.call("POST", &uri, Some(&token), Some(json!({ "content": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, threads) = h.call("GET", "/threads?kind=context", Some(&token), None).await;
    assert_eq!(threads.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn search_and_unread_listings() {
    let h = Harness::new();
    let (owner, t_owner) = h.user("owner");
    let (member, t_member) = h.user("member");
    let project = h.db.create_project(owner, "Apollo").unwrap().id;
    h.db.grant_project_access(project, member).unwrap();
    let uri = format!("/projects/{}/messages", project);

    for content in ["first test", "unrelated", "second TEST"] {
        h.call("POST", &uri, Some(&t_owner), Some(json!({ "content": content }))).await;
    }

    let (status, hits) = h.call("GET", "/messages/search?q=test", Some(&t_member), None).await;
    assert_eq!(status, StatusCode::OK);
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h["context"]["type"] == "project" && h["context"]["name"] == "Apollo"));

    let (_, all) = h.call("GET", "/messages/search", Some(&t_member), None).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, unread) = h.call("GET", "/unread/threads", Some(&t_member), None).await;
    assert_eq!(unread[0]["type"], "project");
    assert_eq!(unread[0]["project"], project.to_string());
    assert_eq!(unread[0]["unread_count"], 3);

    let (status, shared) = h
        .call("GET", &format!("/users/{}/threads", owner), Some(&t_member), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shared.as_array().unwrap().len(), 1);

    let (status, _) = h
        .call("GET", &format!("/users/{}/threads", member), Some(&t_member), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
