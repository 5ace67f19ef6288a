//! End-to-end scenario tests exercising the HTTP surface against a real
//! bound listener, the same way the teacher daemon's `tests/health.rs`
//! spins up a server on a random port rather than using `Router::oneshot`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use intervention_agent::config::ConfigStore;
use intervention_agent::{feedback, http, AppContext};
use serde_json::Value;

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn spawn_server() -> (Arc<AppContext>, SocketAddr) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::load(dir.path().join("config.jsonc"));
    let ctx = AppContext::new("proj", store);

    let port = find_free_port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let router = http::build_router(ctx.clone());
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .ok();
    });

    // Give the listener a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(30)).await;
    (ctx, addr)
}

/// S1 — single task, human submits through the HTTP surface; the blocked
/// RPC-equivalent call (`feedback::run`) returns the normalized text.
#[tokio::test]
async fn s1_single_task_human_submits() {
    let (ctx, addr) = spawn_server().await;
    let client = reqwest::Client::new();

    let ctx_clone = ctx.clone();
    let call = tokio::spawn(async move {
        feedback::run(
            &ctx_clone,
            "Write docs?".to_string(),
            vec!["yes".to_string(), "no".to_string()],
            300,
        )
        .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let config: Value = client
        .get(format!("http://{addr}/api/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(config["has_content"], true);

    let form = reqwest::multipart::Form::new()
        .text("feedback_text", "yes, concise")
        .text("selected_options", r#"["yes"]"#);
    let response = client
        .post(format!("http://{addr}/api/submit"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let blocks = call.await.unwrap().unwrap();
    assert_eq!(blocks.len(), 1);
    match &blocks[0] {
        feedback::ContentBlock::Text { text } => {
            assert_eq!(text, "Selected options: yes\n\nUser input: yes, concise");
        }
        _ => panic!("expected a text block"),
    }
}

/// S3 — two concurrent tasks; explicit activation lets the UI address the
/// second task directly while the first remains blocked.
#[tokio::test]
async fn s3_two_concurrent_tasks_explicit_activation() {
    let (ctx, addr) = spawn_server().await;
    let client = reqwest::Client::new();

    let ctx_a = ctx.clone();
    let call_a = tokio::spawn(async move {
        feedback::run(&ctx_a, "P1".to_string(), vec![], 0).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let ctx_b = ctx.clone();
    let call_b = tokio::spawn(async move {
        feedback::run(&ctx_b, "P2".to_string(), vec![], 0).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let listing: Value = client
        .get(format!("http://{addr}/api/tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tasks = listing["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    let active_count = tasks.iter().filter(|t| t["status"] == "active").count();
    assert_eq!(active_count, 1);

    let id_p2 = tasks
        .iter()
        .find(|t| t["prompt"] == "P2")
        .unwrap()["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    let activate = client
        .post(format!("http://{addr}/api/tasks/{id_p2}/activate"))
        .send()
        .await
        .unwrap();
    assert!(activate.status().is_success());

    let form = reqwest::multipart::Form::new().text("feedback_text", "done with P2");
    let submit = client
        .post(format!("http://{addr}/api/tasks/{id_p2}/submit"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert!(submit.status().is_success());

    let blocks_b = call_b.await.unwrap().unwrap();
    match &blocks_b[0] {
        feedback::ContentBlock::Text { text } => assert_eq!(text, "done with P2"),
        _ => panic!("expected a text block"),
    }
    assert!(!call_a.is_finished());

    let listing: Value = client
        .get(format!("http://{addr}/api/tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let remaining = listing["tasks"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["prompt"], "P1");
    assert_eq!(remaining[0]["status"], "active");

    // Clean up the still-blocked P1 call so the test process can exit.
    ctx.rendezvous.cancel(&remaining[0]["task_id"].as_str().unwrap().to_string()).await;
    let _ = call_a.await;
}

/// S5 — submit endpoint's rate limit rejects the request over the limit
/// with a `429` and a `Retry-After` hint, without mutating the queue.
#[tokio::test]
async fn s5_rate_limit_rejects_sixth_submit() {
    let (ctx, addr) = spawn_server().await;
    let client = reqwest::Client::new();

    for _ in 0..20 {
        let form = reqwest::multipart::Form::new().text("feedback_text", "x");
        let _ = client
            .post(format!("http://{addr}/api/submit"))
            .multipart(form)
            .send()
            .await
            .unwrap();
    }

    let form = reqwest::multipart::Form::new().text("feedback_text", "x");
    let response = client
        .post(format!("http://{addr}/api/submit"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    assert_eq!(ctx.queue.stats().await.completed, 0);
}

/// S6 — notification partial failure: a Bark endpoint that cannot be
/// reached must not affect the feedback call or the HTTP surface.
#[tokio::test]
async fn s6_unreachable_bark_does_not_affect_feedback_call() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.jsonc"),
        r#"{
            "notification": {
                "bark_enabled": true,
                "bark_url": "http://127.0.0.1:1/unreachable"
            }
        }"#,
    )
    .unwrap();
    let store = ConfigStore::load(dir.path().join("config.jsonc"));
    let ctx = AppContext::new("proj", store);

    let blocks = feedback::run(&ctx, "ping".to_string(), vec![], 1).await.unwrap();
    assert_eq!(blocks.len(), 1);
}
