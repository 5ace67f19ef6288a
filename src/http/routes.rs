//! HTTP handlers for the task listing/selection/submission UI surface.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::FeedbackError;
use crate::http::images;
use crate::notifications::send_bark_probe;
use crate::tasks::{ImageAttachment, Task, TaskResult, TaskStatus};
use crate::AppContext;

fn task_json(task: &Task, now: chrono::DateTime<Utc>) -> Value {
    json!({
        "task_id": task.id,
        "project": task.project,
        "prompt": task.prompt,
        "options": task.options,
        "status": match task.status {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
        },
        "auto_resubmit_timeout": task.auto_resubmit_timeout,
        "created_at": task.created_at.to_rfc3339(),
        "deadline": task.deadline.map(|d| d.to_rfc3339()),
        "remaining_time": task.remaining_time(now),
    })
}

pub async fn get_config(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let now = Utc::now();
    let active_id = ctx.queue.active_task_id().await;
    let active = match active_id {
        Some(id) => ctx.queue.get(&id).await,
        None => None,
    };

    match active {
        Some(task) => {
            let mut body = task_json(&task, now);
            body["has_content"] = json!(true);
            body["server_time"] = json!(now.to_rfc3339());
            Json(body)
        }
        None => Json(json!({
            "has_content": false,
            "server_time": now.to_rfc3339(),
        })),
    }
}

pub async fn list_tasks(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let now = Utc::now();
    let tasks = ctx.queue.list().await;
    let stats = ctx.queue.stats().await;
    Json(json!({
        "success": true,
        "tasks": tasks.iter().map(|t| task_json(t, now)).collect::<Vec<_>>(),
        "stats": stats,
        "server_time": now.to_rfc3339(),
    }))
}

pub async fn get_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, FeedbackError> {
    let task = ctx
        .queue
        .get(&task_id)
        .await
        .ok_or_else(|| FeedbackError::TaskNotFound(task_id.clone()))?;
    Ok(Json(json!({ "success": true, "task": task_json(&task, Utc::now()) })))
}

pub async fn activate_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, FeedbackError> {
    ctx.queue.activate(&task_id).await.map_err(queue_error_to_feedback)?;
    Ok(Json(json!({ "success": true })))
}

fn queue_error_to_feedback(err: crate::tasks::QueueError) -> FeedbackError {
    match err {
        crate::tasks::QueueError::NotFound(id) => FeedbackError::TaskNotFound(id),
        crate::tasks::QueueError::AlreadyCompleted(id) => {
            FeedbackError::Conflict(format!("task {id} is already completed"))
        }
    }
}

struct ParsedSubmission {
    text: String,
    selected_options: Vec<String>,
    images: Vec<ImageAttachment>,
}

async fn parse_submission(mut multipart: Multipart) -> Result<ParsedSubmission, FeedbackError> {
    let mut text = String::new();
    let mut selected_options = Vec::new();
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| FeedbackError::InvalidInput(format!("malformed multipart body: {err}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "feedback_text" {
            text = field
                .text()
                .await
                .map_err(|err| FeedbackError::InvalidInput(err.to_string()))?;
        } else if name == "selected_options" {
            let raw = field
                .text()
                .await
                .map_err(|err| FeedbackError::InvalidInput(err.to_string()))?;
            selected_options = serde_json::from_str(&raw)
                .map_err(|_| FeedbackError::InvalidInput("selected_options must be a JSON array of strings".to_string()))?;
        } else if name.starts_with("image_") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| FeedbackError::InvalidInput(err.to_string()))?;
            let (data, mime_type) = images::normalize(&filename, &bytes)
                .map_err(|err| FeedbackError::InvalidInput(err.to_string()))?;
            images.push(ImageAttachment { data, mime_type });
        }
    }

    Ok(ParsedSubmission {
        text,
        selected_options,
        images,
    })
}

async fn submit_for(
    ctx: &Arc<AppContext>,
    task_id: &str,
    multipart: Multipart,
) -> Result<(), FeedbackError> {
    let parsed = parse_submission(multipart).await?;
    let result = TaskResult {
        text: parsed.text,
        selected_options: parsed.selected_options,
        images: parsed.images,
    };

    ctx.queue
        .submit(task_id, result.clone())
        .await
        .map_err(queue_error_to_feedback)?;
    ctx.scheduler.disarm(task_id).await;
    ctx.rendezvous.deliver(task_id, result).await;
    Ok(())
}

pub async fn submit_active(
    State(ctx): State<Arc<AppContext>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, FeedbackError> {
    let task_id = ctx
        .queue
        .active_task_id()
        .await
        .ok_or_else(|| FeedbackError::InvalidInput("no task is currently active".to_string()))?;
    submit_for(&ctx, &task_id, multipart).await?;
    Ok(Json(json!({ "success": true, "message": "submitted" })))
}

pub async fn submit_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, FeedbackError> {
    submit_for(&ctx, &task_id, multipart).await?;
    Ok(Json(json!({ "success": true, "message": "submitted" })))
}

pub async fn close_active(State(ctx): State<Arc<AppContext>>) -> Result<impl IntoResponse, FeedbackError> {
    let task_id = ctx
        .queue
        .active_task_id()
        .await
        .ok_or_else(|| FeedbackError::InvalidInput("no task is currently active".to_string()))?;

    let snapshot = ctx.config.snapshot();
    let result = TaskResult {
        text: snapshot.feedback.resubmit_prompt.clone(),
        selected_options: Vec::new(),
        images: Vec::new(),
    };

    ctx.queue
        .submit(&task_id, result.clone())
        .await
        .map_err(queue_error_to_feedback)?;
    ctx.scheduler.disarm(&task_id).await;
    ctx.rendezvous.deliver(&task_id, result).await;

    Ok(Json(json!({ "success": true })))
}

pub async fn get_notification_config(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let snapshot = ctx.config.snapshot();
    Json(json!({ "status": "success", "config": snapshot.notification }))
}

pub async fn update_notification_config(
    State(ctx): State<Arc<AppContext>>,
    Json(patch): Json<Value>,
) -> Result<impl IntoResponse, FeedbackError> {
    let updated = ctx
        .config
        .update_notification(patch)
        .await
        .map_err(|err| FeedbackError::InvalidInput(err.to_string()))?;
    Ok(Json(json!({ "status": "success", "config": updated.notification })))
}

#[derive(serde::Deserialize)]
pub struct TestBarkRequest {
    pub bark_url: String,
    #[serde(default)]
    pub bark_device_key: String,
    #[serde(default)]
    pub bark_icon: String,
    #[serde(default = "default_bark_action")]
    pub bark_action: String,
}

fn default_bark_action() -> String {
    "none".to_string()
}

pub async fn test_bark(Json(req): Json<TestBarkRequest>) -> impl IntoResponse {
    match send_bark_probe(&req.bark_url, &req.bark_device_key, &req.bark_icon, &req.bark_action).await {
        Ok(()) => Json(json!({ "status": "success", "message": "test notification sent" })),
        Err(err) => Json(json!({ "status": "error", "message": err.to_string() })),
    }
}

pub async fn get_feedback_prompts(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let snapshot = ctx.config.snapshot();
    Json(json!({
        "status": "success",
        "config": {
            "resubmit_prompt": snapshot.feedback.resubmit_prompt,
            "prompt_suffix": snapshot.feedback.prompt_suffix,
        }
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}
