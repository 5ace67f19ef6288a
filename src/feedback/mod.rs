//! The feedback tool entry: the glue external RPC callers see.
//!
//! One call does `queue.add` → `rendezvous.register` → arm the scheduler →
//! `notification.send` → `rendezvous.wait` → normalize to content blocks.

use std::sync::Arc;
use std::time::Duration;

use crate::error::FeedbackError;
use crate::notifications::NotificationEvent;
use crate::rendezvous::WaitOutcome;
use crate::tasks::TaskResult;
use crate::AppContext;

const MAX_PROMPT_LEN: usize = 20_000;
const MAX_OPTION_LEN: usize = 200;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { data: String, #[serde(rename = "mimeType")] mime_type: String },
}

/// Convert the internal `TaskResult` into the wire content-block sequence.
/// This is the single call site mandated for the `{bytes, mime}` →
/// `{type:"image", data, mimeType}` conversion.
fn normalize(result: TaskResult) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();

    let text = if result.selected_options.is_empty() {
        result.text
    } else {
        format!(
            "Selected options: {}\n\nUser input: {}",
            result.selected_options.join(", "),
            result.text
        )
    };
    if !text.is_empty() {
        blocks.push(ContentBlock::Text { text });
    }

    for image in result.images {
        blocks.push(ContentBlock::Image {
            data: image.data,
            mime_type: image.mime_type,
        });
    }

    blocks
}

fn validate_prompt(prompt: &str) -> Result<(), FeedbackError> {
    if prompt.trim().is_empty() {
        return Err(FeedbackError::InvalidInput("prompt must not be empty".to_string()));
    }
    if prompt.len() > MAX_PROMPT_LEN {
        return Err(FeedbackError::InvalidInput(format!(
            "prompt exceeds {MAX_PROMPT_LEN} bytes"
        )));
    }
    Ok(())
}

fn validate_options(options: &[String]) -> Result<(), FeedbackError> {
    for option in options {
        if option.len() > MAX_OPTION_LEN {
            return Err(FeedbackError::InvalidInput(format!(
                "option exceeds {MAX_OPTION_LEN} bytes"
            )));
        }
    }
    Ok(())
}

/// Run one `interactive_feedback` call end to end.
pub async fn run(
    ctx: &Arc<AppContext>,
    prompt: String,
    predefined_options: Vec<String>,
    auto_resubmit_timeout: u64,
) -> Result<Vec<ContentBlock>, FeedbackError> {
    validate_prompt(&prompt)?;
    validate_options(&predefined_options)?;

    let snapshot = ctx.config.snapshot();
    let overall_deadline = Duration::from_secs(ctx.feedback_timeout());

    let task_id = ctx
        .queue
        .add(ctx.project.clone(), prompt.clone(), predefined_options, auto_resubmit_timeout)
        .await;

    ctx.rendezvous.register(&task_id).await;

    if auto_resubmit_timeout > 0 {
        let fire_at = std::time::Instant::now() + Duration::from_secs(auto_resubmit_timeout);
        ctx.scheduler
            .arm(task_id.clone(), fire_at, snapshot.feedback.resubmit_prompt.clone())
            .await;
    }

    let preview: String = prompt.chars().take(200).collect();
    ctx.notifications.send(NotificationEvent {
        task_id: task_id.clone(),
        project: ctx.project.clone(),
        prompt_preview: preview,
    });

    let outcome = ctx.rendezvous.wait(&task_id, overall_deadline).await;

    let blocks = match outcome {
        WaitOutcome::Delivered(result) => normalize(result),
        WaitOutcome::TimedOut => {
            let result = TaskResult {
                text: snapshot.feedback.resubmit_prompt.clone(),
                selected_options: Vec::new(),
                images: Vec::new(),
            };
            // The queue may already have completed this task (the scheduler's
            // own timer raced us to it); either way the caller gets the
            // canned reply, never an error, per the rendezvous-layer timeout
            // policy.
            let _ = ctx.queue.submit(&task_id, result.clone()).await;
            normalize(result)
        }
        WaitOutcome::Cancelled => {
            ctx.scheduler.disarm(&task_id).await;
            ctx.queue.evict(&task_id).await;
            return Err(FeedbackError::Internal("request cancelled by shutdown".to_string()));
        }
    };

    ctx.scheduler.disarm(&task_id).await;
    ctx.queue.evict(&task_id).await;
    Ok(blocks)
}
