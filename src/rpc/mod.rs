//! Stdio JSON-RPC transport exposing `interactive_feedback` as the sole
//! method — one request/response pair per line.
//!
//! This is the concrete transport this daemon ships with rather than a
//! mandated wire format. Request/response/error shapes follow JSON-RPC 2.0.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::FeedbackError;
use crate::feedback;
use crate::AppContext;

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

#[derive(Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Value,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct FeedbackParams {
    prompt: String,
    #[serde(default)]
    predefined_options: Vec<String>,
    #[serde(default)]
    auto_resubmit_timeout: u64,
}

fn error_code_for(err: &FeedbackError) -> i32 {
    match err {
        FeedbackError::InvalidInput(_) => INVALID_PARAMS,
        FeedbackError::Internal(_) => INTERNAL_ERROR,
        _ => INTERNAL_ERROR,
    }
}

async fn dispatch(ctx: &Arc<AppContext>, request: RpcRequest) -> RpcResponse {
    if request.method != "interactive_feedback" {
        return RpcResponse {
            jsonrpc: "2.0",
            id: request.id,
            result: None,
            error: Some(RpcError {
                code: METHOD_NOT_FOUND,
                message: format!("unknown method: {}", request.method),
            }),
        };
    }

    let params: FeedbackParams = match request.params.map(serde_json::from_value).transpose() {
        Ok(Some(params)) => params,
        Ok(None) => {
            return RpcResponse {
                jsonrpc: "2.0",
                id: request.id,
                result: None,
                error: Some(RpcError {
                    code: INVALID_PARAMS,
                    message: "missing params".to_string(),
                }),
            }
        }
        Err(err) => {
            return RpcResponse {
                jsonrpc: "2.0",
                id: request.id,
                result: None,
                error: Some(RpcError {
                    code: INVALID_PARAMS,
                    message: err.to_string(),
                }),
            }
        }
    };

    match feedback::run(
        ctx,
        params.prompt,
        params.predefined_options,
        params.auto_resubmit_timeout,
    )
    .await
    {
        Ok(blocks) => RpcResponse {
            jsonrpc: "2.0",
            id: request.id,
            result: Some(serde_json::to_value(blocks).expect("content blocks always serialize")),
            error: None,
        },
        Err(err) => RpcResponse {
            jsonrpc: "2.0",
            id: request.id,
            result: None,
            error: Some(RpcError {
                code: error_code_for(&err),
                message: err.to_string(),
            }),
        },
    }
}

/// Handle one already-read line: parse, dispatch, and write the response.
/// Spawned per request so a call blocked in `rendezvous.wait` (up to
/// `feedback.timeout`, default one hour) never holds up reading or handling
/// the next line — concurrent `interactive_feedback` calls are the normal
/// case (spec.md S3), not an edge case. `stdout` is shared and mutex-guarded
/// so two responses completing close together can't interleave mid-line.
async fn handle_line(ctx: Arc<AppContext>, stdout: Arc<Mutex<tokio::io::Stdout>>, line: String) {
    let response = match serde_json::from_str::<RpcRequest>(&line) {
        Ok(request) => dispatch(&ctx, request).await,
        Err(err) => RpcResponse {
            jsonrpc: "2.0",
            id: Value::Null,
            result: None,
            error: Some(RpcError {
                code: PARSE_ERROR,
                message: err.to_string(),
            }),
        },
    };

    if let Ok(mut encoded) = serde_json::to_string(&response) {
        encoded.push('\n');
        let mut stdout = stdout.lock().await;
        if stdout.write_all(encoded.as_bytes()).await.is_ok() {
            let _ = stdout.flush().await;
        }
    }
}

/// Run the stdio loop until stdin closes or `shutdown` resolves. Each line
/// is dispatched on its own task so one slow-to-resolve request can never
/// delay reading or answering the next; a malformed line yields a
/// parse-error response rather than terminating the loop.
pub async fn run(ctx: Arc<AppContext>, shutdown: impl std::future::Future<Output = ()>) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let stdout = Arc::new(Mutex::new(tokio::io::stdout()));

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("stdio RPC loop shutting down");
                break;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    tracing::info!("stdin closed, stopping RPC loop");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                tokio::spawn(handle_line(ctx.clone(), stdout.clone(), line));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;

    fn test_context() -> Arc<AppContext> {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("config.jsonc"));
        AppContext::new("proj", store)
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let ctx = test_context();
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::from(1),
            method: "not_a_method".to_string(),
            params: None,
        };
        let response = dispatch(&ctx, request).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_params_is_rejected() {
        let ctx = test_context();
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::from(1),
            method: "interactive_feedback".to_string(),
            params: None,
        };
        let response = dispatch(&ctx, request).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn auto_resubmit_request_completes_and_returns_result() {
        let ctx = test_context();
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::from(7),
            method: "interactive_feedback".to_string(),
            params: Some(serde_json::json!({
                "prompt": "ping",
                "auto_resubmit_timeout": 1,
            })),
        };
        let response = dispatch(&ctx, request).await;
        assert!(response.error.is_none());
        assert!(response.result.is_some());
    }

    /// Regression test for concurrent requests through the real stdio path:
    /// `handle_line` for a blocked call must not hold up a second call
    /// started right after it — the bug this test guards against had both
    /// serialized onto one `await` in the hot loop.
    #[tokio::test]
    async fn two_concurrent_requests_do_not_block_each_other() {
        let ctx = test_context();
        let stdout = Arc::new(Mutex::new(tokio::io::stdout()));

        let line_a = serde_json::to_string(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "interactive_feedback",
            "params": {"prompt": "P1"},
        }))
        .unwrap();
        let line_b = serde_json::to_string(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "interactive_feedback",
            "params": {"prompt": "P2"},
        }))
        .unwrap();

        let handle_a = tokio::spawn(handle_line(ctx.clone(), stdout.clone(), line_a));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let handle_b = tokio::spawn(handle_line(ctx.clone(), stdout.clone(), line_b));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        // Both tasks must have been picked up (both P1 and P2 visible) even
        // though neither has been submitted yet — proof that reading/
        // dispatching line B never waited on line A's still-blocked call.
        let tasks = ctx.queue.list().await;
        assert_eq!(tasks.len(), 2);

        let id_b = tasks.iter().find(|t| t.prompt == "P2").unwrap().id.clone();
        ctx.queue
            .submit(&id_b, crate::tasks::TaskResult { text: "done".to_string(), ..Default::default() })
            .await
            .unwrap();
        ctx.rendezvous
            .deliver(&id_b, crate::tasks::TaskResult { text: "done".to_string(), ..Default::default() })
            .await;

        tokio::time::timeout(std::time::Duration::from_secs(2), handle_b)
            .await
            .expect("handle_line for P2 should complete promptly")
            .unwrap();

        assert!(!handle_a.is_finished(), "P1's call should still be blocked");

        let id_a = ctx.queue.list().await[0].id.clone();
        ctx.rendezvous.cancel(&id_a).await;
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), handle_a).await;
    }
}
