use crate::error::AgentError;
use crate::persona::build_system_prompt;
use crate::query::{QueryEvent, QueryRequest, QueryResult, QueryRunner, MAX_BODY_BYTES, MAX_PROMPT_CHARS};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use bridge_envelope::{EnvelopeHeaders, EnvelopeVerifier};
use bridge_secret_filter::{ChunkBuffer, SecretFilter};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "service": "bridge-agent",
        "runtime": {
            "version": env!("CARGO_PKG_VERSION"),
            "revision": state.revision,
            "startedAt": state.started_at.to_rfc3339(),
            "uptimeSeconds": state.uptime_seconds(),
        }
    }))
}

/// `POST /v1/query` (spec §4.H): verifies the Relay-signed envelope,
/// parses and validates the body, injects persona context in the fixed
/// order, and streams the runner's output as NDJSON — honoring the
/// configured timeout and the client's disconnect as an abort signal.
pub async fn query(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Result<impl IntoResponse, AgentError> {
    if body.len() > MAX_BODY_BYTES {
        return Err(AgentError::PayloadTooLarge);
    }

    let envelope_headers = EnvelopeHeaders::from_getter(|name| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string))
        .ok_or(AgentError::EnvelopeRejected("missing"))?;

    let verifier = EnvelopeVerifier::new(&state.nonces);
    let scope = verifier
        .verify("POST", "/v1/query", &body, &envelope_headers, &state.keys)
        .map_err(|e| AgentError::EnvelopeRejected(e.code()))?;

    let request: QueryRequest = serde_json::from_slice(&body).map_err(|e| AgentError::BadRequest(e.to_string()))?;
    if request.prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(AgentError::PayloadTooLarge);
    }
    let request = request.validate_and_coerce(scope).map_err(|e| AgentError::BadRequest(e.to_string()))?;

    let system_prompt = build_system_prompt(&state, scope, request.system_prompt_append.as_deref());
    let timeout = request.timeout();
    let session_token = request.session_token.clone();

    let runner: Arc<dyn QueryRunner> = Arc::new(crate::query::EchoRunner);
    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel::<QueryEvent>(32);
    let started = Instant::now();
    let deadline = tokio::time::Instant::from_std(started + timeout);

    let run_handle = tokio::spawn(async move {
        runner.run(&request, &system_prompt, session_token.as_deref(), events_tx).await;
    });

    let (lines_tx, lines_rx) = tokio::sync::mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let filter = SecretFilter::outbound();
        let mut buffer = ChunkBuffer::new();

        loop {
            tokio::select! {
                biased;
                event = events_rx.recv() => {
                    let done = match event {
                        Some(QueryEvent::Text { content }) => {
                            let outcome = buffer.append_and_scan(&content, &filter);
                            send_line(&lines_tx, &QueryEvent::Text { content: outcome.redacted_text }).await
                        }
                        Some(QueryEvent::ToolUse { name, input }) => {
                            send_line(&lines_tx, &QueryEvent::ToolUse { name, input }).await
                        }
                        Some(QueryEvent::Done { result }) => {
                            let _ = send_line(&lines_tx, &QueryEvent::Done { result }).await;
                            true
                        }
                        None => {
                            let result = finished_result(started, true, None);
                            let _ = send_line(&lines_tx, &QueryEvent::Done { result }).await;
                            true
                        }
                    };
                    if done {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    run_handle.abort();
                    let result = finished_result(started, false, Some("timed out".to_string()));
                    let _ = send_line(&lines_tx, &QueryEvent::Done { result }).await;
                    break;
                }
            }
        }
    });

    let body_stream = ReceiverStream::new(lines_rx).map(|line| Ok::<_, std::convert::Infallible>(line));
    Ok(axum::body::Body::from_stream(body_stream).into_response())
}

/// Sends one NDJSON line, returning `true` if the receiver went away
/// (client disconnected) so the caller knows to stop and abort upstream.
async fn send_line(tx: &tokio::sync::mpsc::Sender<String>, event: &QueryEvent) -> bool {
    let mut line = serde_json::to_string(event).expect("query event always serializes");
    line.push('\n');
    tx.send(line).await.is_err()
}

fn finished_result(started: Instant, success: bool, error: Option<String>) -> QueryResult {
    QueryResult {
        response: String::new(),
        success,
        cost_usd: 0.0,
        num_turns: 0,
        duration_ms: started.elapsed().as_millis() as u64,
        error,
    }
}
