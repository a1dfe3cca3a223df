use crate::adapter::{self, Adapter};
use crate::app::AppState;
use crate::credentials;
use crate::dispatch;
use crate::error::GatewayError;
use crate::registry;
use crate::request::GenerationRequest;
use crate::sse::{DONE_SENTINEL, DeltaFilter};
use crate::tokens;
use crate::usage::UsageRecord;
use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::StreamExt;
use serde_json::Value;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle of one streaming generation request. Exactly one terminal state
/// is ever entered, and entered exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Validating,
    Dispatching,
    Streaming,
    Complete,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Failed | SessionState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Init => "init",
            SessionState::Validating => "validating",
            SessionState::Dispatching => "dispatching",
            SessionState::Streaming => "streaming",
            SessionState::Complete => "complete",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }
}

/// Caller-facing control surface for a running session. Cancelling is
/// cooperative and idempotent: the first call aborts the upstream read loop,
/// later calls are no-ops.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait for the terminal state.
    pub async fn finished(&mut self) -> SessionState {
        loop {
            let current = *self.state.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return *self.state.borrow();
            }
        }
    }
}

struct StreamSession {
    id: Uuid,
    state: SessionState,
    /// Accumulated output, kept only for token estimation and dropped with
    /// the session.
    output: String,
    started_at: Instant,
    last_chunk_at: Option<Instant>,
    input_tokens: u64,
    billable: bool,
    model: String,
    state_tx: watch::Sender<SessionState>,
}

impl StreamSession {
    fn new(req: &GenerationRequest, state_tx: watch::Sender<SessionState>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Init,
            output: String::new(),
            started_at: Instant::now(),
            last_chunk_at: None,
            input_tokens: tokens::estimate(&req.input_text()),
            billable: !req.quota_exempt && req.credential.is_none(),
            model: String::new(),
            state_tx,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(!self.state.is_terminal(), "terminal state re-entered");
        self.state = next;
        let _ = self.state_tx.send(next);
    }

    /// Take the terminal transition: estimate output tokens, emit the usage
    /// record for billed sessions, and log the outcome.
    fn finish(&mut self, app: &AppState, terminal: SessionState, error: Option<&GatewayError>) {
        if self.state.is_terminal() {
            return;
        }
        self.transition(terminal);
        let output_tokens = tokens::estimate(&self.output);
        let usage = UsageRecord::new(self.input_tokens, output_tokens);
        if self.billable {
            app.usage.record(self.id, &self.model, usage);
        }
        metrics::counter!("streamgate_sessions_total", "state" => terminal.as_str()).increment(1);
        let idle_ms = self
            .last_chunk_at
            .map(|t| t.elapsed().as_millis() as u64);
        match error {
            Some(err) => tracing::warn!(
                session_id = %self.id,
                state = terminal.as_str(),
                code = err.code(),
                elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                idle_ms,
                "session finished: {err}"
            ),
            None => tracing::info!(
                session_id = %self.id,
                state = terminal.as_str(),
                output_tokens,
                elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                idle_ms,
                "session finished"
            ),
        }
    }
}

/// Validate, dispatch, and begin streaming one request.
///
/// Returns once the upstream has answered 2xx: the handle controls
/// cancellation and the stream yields generated text in arrival order,
/// terminated either by normal closure or by a single trailing error item.
/// Failures before the first upstream byte are returned directly and produce
/// no output stream at all.
pub async fn start(
    app: &AppState,
    req: GenerationRequest,
) -> Result<
    (
        SessionHandle,
        ReceiverStream<Result<Bytes, GatewayError>>,
    ),
    GatewayError,
> {
    let (state_tx, state_rx) = watch::channel(SessionState::Init);
    let mut session = StreamSession::new(&req, state_tx);

    session.transition(SessionState::Validating);
    let base_url = req
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&app.runtime.base_url)
        .to_string();
    let credential = credentials::resolve_credential(
        req.credential.as_deref(),
        &app.runtime.api_keys,
        app.rotation.as_ref(),
    );
    if let Err(err) = credentials::validate_credential(&credential, &base_url) {
        session.finish(app, SessionState::Failed, Some(&err));
        return Err(err);
    }

    session.transition(SessionState::Dispatching);
    let adapter = adapter::select_adapter(&base_url);
    let model = req
        .model
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| app.runtime.model.clone())
        .unwrap_or_else(|| registry::default_model_for(&base_url).to_string());
    session.model = model.clone();
    let endpoint = adapter.build_endpoint(&base_url, &model);
    let headers = adapter.build_headers(&credential);
    let body = adapter.transform_payload(&req, &model, app.runtime.max_tokens);
    tracing::debug!(
        session_id = %session.id,
        provider = adapter.provider,
        endpoint,
        model,
        "dispatching upstream request"
    );

    let resp = match dispatch::dispatch(
        &app.http,
        &endpoint,
        &headers,
        &body,
        app.runtime.request_timeout_ms,
    )
    .await
    {
        Ok(resp) => resp,
        Err(err) => {
            session.finish(app, SessionState::Failed, Some(&err));
            return Err(err);
        }
    };
    tracing::debug!(
        session_id = %session.id,
        status = resp.status().as_u16(),
        "upstream responded"
    );

    session.transition(SessionState::Streaming);
    let cancel = CancellationToken::new();
    let handle = SessionHandle {
        id: session.id,
        cancel: cancel.clone(),
        state: state_rx,
    };
    let (tx, rx) = mpsc::channel::<Result<Bytes, GatewayError>>(64);
    let app = app.clone();
    tokio::spawn(async move {
        pump(app, session, adapter, resp, tx, cancel).await;
    });
    Ok((handle, ReceiverStream::new(rx)))
}

enum Outcome {
    Complete,
    Cancelled,
    Failed(GatewayError),
}

/// Read upstream SSE events and forward admitted fragments until a terminal
/// condition. Dropping the response body on exit releases the connection, so
/// cancellation stops upstream reads immediately.
async fn pump(
    app: AppState,
    mut session: StreamSession,
    adapter: Adapter,
    resp: reqwest::Response,
    tx: mpsc::Sender<Result<Bytes, GatewayError>>,
    cancel: CancellationToken,
) {
    let timeout_ms = app.runtime.request_timeout_ms;
    let mut events = resp.bytes_stream().eventsource();
    let mut filter = DeltaFilter::new();

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Outcome::Cancelled,
            next = events.next() => match next {
                None => break Outcome::Complete,
                Some(Err(err)) => break Outcome::Failed(classify_stream_error(err, timeout_ms)),
                Some(Ok(event)) => {
                    if event.data.trim() == DONE_SENTINEL {
                        break Outcome::Complete;
                    }
                    let value: Value = match serde_json::from_str(&event.data) {
                        Ok(value) => value,
                        Err(err) => {
                            break Outcome::Failed(GatewayError::StreamParse {
                                detail: err.to_string(),
                            });
                        }
                    };
                    let delta = adapter.extract_delta(&value);
                    if let Some(text) = filter.admit(&delta) {
                        session.output.push_str(text);
                        session.last_chunk_at = Some(Instant::now());
                        metrics::counter!("streamgate_stream_chunks_total").increment(1);
                        if tx.send(Ok(Bytes::from(text.to_owned()))).await.is_err() {
                            // Consumer dropped the stream.
                            break Outcome::Cancelled;
                        }
                    }
                }
            }
        }
    };

    match outcome {
        Outcome::Complete => session.finish(&app, SessionState::Complete, None),
        Outcome::Cancelled => session.finish(&app, SessionState::Cancelled, None),
        Outcome::Failed(err) => {
            // Text already delivered stays delivered; the error rides behind it.
            let _ = tx.send(Err(err.clone())).await;
            session.finish(&app, SessionState::Failed, Some(&err));
        }
    }
}

fn classify_stream_error(
    err: EventStreamError<reqwest::Error>,
    timeout_ms: u64,
) -> GatewayError {
    match err {
        EventStreamError::Utf8(err) => GatewayError::StreamParse {
            detail: err.to_string(),
        },
        EventStreamError::Parser(err) => GatewayError::StreamParse {
            detail: err.to_string(),
        },
        EventStreamError::Transport(err) if err.is_timeout() => {
            GatewayError::UpstreamTimeout { timeout_ms }
        }
        EventStreamError::Transport(err) => GatewayError::Transport {
            detail: err.to_string(),
        },
    }
}
