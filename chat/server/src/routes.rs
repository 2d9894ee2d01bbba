//! Route handlers
//!
//! `POST /api/chat` takes a form with `input` (required) and `history`
//! (optional JSON), sent either `multipart/form-data` (browser `FormData`) or
//! `application/x-www-form-urlencoded`, and answers with a streamed body in the configured wire
//! format. Only two failure bodies ever leave this module: `Invalid request`
//! (400) and `Internal Server Error` (500). Provider detail stays in the logs.

use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use chat_core::{ChatError, History, ResponseBody, WireFormat};

use crate::server::AppState;

/// Request id header, read from the request and echoed on the response
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Debug, Default, Deserialize)]
struct ChatForm {
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    history: Option<String>,
}

/// Caller-supplied request id, or a fresh one
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string)
}

fn invalid_request() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid request").into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// Read the chat form in whichever encoding the caller used
async fn read_form(request: Request) -> Result<ChatForm, Response> {
    if !is_multipart(request.headers()) {
        let body = Bytes::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        return serde_urlencoded::from_bytes(&body).map_err(|e| {
            warn!(error = %e, "Rejected unparseable chat form");
            invalid_request()
        });
    }

    let mut multipart = Multipart::from_request(request, &()).await.map_err(|e| {
        warn!(error = %e, "Rejected multipart request without a boundary");
        invalid_request()
    })?;

    let mut form = ChatForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_rejection(e.status(), &e)),
        };
        let name = field.name().map(str::to_owned);
        let value = field
            .text()
            .await
            .map_err(|e| multipart_rejection(e.status(), &e))?;
        match name.as_deref() {
            Some("input") => form.input = Some(value),
            Some("history") => form.history = Some(value),
            other => debug!(field = ?other, "Ignoring unknown form field"),
        }
    }
    Ok(form)
}

fn multipart_rejection(status: StatusCode, error: &dyn std::fmt::Display) -> Response {
    warn!(%error, %status, "Rejected unreadable multipart form");
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return status.into_response();
    }
    invalid_request()
}

/// `POST /api/chat`
pub async fn chat(State(state): State<AppState>, request: Request) -> Response {
    let request_id = request_id(request.headers());
    let span = info_span!("chat", request_id = %request_id);
    handle_chat(state, request_id, request).instrument(span).await
}

async fn handle_chat(state: AppState, request_id: String, request: Request) -> Response {
    let started = Instant::now();

    let form = match read_form(request).await {
        Ok(form) => form,
        Err(rejection) => return rejection,
    };
    let input = form.input.unwrap_or_default();
    let history = History::decode_or_empty(form.history.as_deref());
    debug!(
        input_len = input.len(),
        history_len = history.messages.len(),
        thread_id = ?history.thread_id,
        "Chat request"
    );

    match state.chat.respond(&input, history).await {
        Ok(body) => stream_response(state.chat.format(), request_id, body, started),
        Err(ChatError::Validation(reason)) => {
            warn!(%reason, "Rejected chat request");
            invalid_request()
        }
        Err(e) => {
            error!(
                error = %e,
                elapsed_ms = started.elapsed().as_millis(),
                "Chat request failed before streaming"
            );
            internal_error()
        }
    }
}

/// Logs how long a response body was alive and how much it carried
struct ResponseTimer {
    request_id: String,
    started: Instant,
    bytes: usize,
    failed: bool,
}

impl ResponseTimer {
    fn observe(&mut self, chunk: &Result<Bytes, ChatError>) {
        match chunk {
            Ok(bytes) => self.bytes += bytes.len(),
            Err(e) => {
                warn!(request_id = %self.request_id, error = %e, "Chat stream aborted");
                self.failed = true;
            }
        }
    }
}

impl Drop for ResponseTimer {
    fn drop(&mut self) {
        info!(
            request_id = %self.request_id,
            elapsed_ms = self.started.elapsed().as_millis(),
            bytes = self.bytes,
            failed = self.failed,
            "Chat response finished"
        );
    }
}

fn stream_response(
    format: WireFormat,
    request_id: String,
    body: ResponseBody,
    started: Instant,
) -> Response {
    let echoed = HeaderValue::from_str(&request_id).ok();
    let mut timer = ResponseTimer {
        request_id,
        started,
        bytes: 0,
        failed: false,
    };
    let body = body.inspect(move |chunk| timer.observe(chunk));

    let mut response = Body::from_stream(body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    if let Some(id) = echoed {
        headers.insert(REQUEST_ID_HEADER, id);
    }
    response
}

/// `GET /api/resources` (development only)
pub async fn resources(State(state): State<AppState>) -> Response {
    if !state.environment.is_development() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(catalog) = state.resources.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match catalog.list().await {
        Ok(listing) => {
            debug!(
                files = listing.files.len(),
                vector_stores = listing.vector_stores.len(),
                "Listed resources"
            );
            Json(listing).into_response()
        }
        Err(failure) => {
            error!(stage = %failure.stage, cause = %failure.cause, "Resource listing failed");
            internal_error()
        }
    }
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::Router;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use chat_core::backend::ApiClient;
    use chat_core::{
        ChatService, CompletionBackend, CompletionRequest, CompletionStream, Environment,
        NoRetrieval, ResourceCatalog, StreamingToken, ThreadId, UpstreamFailure, UpstreamStage,
    };

    use crate::server::{build_router, AppState, CHAT_PATH, HEALTH_PATH, RESOURCES_PATH};

    /// How a scripted reply ends
    #[derive(Clone)]
    enum Ending {
        Complete,
        Fail,
    }

    /// Backend that replays a fixed script and records requests
    struct ScriptedBackend {
        setup: Option<UpstreamFailure>,
        deltas: Vec<&'static str>,
        ending: Ending,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn replying(deltas: Vec<&'static str>) -> Self {
            Self {
                setup: None,
                deltas,
                ending: Ending::Complete,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing_after(deltas: Vec<&'static str>) -> Self {
            Self {
                ending: Ending::Fail,
                ..Self::replying(deltas)
            }
        }

        fn failing_setup(stage: UpstreamStage) -> Self {
            Self {
                setup: Some(UpstreamFailure::new(stage, "HTTP 500: secret provider detail")),
                ..Self::replying(Vec::new())
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn start(&self, request: CompletionRequest) -> Result<CompletionStream, UpstreamFailure> {
            self.seen.lock().unwrap().push(request);
            if let Some(failure) = self.setup.clone() {
                return Err(failure);
            }
            let (tx, stream) = CompletionStream::channel(Some(ThreadId::new("t1")));
            let deltas = self.deltas.clone();
            let ending = self.ending.clone();
            tokio::spawn(async move {
                for delta in deltas {
                    let _ = tx.send(StreamingToken::Delta(delta.to_string())).await;
                }
                let last = match ending {
                    Ending::Complete => StreamingToken::Complete,
                    Ending::Fail => StreamingToken::Error(UpstreamFailure::new(
                        UpstreamStage::DeltaRead,
                        "connection reset",
                    )),
                };
                let _ = tx.send(last).await;
            });
            Ok(stream)
        }
    }

    fn app(backend: Arc<ScriptedBackend>, format: WireFormat) -> Router {
        let state = AppState {
            chat: ChatService::new(backend, Arc::new(NoRetrieval), format, Duration::from_secs(5)),
            environment: Environment::Production,
            resources: None,
        };
        build_router(state, 1024)
    }

    fn form(pairs: &[(&str, &str)]) -> String {
        serde_urlencoded::to_string(pairs).unwrap()
    }

    fn chat_request(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(CHAT_PATH)
            .header("content-type", "application/x-www-form-urlencoded")
            .header("content-length", body.len())
            .body(Body::from(body))
            .unwrap()
    }

    fn multipart_request(parts: &[(&str, &str)]) -> Request<Body> {
        let boundary = "----folio-boundary";
        let mut body = String::new();
        for (name, value) in parts {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        Request::builder()
            .method("POST")
            .uri(CHAT_PATH)
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .header("content-length", body.len())
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_chat_streams_raw_text_with_headers() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["The ", "answer ", "is 42."]));
        let (status, headers, body) = send(
            app(backend.clone(), WireFormat::RawText),
            chat_request(form(&[("input", "What is the answer?")])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "The answer is 42.");
        assert_eq!(headers[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[CONNECTION], "keep-alive");
        assert!(headers.contains_key(REQUEST_ID_HEADER));
        assert_eq!(backend.seen.lock().unwrap()[0].input, "What is the answer?");
    }

    #[tokio::test]
    async fn test_chat_streams_framed_records() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["He", "llo"]));
        let (status, headers, body) = send(
            app(backend, WireFormat::Framed),
            chat_request(form(&[("input", "Hi")])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
        assert_eq!(
            body,
            "data: {\"type\":\"message\",\"content\":\"He\",\"threadId\":\"t1\"}\n\n\
             data: {\"type\":\"message\",\"content\":\"llo\",\"threadId\":\"t1\"}\n\n"
        );
    }

    #[tokio::test]
    async fn test_multipart_form_is_accepted() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["Hello"]));
        let history = json!([
            { "role": "user", "content": "Earlier" },
            { "role": "assistant", "content": "Reply", "threadId": "t1" }
        ])
        .to_string();
        let (status, _, body) = send(
            app(backend.clone(), WireFormat::RawText),
            multipart_request(&[("input", "Hi"), ("history", &history)]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello");
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].input, "Hi");
        assert_eq!(seen[0].history.messages.len(), 2);
        assert_eq!(seen[0].history.thread_id, Some(ThreadId::new("t1")));
    }

    #[tokio::test]
    async fn test_urlencoded_form_is_accepted() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["Hello"]));
        let (status, _, body) = send(
            app(backend.clone(), WireFormat::RawText),
            chat_request(form(&[("input", "Hi"), ("history", "[]")])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello");
        assert_eq!(backend.seen.lock().unwrap()[0].input, "Hi");
    }

    #[tokio::test]
    async fn test_multipart_without_input_is_400() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["unused"]));
        let (status, _, text) = send(
            app(backend.clone(), WireFormat::RawText),
            multipart_request(&[("history", "[]")]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "Invalid request");
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_echoes_request_id() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["ok"]));
        let mut request = chat_request(form(&[("input", "Hi")]));
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-42"));

        let (_, headers, _) = send(app(backend, WireFormat::RawText), request).await;
        assert_eq!(headers[REQUEST_ID_HEADER], "req-42");
    }

    #[tokio::test]
    async fn test_blank_or_missing_input_is_400() {
        for body in [form(&[("input", "   ")]), form(&[("history", "[]")]), String::new()] {
            let backend = Arc::new(ScriptedBackend::replying(vec!["unused"]));
            let (status, _, text) =
                send(app(backend.clone(), WireFormat::RawText), chat_request(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(text, "Invalid request");
            assert!(backend.seen.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_history_is_treated_as_empty() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["ok"]));
        let (status, _, _) = send(
            app(backend.clone(), WireFormat::RawText),
            chat_request(form(&[("input", "Hi"), ("history", "{not json")])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(backend.seen.lock().unwrap()[0].history, History::default());
    }

    #[tokio::test]
    async fn test_history_thread_reaches_backend() {
        let history = json!({
            "messages": [
                { "role": "user", "content": "Hi" },
                { "role": "assistant", "content": "Hello!", "threadId": "t1" }
            ]
        })
        .to_string();
        let backend = Arc::new(ScriptedBackend::replying(vec!["ok"]));
        send(
            app(backend.clone(), WireFormat::Framed),
            chat_request(form(&[("input", "More?"), ("history", &history)])),
        )
        .await;

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].history.messages.len(), 2);
        assert_eq!(seen[0].history.thread_id, Some(ThreadId::new("t1")));
    }

    #[tokio::test]
    async fn test_upstream_setup_failure_is_500_without_detail() {
        let backend = Arc::new(ScriptedBackend::failing_setup(UpstreamStage::RunCreation));
        let (status, _, text) = send(
            app(backend, WireFormat::Framed),
            chat_request(form(&[("input", "Hi")])),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_framed_failure_mid_stream_ends_with_error_record() {
        let backend = Arc::new(ScriptedBackend::failing_after(vec!["Part"]));
        let (status, _, body) = send(
            app(backend, WireFormat::Framed),
            chat_request(form(&[("input", "Hi")])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let records: Vec<&str> = body.split("\n\n").filter(|r| !r.is_empty()).collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains("\"content\":\"Part\""));
        assert!(records[1].starts_with("data: {\"type\":\"error\""));
        assert!(!body.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["unused"]));
        let big = "x".repeat(4096);
        let (status, _, _) = send(
            app(backend.clone(), WireFormat::RawText),
            chat_request(form(&[("input", &big)])),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let backend = Arc::new(ScriptedBackend::replying(Vec::new()));
        let request = Request::builder().uri(HEALTH_PATH).body(Body::empty()).unwrap();
        let (status, _, body) = send(app(backend, WireFormat::RawText), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_resources_hidden_outside_development() {
        let backend = Arc::new(ScriptedBackend::replying(Vec::new()));
        let request = Request::builder().uri(RESOURCES_PATH).body(Body::empty()).unwrap();
        let (status, _, _) = send(app(backend, WireFormat::RawText), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resources_listed_in_development() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "file_1", "filename": "resume.pdf", "bytes": 10 }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/vector_stores"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let client = ApiClient::new(format!("{}/v1", server.uri()), "sk-test").unwrap();
        let state = AppState {
            chat: ChatService::new(
                Arc::new(ScriptedBackend::replying(Vec::new())),
                Arc::new(NoRetrieval),
                WireFormat::RawText,
                Duration::from_secs(5),
            ),
            environment: Environment::Development,
            resources: Some(ResourceCatalog::new(client)),
        };
        let request = Request::builder().uri(RESOURCES_PATH).body(Body::empty()).unwrap();
        let (status, _, body) = send(build_router(state, 1024), request).await;

        assert_eq!(status, StatusCode::OK);
        let listing: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(listing["files"][0]["filename"], "resume.pdf");
        assert_eq!(listing["vectorStores"], json!([]));
    }
}
