use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_001;
const CHAT_PATH: &str = "/api/chat/completions";

#[derive(Copy, Clone)]
enum MockScenario {
    Text,
    Think,
    Tool,
    FrameError,
    Status,
}

impl MockScenario {
    fn as_str(self) -> &'static str {
        match self {
            MockScenario::Text => "text",
            MockScenario::Think => "think",
            MockScenario::Tool => "tool",
            MockScenario::FrameError => "frame_error",
            MockScenario::Status => "status",
        }
    }
}

struct MockState {
    scenario: MockScenario,
    hits: AtomicU64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        hits: AtomicU64::new(0),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!(
        "mock phase upstream on http://127.0.0.1:{port}{CHAT_PATH} (scenario {})",
        state.scenario.as_str()
    );

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("think") => MockScenario::Think,
        Ok("tool") => MockScenario::Tool,
        Ok("frame_error") => MockScenario::FrameError,
        Ok("status") => MockScenario::Status,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &MockState) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    let path = parts.uri.path();
    if parts.method == Method::GET && path == "/_mock/stats" {
        let body = format!(
            "{{\"scenario\":\"{}\",\"hits\":{}}}",
            state.scenario.as_str(),
            state.hits.load(Ordering::Relaxed)
        );
        return simple_response(StatusCode::OK, "application/json", Bytes::from(body));
    }
    if path != CHAT_PATH {
        return simple_response_static(
            StatusCode::NOT_FOUND,
            "application/json",
            br#"{"error":"not_found"}"#,
        );
    }
    if parts.method != Method::POST {
        return simple_response_static(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        );
    }
    state.hits.fetch_add(1, Ordering::Relaxed);

    let body = match state.scenario {
        MockScenario::Text => STREAM_TEXT,
        MockScenario::Think => STREAM_THINK,
        MockScenario::Tool => STREAM_TOOL,
        MockScenario::FrameError => STREAM_FRAME_ERROR,
        MockScenario::Status => {
            return simple_response_static(
                StatusCode::SERVICE_UNAVAILABLE,
                "application/json",
                br#"{"detail":"mock_injected_error"}"#,
            );
        }
    };
    let mut response = simple_response_static(StatusCode::OK, "text/event-stream", body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn simple_response_static(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    simple_response(status, content_type, Bytes::from_static(body))
}

const STREAM_TEXT: &[u8] = b"data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"delta_content\":\"o\"}}\n\ndata: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"delta_content\":\"k\"}}\n\ndata: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"done\",\"done\":true,\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1,\"total_tokens\":2}}}\n\n";
const STREAM_THINK: &[u8] = b"data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"thinking\",\"delta_content\":\"<details type=\\\"reasoning\\\" done=\\\"false\\\">\\n<summary>Thinking\xe2\x80\xa6</summary>\\n> analysis\"}}\n\ndata: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"edit_content\":\"<details type=\\\"reasoning\\\" done=\\\"true\\\">\\n> analysis\\n</details>\\nok\",\"delta_content\":\"ok\"}}\n\ndata: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"done\",\"done\":true}}\n\n";
const STREAM_TOOL: &[u8] = b"data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"delta_content\":\"```json\\n{\\\"tool_calls\\\":[{\\\"id\\\":\\\"call_mock\\\",\\\"type\\\":\\\"function\\\",\\\"function\\\":{\\\"name\\\":\\\"get_weather\\\",\\\"arguments\\\":{\\\"city\\\":\\\"Paris\\\"}}}]}\\n```\"}}\n\ndata: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"done\",\"done\":true}}\n\n";
const STREAM_FRAME_ERROR: &[u8] = b"data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"delta_content\":\"partial\"}}\n\ndata: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"error\":{\"code\":500,\"detail\":\"mock_injected_error\"}}}\n\n";
