//! Gateway HTTP server
//!
//! Routes:
//! - `GET /ws/run/`: WebSocket session, one [`Session`] per connection
//! - `POST /run/`: one-shot execution, collected into a JSON result
//! - `GET /health`, `GET /languages`

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::protocol::{RunRequest, ServerMessage};
use super::session::Session;
use crate::config::GatewayConfig;
use crate::error::Error;
use crate::sandbox::{Engine, ExecutionRequest, ExecutionResult, Language};

/// Frames buffered per direction between the socket and the session
const SESSION_BUFFER: usize = 64;

// ---- App State ----

#[derive(Clone)]
pub struct AppState {
    engine: Engine,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        AppState { engine }
    }
}

// ---- Error Handling ----

pub struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

// ---- Response Types ----

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    runtime: String,
    version: &'static str,
}

#[derive(Serialize)]
struct LanguageInfo {
    language: Language,
    image: &'static str,
    filename: &'static str,
}

// ---- Handlers ----

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        runtime: state.engine.runtime_name().to_string(),
        version: crate::VERSION,
    })
}

async fn languages() -> Json<Vec<LanguageInfo>> {
    Json(
        Language::ALL
            .into_iter()
            .map(|language| {
                let profile = language.profile();
                LanguageInfo {
                    language,
                    image: profile.image,
                    filename: profile.filename,
                }
            })
            .collect(),
    )
}

async fn run_once(
    State(state): State<AppState>,
    Json(run): Json<RunRequest>,
) -> Result<Json<ExecutionResult>, AppError> {
    let language: Language = run.language.parse()?;
    let mut request = ExecutionRequest::new(run.code, language);
    request.stdin = run.stdin;

    let result = state.engine.run(request).await?;
    Ok(Json(result))
}

async fn ws_run(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine))
}

/// Pump frames between the socket and a session until either side ends
async fn handle_socket(socket: WebSocket, engine: Engine) {
    let (mut sink, mut stream) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(SESSION_BUFFER);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(SESSION_BUFFER);

    let session = Session::new(engine);
    let session_id = session.id();
    let mut session_task = tokio::spawn(session.serve(inbound_rx, outbound_tx));

    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(Message::Text(message.to_json().into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut reader = tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            let text = match frame {
                Message::Text(text) => text.as_str().to_owned(),
                Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if inbound_tx.send(text).await.is_err() {
                break;
            }
        }
    });

    // Whichever side finishes first ends the connection; dropping the
    // inbound sender makes the session terminate its processes.
    tokio::select! {
        _ = &mut reader => {}
        _ = &mut writer => {}
        _ = &mut session_task => {}
    }
    reader.abort();

    if !session_task.is_finished() {
        let _ = session_task.await;
    }
    if !writer.is_finished() {
        let _ = writer.await;
    }
    debug!(session_id = %session_id, "WebSocket closed");
}

// ---- Router ----

pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    let router = Router::new()
        .route("/ws/run/", get(ws_run))
        .route("/ws/run", get(ws_run))
        .route("/run/", post(run_once))
        .route("/run", post(run_once))
        .route("/health", get(health))
        .route("/languages", get(languages))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Bind and serve until `shutdown` resolves
pub async fn serve(
    engine: Engine,
    config: &GatewayConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> crate::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))?;

    let app = build_router(AppState::new(engine), config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on ws://{}/ws/run/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::sandbox::testing::ShellRuntime;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn router() -> (TempDir, Router) {
        let root = tempdir().unwrap();
        let config = SandboxConfig {
            workspace_root: root.path().to_path_buf(),
            execution_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            drain_grace: Duration::from_millis(500),
            ..Default::default()
        };
        let engine = Engine::new(Arc::new(ShellRuntime::default()), &config);
        (root, build_router(AppState::new(engine), &GatewayConfig::default()))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_run(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/run/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_root, app) = router();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["runtime"], "shell");
    }

    #[tokio::test]
    async fn test_languages() {
        let (_root, app) = router();

        let response = app
            .oneshot(Request::builder().uri("/languages").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["language"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["python", "cpp", "javascript", "java"]);
    }

    #[tokio::test]
    async fn test_run_once() {
        let (_root, app) = router();

        let response = app
            .oneshot(post_run(json!({
                "code": "read x; echo \"in: $x\"",
                "language": "python",
                "stdin": "7"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["stdout"], "in: 7");
        assert_eq!(body["timed_out"], false);
    }

    #[tokio::test]
    async fn test_run_unsupported_language() {
        let (_root, app) = router();

        let response = app
            .oneshot(post_run(json!({"code": "x", "language": "cobol"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Unsupported language: cobol"})
        );
    }
}
