//! HTTP gateway for Madoguchi.
//!
//! Routes:
//! - `GET /health` — liveness, version, catalog size, live session count
//! - `POST /callback` — LINE webhook. The raw body is verified against
//!   `X-Line-Signature` before anything is parsed; a bad signature or payload
//!   is a 400 and never reaches the orchestrator.
//!
//! Each text event is processed to completion (rank, assemble, model call,
//! reply) in event order before the 200 is returned. The work runs on its own
//! task, so a client that hangs up mid-request does not cancel pending replies.

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use madoguchi_agent::{Catalog, TurnOrchestrator};
use madoguchi_channels::{LineChannel, SIGNATURE_HEADER};
use madoguchi_config::AppConfig;
use madoguchi_core::channel::ReplyChannel;
use madoguchi_core::error::ChannelError;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<TurnOrchestrator>,
    /// Verifies and parses inbound webhooks
    pub line: Arc<LineChannel>,
    /// Delivers replies (the LINE channel in production)
    pub replies: Arc<dyn ReplyChannel>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/callback", post(callback_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the production state: catalog, provider, journal, LINE channel.
///
/// Fails if LINE credentials are missing or the journal cannot be opened.
pub async fn build_state(config: &AppConfig) -> Result<GatewayState, Box<dyn std::error::Error>> {
    let catalog = Arc::new(Catalog::load(&config.catalog.path));
    let provider = madoguchi_providers::build_from_config(config);
    let journal = madoguchi_journal::build_from_config(config).await?;

    let orchestrator = Arc::new(
        TurnOrchestrator::from_config(config, provider, catalog).with_journal(journal),
    );
    let line = Arc::new(LineChannel::from_config(&config.line)?);

    Ok(GatewayState {
        orchestrator,
        replies: line.clone(),
        line,
    })
}

/// Start the gateway HTTP server and run until Ctrl+C / SIGTERM.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(build_state(&config).await?);

    info!(
        addr = %addr,
        model = %config.model.name,
        mode = %config.dialogue.mode,
        catalog = state.orchestrator.catalog().len(),
        "Gateway starting"
    );

    let app = build_router(state, config.gateway.body_limit_bytes);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    catalog_records: usize,
    sessions: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        catalog_records: state.orchestrator.catalog().len(),
        sessions: state.orchestrator.sessions().len().await,
    })
}

async fn callback_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    debug!(body = %String::from_utf8_lossy(&body), "Callback body");

    let messages = match state.line.parse_webhook(&body, signature) {
        Ok(messages) => messages,
        Err(ChannelError::InvalidSignature) => {
            warn!(
                signature = if signature.is_some() { "invalid" } else { "missing" },
                "Rejected callback with bad signature"
            );
            return Err(StatusCode::BAD_REQUEST);
        }
        Err(e) => {
            warn!(error = %e, "Rejected callback with bad payload");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    info!(events = messages.len(), "Callback accepted");

    let worker = tokio::spawn(async move {
        for message in &messages {
            state
                .orchestrator
                .handle_message(message, state.replies.as_ref())
                .await;
        }
    });
    if let Err(e) = worker.await {
        error!(error = %e, "Callback worker failed");
    }

    Ok("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use madoguchi_agent::DEGRADED_REPLY;
    use madoguchi_core::channel::ReplyHandle;
    use madoguchi_core::error::ProviderError;
    use madoguchi_core::message::Message;
    use madoguchi_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use madoguchi_core::service::ServiceRecord;
    use std::sync::Mutex;
    use tower::ServiceExt;

    const SECRET: &str = "gateway-test-secret";

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let turns = request.messages.len();
            Ok(ProviderResponse {
                message: Message::assistant(format!("reply #{turns}")),
                usage: None,
                model: request.model,
                finish_reason: None,
            })
        }
    }

    struct DownProvider;

    #[async_trait]
    impl Provider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::RateLimited {
                retry_after_secs: 30,
            })
        }
    }

    /// Answers after a long pause.
    struct SlowProvider;

    #[async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(std::time::Duration::from_secs(20)).await;
            Ok(ProviderResponse {
                message: Message::assistant("お待たせしました"),
                usage: None,
                model: request.model,
                finish_reason: None,
            })
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(ReplyHandle, String)>>,
    }

    #[async_trait]
    impl ReplyChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn reply(&self, handle: &ReplyHandle, text: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push((handle.clone(), text.to_string()));
            Ok(())
        }
    }

    fn test_state(provider: Arc<dyn Provider>) -> (SharedState, Arc<RecordingChannel>) {
        let catalog = Arc::new(Catalog::from_records(vec![ServiceRecord {
            name: "児童手当".into(),
            description: "手当の案内".into(),
            url: Some("https://example.jp/teate".into()),
            keywords: vec!["手当".into()],
        }]));
        let replies = Arc::new(RecordingChannel::default());
        let state = Arc::new(GatewayState {
            orchestrator: Arc::new(TurnOrchestrator::new(provider, catalog)),
            line: Arc::new(LineChannel::new(SECRET, "token")),
            replies: replies.clone(),
        });
        (state, replies)
    }

    fn sign(body: &str) -> String {
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn text_event(user: &str, token: &str, text: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "message",
            "replyToken": token,
            "source": {"type": "user", "userId": user},
            "message": {"type": "text", "id": "1", "text": text}
        })
    }

    fn callback(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/callback")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("X-Line-Signature", sig);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (state, _) = test_state(Arc::new(EchoProvider));
        let app = build_router(state, 1024 * 1024);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["catalog_records"], 1);
        assert_eq!(json["sessions"], 0);
    }

    #[tokio::test]
    async fn signed_callback_replies_to_each_text_event() {
        let (state, replies) = test_state(Arc::new(EchoProvider));
        let app = build_router(state.clone(), 1024 * 1024);

        let body = serde_json::json!({
            "destination": "U0",
            "events": [
                text_event("U1", "tok-1", "児童手当について教えて"),
                {"type": "follow", "replyToken": "tok-x", "source": {"type": "user", "userId": "U9"}},
                text_event("U1", "tok-2", "ありがとう"),
            ]
        })
        .to_string();

        let response = app.oneshot(callback(&body, Some(sign(&body).as_str()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");

        let sent = replies.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (ReplyHandle("tok-1".into()), "reply #1".to_string()),
                // second turn sees the first exchange in the transcript
                (ReplyHandle("tok-2".into()), "reply #3".to_string()),
            ]
        );
        assert_eq!(state.orchestrator.sessions().len().await, 1);
    }

    #[tokio::test]
    async fn bad_signature_is_400_and_skips_orchestrator() {
        let (state, replies) = test_state(Arc::new(EchoProvider));
        let body = serde_json::json!({"events": [text_event("U1", "tok-1", "hi")]}).to_string();

        let app = build_router(state.clone(), 1024 * 1024);
        let response = app.oneshot(callback(&body, Some("AAAA"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let app = build_router(state.clone(), 1024 * 1024);
        let response = app.oneshot(callback(&body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(replies.sent.lock().unwrap().is_empty());
        assert_eq!(state.orchestrator.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn signed_garbage_is_400() {
        let (state, _) = test_state(Arc::new(EchoProvider));
        let app = build_router(state, 1024 * 1024);
        let body = "not json";
        let response = app.oneshot(callback(body, Some(sign(body).as_str()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn model_outage_still_replies_and_returns_200() {
        let (state, replies) = test_state(Arc::new(DownProvider));
        let app = build_router(state, 1024 * 1024);
        let body = serde_json::json!({"events": [text_event("U1", "tok-1", "hi")]}).to_string();

        let response = app.oneshot(callback(&body, Some(sign(&body).as_str()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = replies.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, DEGRADED_REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn client_disconnect_does_not_cancel_replies() {
        let (state, replies) = test_state(Arc::new(SlowProvider));
        let app = build_router(state, 1024 * 1024);
        let body = serde_json::json!({
            "events": [
                text_event("U1", "tok-1", "児童手当について教えて"),
                text_event("U2", "tok-2", "一時保育はありますか"),
            ]
        })
        .to_string();

        // The caller gives up long before both turns finish.
        let request = app.oneshot(callback(&body, Some(sign(&body).as_str())));
        let result = tokio::time::timeout(std::time::Duration::from_secs(10), request).await;
        assert!(result.is_err());

        tokio::time::sleep(std::time::Duration::from_secs(120)).await;

        let sent = replies.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (ReplyHandle("tok-1".into()), "お待たせしました".to_string()),
                (ReplyHandle("tok-2".into()), "お待たせしました".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let (state, replies) = test_state(Arc::new(EchoProvider));
        let app = build_router(state, 64);
        let body = serde_json::json!({"events": [text_event("U1", "tok-1", &"あ".repeat(100))]})
            .to_string();

        let response = app.oneshot(callback(&body, Some(sign(&body).as_str()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(replies.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn build_state_requires_line_credentials() {
        let dir = std::env::temp_dir().join("madoguchi-gateway-missing.json");
        let mut config = AppConfig::default();
        config.catalog.path = dir;
        assert!(build_state(&config).await.is_err());

        config.line.channel_secret = Some("s".into());
        config.line.channel_access_token = Some("t".into());
        let state = build_state(&config).await.unwrap();
        assert!(state.orchestrator.catalog().is_empty());
        assert_eq!(state.replies.name(), "line");
    }
}
