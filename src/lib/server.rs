//! HTTP server accepting discord.py moderation events pushed to `POST /dpy/modlog`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::watch;

use super::papi::ModLogEnvelope;
use super::papi::PapiEvent;
use crate::error::PythonistaError;

/// Shared by every request.
#[derive(Debug, Clone)]
pub struct ServerState {
    /// The Pythonista API token callers have to present.
    auth: Option<Arc<str>>,
    events: mpsc::Sender<PapiEvent>,
}

impl ServerState {
    pub fn new(auth: Option<&str>, events: mpsc::Sender<PapiEvent>) -> Self {
        Self {
            auth: auth.map(Arc::from),
            events,
        }
    }
}

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/dpy/modlog", post(dpy_modlog))
        .with_state(state)
}

/// Serve until shutdown is requested.
pub async fn run_server(
    host: &str,
    port: u16,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), PythonistaError> {
    let listener = TcpListener::bind((host, port)).await?;
    tracing::info!("Listening for moderation events on http://{host}:{port}/dpy/modlog");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            // An error means the sender is gone, which is a shutdown too.
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

fn is_empty(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

async fn dpy_modlog(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(expected) = state.auth.as_deref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Unable to process request: Missing Auth (Server)",
        )
            .into_response();
    };

    let Some(auth) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    };
    if auth != expected {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let data: Value = match serde_json::from_slice(&body) {
        Ok(data) => data,
        Err(e) => return invalid_payload(e),
    };
    if is_empty(&data) {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid payload: Empty payload provided",
        )
            .into_response();
    }
    let envelope: ModLogEnvelope = match serde_json::from_value(data) {
        Ok(envelope) => envelope,
        Err(e) => return invalid_payload(e),
    };

    if state.events.send(PapiEvent::DpyModlog(envelope)).await.is_err() {
        tracing::warn!("Received a moderation event but the relay isn't running.");
    }
    StatusCode::NO_CONTENT.into_response()
}

fn invalid_payload(e: serde_json::Error) -> Response {
    (StatusCode::BAD_REQUEST, format!("Invalid payload: {e}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const PAYLOAD: &str = r#"{
        "subscription": "dpy_modlog",
        "payload": {
            "moderation_event_type": 1,
            "guild_id": 336642139381301249,
            "target_id": 42,
            "author_id": 7,
            "reason": "spam",
            "event_time": "2023-03-01T12:00:00+00:00"
        }
    }"#;

    fn request(auth: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post("/dpy/modlog");
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(
        auth: Option<&str>,
        req: Request<Body>,
    ) -> (StatusCode, String, mpsc::Receiver<PapiEvent>) {
        let (tx, rx) = mpsc::channel(4);
        let response = create_router(ServerState::new(auth, tx))
            .oneshot(req)
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), rx)
    }

    #[tokio::test]
    async fn missing_server_token() {
        let (status, body, _) = send(None, request(Some("secret"), PAYLOAD)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "Unable to process request: Missing Auth (Server)");
    }

    #[tokio::test]
    async fn auth_is_checked() {
        let (status, body, _) = send(Some("secret"), request(None, PAYLOAD)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "Forbidden");

        let (status, body, _) = send(Some("secret"), request(Some("wrong"), PAYLOAD)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Unauthorized");
    }

    #[tokio::test]
    async fn bad_payloads() {
        let (status, body, _) = send(Some("secret"), request(Some("secret"), "{nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Invalid payload: "));

        let (status, body, _) = send(Some("secret"), request(Some("secret"), "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid payload: Empty payload provided");
    }

    #[tokio::test]
    async fn events_are_forwarded() {
        let (status, _, mut rx) = send(Some("secret"), request(Some("secret"), PAYLOAD)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let Some(PapiEvent::DpyModlog(envelope)) = rx.recv().await else {
            panic!("expected a modlog event");
        };
        assert_eq!(envelope.payload.target_id, 42);
        assert_eq!(envelope.payload.reason, "spam");
    }
}
