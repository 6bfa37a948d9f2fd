use crate::error::{ErrorDetail, CODE_INVALID_ARGUMENTS};
use crate::events::SubscriptionId;
use crate::messenger::StreamHandler;
use crate::models::*;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cancels its subscription when the SSE stream holding it is dropped.
struct ListenGuard {
    handler: Arc<dyn StreamHandler>,
    subscription: SubscriptionId,
}

impl Drop for ListenGuard {
    fn drop(&mut self) {
        tracing::debug!("SSE stream for subscription {} closed", self.subscription);
        self.handler.on_cancel(Some(self.subscription));
    }
}

fn invalid_body(message: String) -> Response {
    ErrorDetail::new(CODE_INVALID_ARGUMENTS, message).into_response()
}

// GET /v1/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        platform: state.platform.clone(),
        channels: state.messenger.channels(),
        listening: state.messenger.listening_channels(),
    })
}

// POST /v1/channels/:channel/invoke
pub async fn invoke_method(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Result<Json<MethodCall>, JsonRejection>,
) -> Response {
    let call = match body {
        Ok(Json(call)) => call,
        Err(rejection) => return invalid_body(rejection.body_text()),
    };

    match state.messenger.invoke_method(&channel, &call) {
        Some(MethodResult::Success(result)) => Json(InvokeResponse { result }).into_response(),
        Some(MethodResult::Error(detail)) => detail.into_response(),
        Some(MethodResult::NotImplemented) => StatusCode::NOT_IMPLEMENTED.into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// POST /v1/channels/:channel/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Bytes,
) -> Response {
    // An empty body is an absent message, not a malformed one
    let message = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Some(value),
            Err(e) => return invalid_body(format!("Message is not valid JSON: {}", e)),
        }
    };

    match state.messenger.send_message(&channel, message) {
        Some(reply) => Json(MessageReply { reply }).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// GET /v1/channels/:channel/events
pub async fn listen_events(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Response {
    let Some(handler) = state.messenger.stream_handler(&channel) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let (tx, rx) = mpsc::channel::<Event>(state.event_buffer);
    let subscription = handler.on_listen(Arc::new(tx));
    let guard = ListenGuard {
        handler,
        subscription,
    };

    let stream = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let frame = SseEvent::default().event("event").json_data(event);
        Some((frame, (rx, guard)))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// DELETE /v1/channels/:channel/events
pub async fn cancel_events(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> StatusCode {
    if let Some(handler) = state.messenger.stream_handler(&channel) {
        handler.on_cancel(None);
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use crate::config::BridgeConfig;
    use crate::platform::testing::collaborators;
    use crate::{build_messenger, router, AppState};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio_test::assert_ok;

    const METHODS: &str = "com.example.native_bridge%2Fmethods";
    const EVENTS: &str = "com.example.native_bridge%2Fevents";
    const MESSAGES: &str = "com.example.native_bridge%2Fbasic_messages";

    async fn spawn_server(battery: Option<u8>) -> String {
        let config = BridgeConfig {
            platform_name: "Linux".to_string(),
            ..BridgeConfig::default()
        };
        let state = AppState {
            messenger: Arc::new(build_messenger(&config, collaborators(battery))),
            platform: config.platform_name.clone(),
            event_buffer: config.event_buffer,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn invoke(base: &str, channel: &str, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/v1/channels/{}/invoke", base, channel))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let base = spawn_server(Some(80)).await;

        let resp = invoke(
            &base,
            METHODS,
            json!({ "method": "computeSum", "arguments": { "a": 40, "b": 2 } }),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "result": 42 }));

        let resp = invoke(&base, METHODS, json!({ "method": "getBatteryLevel" })).await;
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["result"], 80);
    }

    #[tokio::test]
    async fn test_invoke_failures() {
        let base = spawn_server(None).await;

        let resp = invoke(&base, METHODS, json!({ "method": "getBatteryLevel" })).await;
        assert_eq!(resp.status(), 503);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "UNAVAILABLE");
        assert_eq!(body["error"]["message"], "Battery level not available.");

        let resp = invoke(
            &base,
            METHODS,
            json!({ "method": "computeSum", "arguments": { "a": "x", "b": 2 } }),
        )
        .await;
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "INVALID_ARGUMENTS");
    }

    #[tokio::test]
    async fn test_invoke_unknown_method_and_channel() {
        let base = spawn_server(None).await;

        let resp = invoke(&base, METHODS, json!({ "method": "unknownThing" })).await;
        assert_eq!(resp.status(), 501);
        assert!(resp.bytes().await.unwrap().is_empty());

        let resp = invoke(
            &base,
            "com.example.elsewhere%2Fmethods",
            json!({ "method": "computeSum" }),
        )
        .await;
        assert_eq!(resp.status(), 204);
    }

    #[tokio::test]
    async fn test_invoke_malformed_body() {
        let base = spawn_server(None).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/v1/channels/{}/invoke", base, METHODS))
            .header("content-type", "application/json")
            .body("{ not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "INVALID_ARGUMENTS");
    }

    #[tokio::test]
    async fn test_echo_channel() {
        let base = spawn_server(None).await;
        let client = reqwest::Client::new();
        let url = format!("{}/v1/channels/{}/messages", base, MESSAGES);

        let body: Value = client
            .post(&url)
            .json(&json!("ping"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["reply"], "Linux received: 'ping' at 1700000000000");

        let body: Value = client.post(&url).send().await.unwrap().json().await.unwrap();
        assert_eq!(body["reply"], "No message received");

        let body: Value = client
            .post(&url)
            .body("null")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["reply"], "No message received");
    }

    #[tokio::test]
    async fn test_event_stream_over_sse() {
        let base = spawn_server(None).await;
        let client = reqwest::Client::new();

        let mut resp = client
            .get(format!("{}/v1/channels/{}/events", base, EVENTS))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let chunk = assert_ok!(resp.chunk().await).expect("first event frame");
        let frame = String::from_utf8_lossy(&chunk);
        assert!(frame.contains("event: event"), "frame: {}", frame);
        let data = frame
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .expect("data line");
        let event: Value = serde_json::from_str(data).unwrap();
        assert_eq!(event["timestamp"], 1_700_000_000_000i64);
        assert!(event["value"].as_u64().unwrap() <= 100);

        let status: Value = client
            .get(format!("{}/v1/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["listening"], json!(["com.example.native_bridge/events"]));

        let cancel = client
            .delete(format!("{}/v1/channels/{}/events", base, EVENTS))
            .send()
            .await
            .unwrap();
        assert_eq!(cancel.status(), 204);

        let status: Value = client
            .get(format!("{}/v1/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["listening"], json!([]));
    }

    #[tokio::test]
    async fn test_client_disconnect_cancels_subscription() {
        let base = spawn_server(None).await;
        let status_url = format!("{}/v1/status", base);

        let client = reqwest::Client::new();
        let mut resp = client
            .get(format!("{}/v1/channels/{}/events", base, EVENTS))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_ok!(resp.chunk().await).expect("first event frame");
        drop(resp);
        drop(client);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let status: Value = reqwest::get(&status_url)
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["listening"], json!([]));
    }

    #[tokio::test]
    async fn test_status_lists_channels() {
        let base = spawn_server(None).await;
        let status: Value = reqwest::get(format!("{}/v1/status", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["platform"], "Linux");
        assert_eq!(status["channels"].as_array().unwrap().len(), 3);
        assert_eq!(status["channels"][0]["kind"], "method");
    }
}
