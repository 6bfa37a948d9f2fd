use crate::platform::Clock;
use serde_json::Value;
use std::sync::Arc;

pub const NO_MESSAGE_REPLY: &str = "No message received";

/// Replies to every basic message with a timestamped acknowledgement.
pub struct EchoHandler {
    platform: String,
    clock: Arc<dyn Clock>,
}

impl EchoHandler {
    pub fn new(platform: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            platform: platform.into(),
            clock,
        }
    }

    pub fn handle(&self, message: Option<&Value>) -> String {
        let Some(message) = message.filter(|m| !m.is_null()) else {
            tracing::debug!("Received empty message");
            return NO_MESSAGE_REPLY.to_string();
        };

        let text = render(message);
        tracing::info!("Received message: {}", text);

        format!(
            "{} received: '{}' at {}",
            self.platform,
            text,
            self.clock.now_millis()
        )
    }
}

// Strings go out bare; everything else as compact JSON.
fn render(message: &Value) -> String {
    match message {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::FixedClock;
    use crate::platform::SystemClock;
    use serde_json::json;

    fn handler() -> EchoHandler {
        EchoHandler::new("Linux", Arc::new(FixedClock(1_700_000_000_123)))
    }

    #[test]
    fn test_absent_message() {
        assert_eq!(handler().handle(None), "No message received");
        assert_eq!(handler().handle(Some(&Value::Null)), "No message received");
    }

    #[test]
    fn test_string_message() {
        assert_eq!(
            handler().handle(Some(&json!("ping"))),
            "Linux received: 'ping' at 1700000000123"
        );
    }

    #[test]
    fn test_structured_message() {
        assert_eq!(
            handler().handle(Some(&json!({ "n": 1 }))),
            "Linux received: '{\"n\":1}' at 1700000000123"
        );
        assert_eq!(
            handler().handle(Some(&json!(false))),
            "Linux received: 'false' at 1700000000123"
        );
    }

    #[test]
    fn test_reply_carries_delivery_time() {
        let echo = EchoHandler::new("Android", Arc::new(SystemClock));
        let reply = echo.handle(Some(&json!("ping")));

        assert!(reply.starts_with("Android received: 'ping' at "));
        let stamp = reply.rsplit(' ').next().unwrap();
        assert!(stamp.parse::<i64>().unwrap() > 0);
    }
}
