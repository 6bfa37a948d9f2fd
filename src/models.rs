use crate::error::{BridgeError, ErrorDetail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============ Method Channel Types ============

/// A named invocation arriving on a method channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// Look up a single argument by key.
    ///
    /// Absent arguments, a missing key and an explicit null all read as
    /// `None`. Arguments that are not a map, or a value that does not decode
    /// as `T`, are `InvalidArguments`.
    pub fn argument<T>(&self, key: &str) -> Result<Option<T>, BridgeError>
    where
        T: DeserializeOwned,
    {
        let value = match &self.arguments {
            Value::Null => return Ok(None),
            Value::Object(map) => match map.get(key) {
                None | Some(Value::Null) => return Ok(None),
                Some(value) => value,
            },
            other => {
                return Err(BridgeError::InvalidArguments(format!(
                    "arguments must be a map, got {}",
                    value_kind(other)
                )))
            }
        };

        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| BridgeError::InvalidArguments(format!("argument `{}`: {}", key, e)))
    }

    pub fn argument_or<T>(&self, key: &str, default: T) -> Result<T, BridgeError>
    where
        T: DeserializeOwned,
    {
        Ok(self.argument(key)?.unwrap_or(default))
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Outcome of a method call. `NotImplemented` is neither success nor failure:
/// it tells the caller no handler exists for the method.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResult {
    Success(Value),
    Error(ErrorDetail),
    NotImplemented,
}

impl MethodResult {
    pub fn kind(&self) -> &'static str {
        match self {
            MethodResult::Success(_) => "success",
            MethodResult::Error(_) => "error",
            MethodResult::NotImplemented => "not_implemented",
        }
    }
}

impl From<Result<Value, BridgeError>> for MethodResult {
    fn from(result: Result<Value, BridgeError>) -> Self {
        match result {
            Ok(value) => MethodResult::Success(value),
            Err(err) => MethodResult::Error(err.to_detail()),
        }
    }
}

// ============ Event Channel Types ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    SensorData,
    BatteryUpdate,
    LocationUpdate,
}

impl EventType {
    pub const ALL: [EventType; 3] = [
        EventType::SensorData,
        EventType::BatteryUpdate,
        EventType::LocationUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SensorData => "SENSOR_DATA",
            EventType::BatteryUpdate => "BATTERY_UPDATE",
            EventType::LocationUpdate => "LOCATION_UPDATE",
        }
    }
}

/// A synthetic push notification delivered on an event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Always within 0..=100.
    pub value: u8,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

// ============ API Response Types ============

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct MessageReply {
    pub reply: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Method,
    Event,
    Message,
}

#[derive(Debug, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub platform: String,
    pub channels: Vec<ChannelInfo>,
    pub listening: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_null_arguments_use_default() {
        let call = MethodCall::new("computeSum", Value::Null);
        assert_eq!(call.argument_or::<i64>("a", 0).unwrap(), 0);

        let call = MethodCall::new("computeSum", json!({ "a": null }));
        assert_eq!(call.argument_or::<i64>("a", 7).unwrap(), 7);
        assert_eq!(call.argument_or::<i64>("b", 3).unwrap(), 3);
    }

    #[test]
    fn test_wrong_type_is_invalid_arguments() {
        let call = MethodCall::new("computeSum", json!({ "a": "x" }));
        let err = call.argument::<i64>("a").unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENTS");

        let call = MethodCall::new("computeSum", json!({ "a": 2.5 }));
        assert!(call.argument::<i64>("a").is_err());
    }

    #[test]
    fn test_non_map_arguments_are_rejected() {
        let call = MethodCall::new("computeSum", json!([1, 2]));
        let err = call.argument::<i64>("a").unwrap_err();
        assert!(err.to_string().contains("list"));
    }

    #[test]
    fn test_call_arguments_default_to_null() {
        let call: MethodCall = serde_json::from_value(json!({ "method": "getDeviceInfo" })).unwrap();
        assert_eq!(call.arguments, Value::Null);
    }

    #[test]
    fn test_event_wire_form() {
        let event = Event {
            event_type: EventType::BatteryUpdate,
            value: 42,
            timestamp: 1_700_000_000_000,
        };
        assert_eq!(
            serde_json::to_value(event).unwrap(),
            json!({ "type": "BATTERY_UPDATE", "value": 42, "timestamp": 1_700_000_000_000i64 })
        );
        for event_type in EventType::ALL {
            assert_eq!(
                serde_json::to_value(event_type).unwrap(),
                json!(event_type.as_str())
            );
        }
    }

    #[test]
    fn test_result_from_error_keeps_code() {
        let result: MethodResult = Err(BridgeError::Unavailable("nope".into())).into();
        match result {
            MethodResult::Error(detail) => assert_eq!(detail.code, "UNAVAILABLE"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
