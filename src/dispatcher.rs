use crate::error::BridgeError;
use crate::models::{MethodCall, MethodResult};
use crate::platform::Collaborators;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const GET_BATTERY_LEVEL: &str = "getBatteryLevel";
pub const GET_DEVICE_INFO: &str = "getDeviceInfo";
pub const COMPUTE_SUM: &str = "computeSum";

type MethodHandler = Box<dyn Fn(&MethodCall) -> Result<Value, BridgeError> + Send + Sync>;

/// Routes method calls by name through a fixed dispatch table.
#[derive(Default)]
pub struct MethodDispatcher {
    handlers: HashMap<&'static str, MethodHandler>,
}

impl MethodDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the device methods registered.
    pub fn with_device_methods(collaborators: Collaborators) -> Self {
        let mut dispatcher = Self::new();

        let battery = collaborators.battery.clone();
        dispatcher.register(GET_BATTERY_LEVEL, move |_| {
            match battery.battery_level()? {
                Some(level) => Ok(json!(level)),
                None => Err(BridgeError::Unavailable(
                    "Battery level not available.".to_string(),
                )),
            }
        });

        let platform = collaborators.platform.clone();
        dispatcher.register(GET_DEVICE_INFO, move |_| {
            platform.device_description().map(Value::String)
        });

        dispatcher.register(COMPUTE_SUM, compute_sum);
        dispatcher
    }

    pub fn register<F>(&mut self, method: &'static str, handler: F) -> &mut Self
    where
        F: Fn(&MethodCall) -> Result<Value, BridgeError> + Send + Sync + 'static,
    {
        self.handlers.insert(method, Box::new(handler));
        self
    }

    #[cfg(test)]
    pub fn methods(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Produce exactly one outcome for `call`.
    pub fn dispatch(&self, call: &MethodCall) -> MethodResult {
        let Some(handler) = self.handlers.get(call.method.as_str()) else {
            tracing::debug!("No handler for method {}", call.method);
            return MethodResult::NotImplemented;
        };

        let result: MethodResult = handler(call).into();
        match &result {
            MethodResult::Error(detail) => {
                tracing::warn!("{} failed: {} ({})", call.method, detail.message, detail.code)
            }
            _ => tracing::debug!("{} -> {}", call.method, result.kind()),
        }
        result
    }
}

fn sum_operands(call: &MethodCall) -> Result<(i64, i64), BridgeError> {
    Ok((call.argument_or("a", 0)?, call.argument_or("b", 0)?))
}

fn compute_sum(call: &MethodCall) -> Result<Value, BridgeError> {
    let sum = match sum_operands(call) {
        Ok((a, b)) => a.checked_add(b),
        Err(e) => {
            tracing::debug!("computeSum rejected arguments: {}", e);
            None
        }
    };

    sum.map(|sum| json!(sum)).ok_or_else(|| {
        BridgeError::InvalidArguments("Could not compute sum with given arguments".to_string())
    })
}
