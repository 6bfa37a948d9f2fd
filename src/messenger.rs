//! Shared transport registry.
//!
//! Each logical channel is a name bound to exactly one handler. A name with
//! nothing bound delivers nothing: lookups return `None` rather than an error,
//! mirroring a host whose counterpart never registered that channel.

use crate::dispatcher::MethodDispatcher;
use crate::echo::EchoHandler;
use crate::events::{EventSink, EventStreamController, StreamStatus, SubscriptionId};
use crate::models::{ChannelInfo, ChannelKind, MethodCall, MethodResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait MethodCallHandler: Send + Sync {
    fn on_method_call(&self, call: &MethodCall) -> MethodResult;
}

pub trait MessageHandler: Send + Sync {
    fn on_message(&self, message: Option<Value>) -> Value;
}

pub trait StreamHandler: Send + Sync {
    fn on_listen(&self, sink: Arc<dyn EventSink>) -> SubscriptionId;

    /// `None` cancels whatever is active; `Some(id)` only that subscription.
    fn on_cancel(&self, subscription: Option<SubscriptionId>);

    fn is_listening(&self) -> bool;
}

impl MethodCallHandler for MethodDispatcher {
    fn on_method_call(&self, call: &MethodCall) -> MethodResult {
        self.dispatch(call)
    }
}

impl MessageHandler for EchoHandler {
    fn on_message(&self, message: Option<Value>) -> Value {
        Value::String(self.handle(message.as_ref()))
    }
}

impl StreamHandler for EventStreamController {
    fn on_listen(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        self.listen(sink)
    }

    fn on_cancel(&self, subscription: Option<SubscriptionId>) {
        match subscription {
            Some(id) => {
                self.cancel_subscription(id);
            }
            None => self.cancel(),
        }
    }

    fn is_listening(&self) -> bool {
        self.status() == StreamStatus::Listening
    }
}

#[derive(Default)]
pub struct Messenger {
    method_channels: BTreeMap<String, Arc<dyn MethodCallHandler>>,
    message_channels: BTreeMap<String, Arc<dyn MessageHandler>>,
    event_channels: BTreeMap<String, Arc<dyn StreamHandler>>,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_method_call_handler(
        &mut self,
        channel: impl Into<String>,
        handler: Arc<dyn MethodCallHandler>,
    ) -> &mut Self {
        let channel = channel.into();
        tracing::debug!("Registered method channel {}", channel);
        self.method_channels.insert(channel, handler);
        self
    }

    pub fn set_message_handler(
        &mut self,
        channel: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        let channel = channel.into();
        tracing::debug!("Registered message channel {}", channel);
        self.message_channels.insert(channel, handler);
        self
    }

    pub fn set_stream_handler(
        &mut self,
        channel: impl Into<String>,
        handler: Arc<dyn StreamHandler>,
    ) -> &mut Self {
        let channel = channel.into();
        tracing::debug!("Registered event channel {}", channel);
        self.event_channels.insert(channel, handler);
        self
    }

    pub fn invoke_method(&self, channel: &str, call: &MethodCall) -> Option<MethodResult> {
        let Some(handler) = self.method_channels.get(channel) else {
            tracing::debug!("No method handler on {}", channel);
            return None;
        };
        Some(handler.on_method_call(call))
    }

    pub fn send_message(&self, channel: &str, message: Option<Value>) -> Option<Value> {
        let Some(handler) = self.message_channels.get(channel) else {
            tracing::debug!("No message handler on {}", channel);
            return None;
        };
        Some(handler.on_message(message))
    }

    pub fn stream_handler(&self, channel: &str) -> Option<Arc<dyn StreamHandler>> {
        self.event_channels.get(channel).cloned()
    }

    pub fn listening_channels(&self) -> Vec<String> {
        self.event_channels
            .iter()
            .filter(|(_, handler)| handler.is_listening())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        let methods = self.method_channels.keys().map(|n| (n, ChannelKind::Method));
        let events = self.event_channels.keys().map(|n| (n, ChannelKind::Event));
        let messages = self.message_channels.keys().map(|n| (n, ChannelKind::Message));

        methods
            .chain(events)
            .chain(messages)
            .map(|(name, kind)| ChannelInfo {
                name: name.clone(),
                kind,
            })
            .collect()
    }

    pub fn cancel_all_streams(&self) {
        for handler in self.event_channels.values() {
            handler.on_cancel(None);
        }
    }
}
