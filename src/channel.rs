use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::host::{ElementId, WindowId};
use crate::protocol::{AllowList, InboundMessage};

pub type Callback = Rc<dyn Fn()>;

/// Per-frame event subscriptions. Callbacks fire in registration order and
/// the same callback registered twice fires twice.
#[derive(Default)]
pub struct SubscriberRegistry {
    events: HashMap<String, Vec<Callback>>,
}

impl SubscriberRegistry {
    pub fn subscribe(&mut self, event: &str, callback: Callback) {
        self.events.entry(event.to_string()).or_default().push(callback);
    }

    pub fn callbacks(&self, event: &str) -> Vec<Callback> {
        self.events.get(event).cloned().unwrap_or_default()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, Vec::len)
    }
}

/// Why an incoming message was dropped. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("message source is not a registered frame")]
    UnknownSource,
    #[error("origin {0} is not trusted")]
    UntrustedOrigin(String),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub frame: ElementId,
    pub message: InboundMessage,
}

/// Single dispatcher for every embed on a page.
///
/// Maps content-window identity to the owning frame, filters by origin and
/// keeps the subscriber registries keyed by frame.
pub struct MessageChannel {
    trusted: AllowList,
    windows: HashMap<WindowId, ElementId>,
    subscribers: HashMap<ElementId, SubscriberRegistry>,
}

impl MessageChannel {
    pub fn new(trusted: AllowList) -> Self {
        Self {
            trusted,
            windows: HashMap::new(),
            subscribers: HashMap::new(),
        }
    }

    pub fn bind(&mut self, window: WindowId, frame: ElementId) {
        self.windows.insert(window, frame);
    }

    pub fn is_bound(&self, frame: ElementId) -> bool {
        self.windows.values().any(|bound| *bound == frame)
    }

    /// Forget a frame's window binding and subscriptions.
    pub fn release(&mut self, frame: ElementId) {
        self.windows.retain(|_, bound| *bound != frame);
        self.subscribers.remove(&frame);
    }

    pub fn accept(
        &self,
        source: Option<WindowId>,
        origin: &str,
        data: &JsonValue,
    ) -> Result<Delivery, Rejection> {
        let frame = source
            .and_then(|window| self.windows.get(&window))
            .copied()
            .ok_or(Rejection::UnknownSource)?;
        if !self.trusted.contains(origin) {
            return Err(Rejection::UntrustedOrigin(origin.to_string()));
        }
        let message = InboundMessage::decode(data)?;
        Ok(Delivery { frame, message })
    }

    pub fn subscribe(&mut self, frame: ElementId, event: &str, callback: Callback) {
        self.subscribers
            .entry(frame)
            .or_default()
            .subscribe(event, callback);
    }

    pub fn subscribers(&self, frame: ElementId, event: &str) -> Vec<Callback> {
        self.subscribers
            .get(&frame)
            .map(|registry| registry.callbacks(event))
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, frame: ElementId, event: &str) -> usize {
        self.subscribers
            .get(&frame)
            .map_or(0, |registry| registry.count(event))
    }
}
