use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::protocol::OutboundMessage;

/// Identity of an element owned by the host document.
///
/// Ids are handed out by [`Host::create_element`] or by the host itself for
/// elements the embedding page already owns (target containers, `<body>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

/// Identity of a frame's content window, as seen by the message transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WatchId(pub u64);

/// A single mutation of the host document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomPatch {
    SetAttribute {
        element: ElementId,
        name: String,
        value: String,
    },
    RemoveAttribute {
        element: ElementId,
        name: String,
    },
    /// An empty `value` clears the property.
    SetStyle {
        element: ElementId,
        property: String,
        value: String,
    },
    AddClass {
        element: ElementId,
        class: String,
    },
    RemoveClass {
        element: ElementId,
        class: String,
    },
    TextContent {
        element: ElementId,
        value: String,
    },
    AppendChild {
        parent: ElementId,
        child: ElementId,
    },
    Remove {
        element: ElementId,
    },
}

impl DomPatch {
    pub fn attribute(element: ElementId, name: &str, value: impl Into<String>) -> Self {
        Self::SetAttribute {
            element,
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn remove_attribute(element: ElementId, name: &str) -> Self {
        Self::RemoveAttribute {
            element,
            name: name.to_string(),
        }
    }

    pub fn style(element: ElementId, property: &str, value: impl Into<String>) -> Self {
        Self::SetStyle {
            element,
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn clear_style(element: ElementId, property: &str) -> Self {
        Self::style(element, property, "")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub target: ElementId,
    pub is_intersecting: bool,
}

/// Platform events fed back into an [`Embedder`](crate::Embedder).
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Intersection observer callback for a watch registered through
    /// [`Host::observe_visibility`].
    Intersection {
        watch: WatchId,
        entries: Vec<IntersectionEntry>,
    },
    /// The browser-level `load` event of a frame element.
    FrameLoaded { frame: ElementId },
    /// A cross-context message received by the host window. `source` is the
    /// sending window when the host can identify it.
    Message {
        source: Option<WindowId>,
        origin: String,
        data: JsonValue,
    },
    /// A timeout scheduled through [`Host::set_timeout`] elapsed.
    Timer { timer: TimerId },
}

/// The host document an embed lives in.
///
/// Mutations go through [`Host::apply`]; everything asynchronous (visibility,
/// frame load, messages, timers) comes back later as a [`HostEvent`]. Events
/// a host reports from inside one of these methods (a browser fires the blank
/// document `load` while a frame is inserted) are queued by the embedder and
/// handled once the current call returns.
pub trait Host {
    fn create_element(&mut self, tag: &str) -> ElementId;

    fn apply(&mut self, patch: DomPatch);

    fn body(&self) -> ElementId;

    fn head(&self) -> ElementId;

    /// First frame element inside `container`, if any.
    fn frame_in(&self, container: ElementId) -> Option<ElementId>;

    fn content_window(&self, frame: ElementId) -> Option<WindowId>;

    fn post_message(&mut self, frame: ElementId, message: &OutboundMessage);

    /// Resolved CSS width of an element, e.g. `"640px"`.
    fn computed_width(&self, element: ElementId) -> Option<String>;

    /// Top edge of the element's bounding rect relative to the viewport.
    fn bounding_top(&self, element: ElementId) -> Option<f64>;

    fn viewport_height(&self) -> f64;

    /// Root element font size in pixels.
    fn root_font_size(&self) -> f64;

    /// Smooth-scroll the page vertically by `top` pixels.
    fn scroll_by(&mut self, top: f64);

    fn page_url(&self) -> String;

    fn observe_visibility(&mut self, watch: WatchId, targets: &[ElementId]);

    fn disconnect_visibility(&mut self, watch: WatchId);

    fn set_timeout(&mut self, timer: TimerId, delay: Duration);
}
