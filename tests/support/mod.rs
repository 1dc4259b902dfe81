#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use formcrafts_embed::{
    DomPatch, ElementId, Embedder, EmbedConfig, Host, HostEvent, IntersectionEntry,
    OutboundMessage, TimerId, WatchId, WindowId,
};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

pub const TRUSTED: &str = "https://app.formcrafts.com";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default, Clone)]
pub struct FakeElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub styles: BTreeMap<String, String>,
    pub classes: Vec<String>,
    pub text: String,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
}

/// In-memory document that records everything the embedder asks of it.
pub struct RecordingHost {
    next_id: u64,
    pub elements: BTreeMap<ElementId, FakeElement>,
    pub removed: Vec<ElementId>,
    pub patches: Vec<DomPatch>,
    pub posted: Vec<(ElementId, OutboundMessage)>,
    pub scrolls: Vec<f64>,
    pub observed: HashMap<WatchId, Vec<ElementId>>,
    pub disconnected: Vec<WatchId>,
    pub timeouts: Vec<(TimerId, Duration)>,
    pub tops: HashMap<ElementId, f64>,
    pub container_width: Option<String>,
    pub viewport_height: f64,
    pub root_font_size: f64,
    pub page_url: String,
    /// Fired from inside `apply` when a frame without `src` is inserted,
    /// the way browsers load `about:blank` during the insertion.
    pub on_blank_frame_insert: Option<Box<dyn Fn(HostEvent)>>,
    body: ElementId,
    head: ElementId,
}

impl RecordingHost {
    pub fn new() -> Self {
        let mut host = Self {
            next_id: 1,
            elements: BTreeMap::new(),
            removed: Vec::new(),
            patches: Vec::new(),
            posted: Vec::new(),
            scrolls: Vec::new(),
            observed: HashMap::new(),
            disconnected: Vec::new(),
            timeouts: Vec::new(),
            tops: HashMap::new(),
            container_width: Some(String::from("720px")),
            viewport_height: 800.0,
            root_font_size: 16.0,
            page_url: String::from("https://shop.example/contact?ref=footer"),
            on_blank_frame_insert: None,
            body: ElementId(0),
            head: ElementId(0),
        };
        host.body = host.create_element("body");
        host.head = host.create_element("head");
        host
    }

    /// A page-owned element appended to `<body>`.
    pub fn add_element(&mut self, tag: &str) -> ElementId {
        let id = self.create_element(tag);
        let body = self.body;
        self.attach(body, id);
        id
    }

    fn attach(&mut self, parent: ElementId, child: ElementId) {
        if let Some(previous) = self.elements.get(&child).and_then(|el| el.parent) {
            if let Some(old) = self.elements.get_mut(&previous) {
                old.children.retain(|id| *id != child);
            }
        }
        if let Some(el) = self.elements.get_mut(&child) {
            el.parent = Some(parent);
        }
        if let Some(el) = self.elements.get_mut(&parent) {
            el.children.push(child);
        }
    }

    pub fn element(&self, id: ElementId) -> &FakeElement {
        self.elements.get(&id).expect("element exists")
    }

    pub fn attr(&self, id: ElementId, name: &str) -> Option<&str> {
        self.elements
            .get(&id)
            .and_then(|el| el.attributes.get(name))
            .map(String::as_str)
    }

    pub fn style(&self, id: ElementId, property: &str) -> Option<&str> {
        self.elements
            .get(&id)
            .and_then(|el| el.styles.get(property))
            .map(String::as_str)
    }

    pub fn has_class(&self, id: ElementId, class: &str) -> bool {
        self.elements
            .get(&id)
            .is_some_and(|el| el.classes.iter().any(|existing| existing == class))
    }

    pub fn frames(&self) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|(_, el)| el.tag == "iframe")
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn frames_in(&self, container: ElementId) -> Vec<ElementId> {
        self.elements
            .get(&container)
            .map(|el| {
                el.children
                    .iter()
                    .copied()
                    .filter(|child| self.elements.get(child).is_some_and(|c| c.tag == "iframe"))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn watch_for(&self, element: ElementId) -> Option<WatchId> {
        self.observed
            .iter()
            .find(|(_, targets)| targets.contains(&element))
            .map(|(watch, _)| *watch)
    }

    pub fn window_of(&self, frame: ElementId) -> WindowId {
        WindowId(10_000 + frame.0)
    }

    pub fn posted_to(&self, frame: ElementId) -> Vec<OutboundMessage> {
        self.posted
            .iter()
            .filter(|(target, _)| *target == frame)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn last_timeout(&self) -> Option<(TimerId, Duration)> {
        self.timeouts.last().copied()
    }
}

impl Host for RecordingHost {
    fn create_element(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.elements.insert(
            id,
            FakeElement {
                tag: tag.to_string(),
                ..FakeElement::default()
            },
        );
        id
    }

    fn apply(&mut self, patch: DomPatch) {
        self.patches.push(patch.clone());
        match patch {
            DomPatch::SetAttribute {
                element,
                name,
                value,
            } => {
                if let Some(el) = self.elements.get_mut(&element) {
                    el.attributes.insert(name, value);
                }
            }
            DomPatch::RemoveAttribute { element, name } => {
                if let Some(el) = self.elements.get_mut(&element) {
                    el.attributes.remove(&name);
                }
            }
            DomPatch::SetStyle {
                element,
                property,
                value,
            } => {
                if let Some(el) = self.elements.get_mut(&element) {
                    if value.is_empty() {
                        el.styles.remove(&property);
                    } else {
                        el.styles.insert(property, value);
                    }
                }
            }
            DomPatch::AddClass { element, class } => {
                if let Some(el) = self.elements.get_mut(&element) {
                    if !el.classes.contains(&class) {
                        el.classes.push(class);
                    }
                }
            }
            DomPatch::RemoveClass { element, class } => {
                if let Some(el) = self.elements.get_mut(&element) {
                    el.classes.retain(|existing| *existing != class);
                }
            }
            DomPatch::TextContent { element, value } => {
                if let Some(el) = self.elements.get_mut(&element) {
                    el.text = value;
                }
            }
            DomPatch::AppendChild { parent, child } => {
                self.attach(parent, child);
                let blank_frame = self
                    .elements
                    .get(&child)
                    .is_some_and(|el| el.tag == "iframe" && !el.attributes.contains_key("src"));
                if let (true, Some(hook)) = (blank_frame, &self.on_blank_frame_insert) {
                    hook(HostEvent::FrameLoaded { frame: child });
                }
            }
            DomPatch::Remove { element } => {
                let mut stack = vec![element];
                while let Some(id) = stack.pop() {
                    if let Some(el) = self.elements.remove(&id) {
                        stack.extend(el.children);
                        if let Some(parent) = el.parent.and_then(|p| self.elements.get_mut(&p)) {
                            parent.children.retain(|child| *child != id);
                        }
                        self.removed.push(id);
                    }
                }
            }
        }
    }

    fn body(&self) -> ElementId {
        self.body
    }

    fn head(&self) -> ElementId {
        self.head
    }

    fn frame_in(&self, container: ElementId) -> Option<ElementId> {
        self.elements
            .get(&container)?
            .children
            .iter()
            .copied()
            .find(|child| self.elements.get(child).is_some_and(|el| el.tag == "iframe"))
    }

    fn content_window(&self, frame: ElementId) -> Option<WindowId> {
        self.elements
            .contains_key(&frame)
            .then(|| self.window_of(frame))
    }

    fn post_message(&mut self, frame: ElementId, message: &OutboundMessage) {
        if self.elements.contains_key(&frame) {
            self.posted.push((frame, message.clone()));
        }
    }

    fn computed_width(&self, _element: ElementId) -> Option<String> {
        self.container_width.clone()
    }

    fn bounding_top(&self, element: ElementId) -> Option<f64> {
        self.elements
            .contains_key(&element)
            .then(|| self.tops.get(&element).copied().unwrap_or(0.0))
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    fn root_font_size(&self) -> f64 {
        self.root_font_size
    }

    fn scroll_by(&mut self, top: f64) {
        self.scrolls.push(top);
    }

    fn page_url(&self) -> String {
        self.page_url.clone()
    }

    fn observe_visibility(&mut self, watch: WatchId, targets: &[ElementId]) {
        self.observed.insert(watch, targets.to_vec());
    }

    fn disconnect_visibility(&mut self, watch: WatchId) {
        self.observed.remove(&watch);
        self.disconnected.push(watch);
    }

    fn set_timeout(&mut self, timer: TimerId, delay: Duration) {
        self.timeouts.push((timer, delay));
    }
}

pub fn embedder() -> Embedder<RecordingHost> {
    init_tracing();
    Embedder::new(RecordingHost::new(), EmbedConfig::default())
}

/// Route synchronous blank-frame loads straight back into `embedder`, as
/// a browser host wired to real `load` listeners would.
pub fn load_blank_frames_synchronously(embedder: &Embedder<RecordingHost>) {
    let reentrant = embedder.clone();
    embedder.with_host_mut(move |host| {
        host.on_blank_frame_insert = Some(Box::new(move |event| reentrant.handle_event(event)));
    });
}

pub fn make_visible(embedder: &Embedder<RecordingHost>, element: ElementId) {
    let watch = embedder
        .with_host(|host| host.watch_for(element))
        .expect("element is being watched");
    embedder.handle_event(HostEvent::Intersection {
        watch,
        entries: vec![IntersectionEntry {
            target: element,
            is_intersecting: true,
        }],
    });
}

pub fn frame_message(
    embedder: &Embedder<RecordingHost>,
    frame: ElementId,
    origin: &str,
    data: JsonValue,
) {
    let source = embedder.with_host(|host| host.window_of(frame));
    embedder.handle_event(HostEvent::Message {
        source: Some(source),
        origin: origin.to_string(),
        data,
    });
}

pub fn fire_last_timer(embedder: &Embedder<RecordingHost>) {
    let (timer, _) = embedder
        .with_host(|host| host.last_timeout())
        .expect("a timer was scheduled");
    embedder.handle_event(HostEvent::Timer { timer });
}
