//! Browser host and JavaScript bindings.
//!
//! Example usage in JavaScript:
//!
//! ```ignore
//! // JavaScript, not a Rust doctest
//! import { createInlineForm, createPopup } from "formcrafts-embed";
//!
//! const inline = createInlineForm({ form: "abc123", target: document.querySelector("#form") });
//! inline.on("load", () => console.log("form ready"));
//!
//! const popup = createPopup({ form: "xyz789", width: 600 });
//! document.querySelector("#open").addEventListener("click", () => popup.open());
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::time::Duration;

use js_sys::{Array, Function, Object, Reflect, JSON};
use tracing::{warn, Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, HtmlElement, HtmlIFrameElement, IntersectionObserver,
    IntersectionObserverEntry, MessageEvent, ScrollBehavior, ScrollToOptions, Window,
};

use crate::config::{ConfigError, EmbedConfig, FormBase};
use crate::embed::{Embedder, InlineHandle, PopupHandle};
use crate::frame_url::{parse_query, QueryParams};
use crate::host::{DomPatch, ElementId, Host, HostEvent, IntersectionEntry, TimerId, WatchId, WindowId};
use crate::options::{InlineOptions, PopupOptions};
use crate::protocol::{FieldValues, OutboundMessage};

type IntersectionClosure = Closure<dyn FnMut(Array)>;

thread_local! {
    static EMBEDDER: RefCell<Option<Embedder<WebHost>>> = const { RefCell::new(None) };
    static PENDING_CONFIG: RefCell<Option<EmbedConfig>> = const { RefCell::new(None) };
}

impl From<ConfigError> for JsValue {
    fn from(value: ConfigError) -> Self {
        format!("{value}").into()
    }
}

fn js_error(message: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("Formcrafts: {message}"))
}

fn current() -> Option<Embedder<WebHost>> {
    EMBEDDER.with(|cell| cell.borrow().clone())
}

fn dispatch(event: HostEvent) {
    if let Some(embedder) = current() {
        embedder.handle_event(event);
    }
}

fn embedder() -> Result<Embedder<WebHost>, JsValue> {
    if let Some(existing) = current() {
        return Ok(existing);
    }
    init_tracing("warn");
    let config = PENDING_CONFIG
        .with(|cell| cell.borrow_mut().take())
        .unwrap_or_default();
    let embedder = Embedder::new(WebHost::new()?, config);
    EMBEDDER.with(|cell| *cell.borrow_mut() = Some(embedder.clone()));
    Ok(embedder)
}

struct ConsoleWriter {
    level: Level,
    buffer: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buffer);
        let line = JsValue::from_str(text.trim_end());
        match self.level {
            Level::ERROR => web_sys::console::error_1(&line),
            Level::WARN => web_sys::console::warn_1(&line),
            Level::INFO => web_sys::console::info_1(&line),
            _ => web_sys::console::debug_1(&line),
        }
    }
}

struct MakeConsoleWriter;

impl<'a> MakeWriter<'a> for MakeConsoleWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            level: Level::INFO,
            buffer: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            level: *meta.level(),
            buffer: Vec::new(),
        }
    }
}

fn init_tracing(directive: &str) {
    console_error_panic_hook::set_once();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_writer(MakeConsoleWriter)
        .without_time()
        .with_target(false)
        .try_init();
}

/// [`Host`] backed by the live browser document.
pub struct WebHost {
    window: Window,
    document: Document,
    next_id: Cell<u64>,
    elements: RefCell<HashMap<ElementId, Element>>,
    windows: RefCell<Vec<(WindowId, Window)>>,
    observers: HashMap<WatchId, (IntersectionObserver, IntersectionClosure)>,
    body: ElementId,
    head: ElementId,
}

impl WebHost {
    pub fn new() -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| js_error("no window available"))?;
        let document = window
            .document()
            .ok_or_else(|| js_error("no document available"))?;
        let body: Element = document
            .body()
            .ok_or_else(|| js_error("document has no body"))?
            .into();
        let head: Element = document
            .head()
            .ok_or_else(|| js_error("document has no head"))?
            .into();

        let mut host = Self {
            window,
            document,
            next_id: Cell::new(1),
            elements: RefCell::new(HashMap::new()),
            windows: RefCell::new(Vec::new()),
            observers: HashMap::new(),
            body: ElementId(0),
            head: ElementId(0),
        };
        host.body = host.adopt(&body);
        host.head = host.adopt(&head);
        host.listen_for_messages()?;
        Ok(host)
    }

    /// Id for an element the page already owns, reusing an existing id when
    /// the element was seen before.
    pub fn adopt(&self, element: &Element) -> ElementId {
        if let Some(id) = self.known(element) {
            return id;
        }
        let id = self.allocate();
        self.elements.borrow_mut().insert(id, element.clone());
        id
    }

    fn known(&self, element: &Element) -> Option<ElementId> {
        self.elements
            .borrow()
            .iter()
            .find(|(_, existing)| *existing == element)
            .map(|(id, _)| *id)
    }

    fn allocate(&self) -> ElementId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        ElementId(id)
    }

    fn element(&self, id: ElementId) -> Option<Element> {
        self.elements.borrow().get(&id).cloned()
    }

    fn window_id(&self, source: &JsValue) -> Option<WindowId> {
        self.windows
            .borrow()
            .iter()
            .find(|(_, window)| AsRef::<JsValue>::as_ref(window) == source)
            .map(|(id, _)| *id)
    }

    fn listen_for_messages(&self) -> Result<(), JsValue> {
        let listener = Closure::<dyn FnMut(MessageEvent)>::new(|event: MessageEvent| {
            let Some(embedder) = current() else {
                return;
            };
            let source = event
                .source()
                .and_then(|source| embedder.with_host(|host| host.window_id(&source)));
            let data = match json_from_js(&event.data()) {
                Some(data) => data,
                None => return,
            };
            embedder.handle_event(HostEvent::Message {
                source,
                origin: event.origin(),
                data,
            });
        });
        self.window
            .add_event_listener_with_callback("message", listener.as_ref().unchecked_ref())?;
        listener.forget();
        Ok(())
    }

    fn listen_for_load(&self, frame: ElementId, element: &Element) {
        let listener = Closure::<dyn FnMut()>::new(move || dispatch(HostEvent::FrameLoaded { frame }));
        if let Err(err) = element.add_event_listener_with_callback("load", listener.as_ref().unchecked_ref()) {
            warn!(?err, "failed to attach frame load listener");
        }
        listener.forget();
    }

    fn apply_patch(&self, patch: &DomPatch) -> Result<(), JsValue> {
        match patch {
            DomPatch::SetAttribute {
                element,
                name,
                value,
            } => {
                if let Some(el) = self.element(*element) {
                    el.set_attribute(name, value)?;
                }
            }
            DomPatch::RemoveAttribute { element, name } => {
                if let Some(el) = self.element(*element) {
                    el.remove_attribute(name)?;
                }
            }
            DomPatch::SetStyle {
                element,
                property,
                value,
            } => {
                if let Some(el) = self.element(*element).and_then(|el| el.dyn_into::<HtmlElement>().ok()) {
                    el.style().set_property(property, value)?;
                }
            }
            DomPatch::AddClass { element, class } => {
                if let Some(el) = self.element(*element) {
                    el.class_list().add_1(class)?;
                }
            }
            DomPatch::RemoveClass { element, class } => {
                if let Some(el) = self.element(*element) {
                    el.class_list().remove_1(class)?;
                }
            }
            DomPatch::TextContent { element, value } => {
                if let Some(el) = self.element(*element) {
                    el.set_text_content(Some(value));
                }
            }
            DomPatch::AppendChild { parent, child } => {
                if let (Some(parent), Some(child)) = (self.element(*parent), self.element(*child)) {
                    parent.append_child(&child)?;
                }
            }
            DomPatch::Remove { element } => {
                if let Some(el) = self.elements.borrow_mut().remove(element) {
                    el.remove();
                }
            }
        }
        Ok(())
    }

    fn computed_property(&self, element: &Element, property: &str) -> Option<String> {
        self.window
            .get_computed_style(element)
            .ok()
            .flatten()
            .and_then(|style| style.get_property_value(property).ok())
            .filter(|value| !value.is_empty())
    }
}

impl Host for WebHost {
    fn create_element(&mut self, tag: &str) -> ElementId {
        let id = self.allocate();
        match self.document.create_element(tag) {
            Ok(element) => {
                if tag.eq_ignore_ascii_case("iframe") {
                    self.listen_for_load(id, &element);
                }
                self.elements.borrow_mut().insert(id, element);
            }
            Err(err) => warn!(tag, ?err, "failed to create element"),
        }
        id
    }

    fn apply(&mut self, patch: DomPatch) {
        if let Err(err) = self.apply_patch(&patch) {
            warn!(?patch, ?err, "dom patch failed");
        }
    }

    fn body(&self) -> ElementId {
        self.body
    }

    fn head(&self) -> ElementId {
        self.head
    }

    fn frame_in(&self, container: ElementId) -> Option<ElementId> {
        let container = self.element(container)?;
        let frame = container.query_selector("iframe").ok().flatten()?;
        Some(self.adopt(&frame))
    }

    fn content_window(&self, frame: ElementId) -> Option<WindowId> {
        let content = self
            .element(frame)?
            .dyn_into::<HtmlIFrameElement>()
            .ok()?
            .content_window()?;
        if let Some(id) = self.window_id(&content) {
            return Some(id);
        }
        let id = WindowId(self.allocate().0);
        self.windows.borrow_mut().push((id, content));
        Some(id)
    }

    fn post_message(&mut self, frame: ElementId, message: &OutboundMessage) {
        let Some(content) = self
            .element(frame)
            .and_then(|el| el.dyn_into::<HtmlIFrameElement>().ok())
            .and_then(|frame| frame.content_window())
        else {
            return;
        };
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "failed to encode frame message");
                return;
            }
        };
        let result = JSON::parse(&payload).and_then(|value| content.post_message(&value, "*"));
        if let Err(err) = result {
            warn!(?err, "failed to post frame message");
        }
    }

    fn computed_width(&self, element: ElementId) -> Option<String> {
        let element = self.element(element)?;
        self.computed_property(&element, "width")
    }

    fn bounding_top(&self, element: ElementId) -> Option<f64> {
        self.element(element)
            .map(|element| element.get_bounding_client_rect().top())
    }

    fn viewport_height(&self) -> f64 {
        self.window
            .inner_height()
            .ok()
            .and_then(|height| height.as_f64())
            .unwrap_or(0.0)
    }

    fn root_font_size(&self) -> f64 {
        self.document
            .document_element()
            .and_then(|root| self.computed_property(&root, "font-size"))
            .and_then(|size| size.trim_end_matches("px").parse::<f64>().ok())
            .unwrap_or(16.0)
    }

    fn scroll_by(&mut self, top: f64) {
        let options = ScrollToOptions::new();
        options.set_top(top);
        options.set_behavior(ScrollBehavior::Smooth);
        self.window.scroll_by_with_scroll_to_options(&options);
    }

    fn page_url(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn observe_visibility(&mut self, watch: WatchId, targets: &[ElementId]) {
        let callback = Closure::<dyn FnMut(Array)>::new(move |entries: Array| {
            let Some(embedder) = current() else {
                return;
            };
            let entries: Vec<IntersectionEntry> = embedder.with_host(|host| {
                entries
                    .iter()
                    .filter_map(|entry| entry.dyn_into::<IntersectionObserverEntry>().ok())
                    .filter_map(|entry| {
                        host.known(&entry.target()).map(|target| IntersectionEntry {
                            target,
                            is_intersecting: entry.is_intersecting(),
                        })
                    })
                    .collect()
            });
            embedder.handle_event(HostEvent::Intersection { watch, entries });
        });

        let observer = match IntersectionObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(err) => {
                warn!(?err, "failed to create intersection observer");
                return;
            }
        };
        for target in targets {
            if let Some(element) = self.element(*target) {
                observer.observe(&element);
            }
        }
        self.observers.insert(watch, (observer, callback));
    }

    fn disconnect_visibility(&mut self, watch: WatchId) {
        if let Some((observer, callback)) = self.observers.remove(&watch) {
            observer.disconnect();
            // disconnect runs from inside this closure's own invocation
            callback.forget();
        }
    }

    fn set_timeout(&mut self, timer: TimerId, delay: Duration) {
        let callback = Closure::once_into_js(move || dispatch(HostEvent::Timer { timer }));
        let delay = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        if let Err(err) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay)
        {
            warn!(?err, "failed to schedule timer");
        }
    }
}

fn json_from_js(value: &JsValue) -> Option<serde_json::Value> {
    let text = JSON::stringify(value).ok()?;
    let text: JsValue = text.into();
    serde_json::from_str(&text.as_string()?).ok()
}

fn property(object: &JsValue, key: &str) -> Result<JsValue, JsValue> {
    Reflect::get(object, &JsValue::from_str(key))
}

fn is_missing(value: &JsValue) -> bool {
    value.is_undefined() || value.is_null()
}

fn required_form(options: &JsValue) -> Result<String, JsValue> {
    property(options, "form")?
        .as_string()
        .filter(|form| !form.is_empty())
        .ok_or_else(|| js_error("`form` is required"))
}

fn element_option(options: &JsValue, key: &str) -> Result<Option<Element>, JsValue> {
    let value = property(options, key)?;
    if is_missing(&value) {
        return Ok(None);
    }
    value
        .dyn_into::<Element>()
        .map(Some)
        .map_err(|_| js_error(format!("`{key}` must be an element")))
}

fn width_option(options: &JsValue) -> Result<Option<u32>, JsValue> {
    let value = property(options, "width")?;
    Ok(value
        .as_f64()
        .filter(|width| width.is_finite() && *width > 0.0)
        .map(|width| width.round().min(f64::from(u32::MAX)) as u32))
}

fn field_values(value: &JsValue) -> Result<Option<FieldValues>, JsValue> {
    if is_missing(value) {
        return Ok(None);
    }
    let json = json_from_js(value).ok_or_else(|| js_error("values must be a plain object"))?;
    serde_json::from_value(json)
        .map(Some)
        .map_err(|err| js_error(format!("invalid values: {err}")))
}

fn form_base_option(options: &JsValue) -> Result<Option<FormBase>, JsValue> {
    match property(options, "formBase")?.as_string() {
        Some(raw) => Ok(Some(FormBase::parse(&raw)?)),
        None => Ok(None),
    }
}

fn params_option(options: &JsValue) -> Result<QueryParams, JsValue> {
    let value = property(options, "_params")?;
    if is_missing(&value) {
        return Ok(QueryParams::new());
    }
    if let Some(raw) = value.as_string() {
        return parse_query(&raw).map_err(|err| js_error(format!("invalid query parameters: {err}")));
    }
    let entries = Object::entries(&Object::from(value));
    let mut params = QueryParams::new();
    for entry in entries.iter() {
        let pair = Array::from(&entry);
        let Some(key) = pair.get(0).as_string() else {
            continue;
        };
        let value = pair.get(1);
        let value = match value.as_string() {
            Some(text) => text,
            None => JSON::stringify(&value).map(String::from).unwrap_or_default(),
        };
        params.push((key, value));
    }
    Ok(params)
}

/// Set the embed configuration. Must run before the first embed is created.
#[wasm_bindgen]
pub fn configure(options: JsValue) -> Result<(), JsValue> {
    if current().is_some() {
        return Err(js_error("configure() must be called before creating embeds"));
    }
    let log_level = property(&options, "logLevel")?
        .as_string()
        .unwrap_or_else(|| String::from("warn"));
    init_tracing(&log_level);
    let json = json_from_js(&options).ok_or_else(|| js_error("options must be a plain object"))?;
    let config: EmbedConfig =
        serde_json::from_value(json).map_err(|err| js_error(format!("invalid configuration: {err}")))?;
    PENDING_CONFIG.with(|cell| *cell.borrow_mut() = Some(config));
    Ok(())
}

#[wasm_bindgen(js_name = observeVisibility)]
pub fn observe_visibility(targets: JsValue, callback: Function) -> Result<(), JsValue> {
    let embedder = embedder()?;
    let elements: Vec<Element> = if Array::is_array(&targets) {
        Array::from(&targets)
            .iter()
            .filter_map(|target| target.dyn_into::<Element>().ok())
            .collect()
    } else {
        vec![targets
            .dyn_into::<Element>()
            .map_err(|_| js_error("targets must be an element or an array of elements"))?]
    };
    let ids: Vec<ElementId> = embedder.with_host(|host| elements.iter().map(|el| host.adopt(el)).collect());
    embedder.observe_visibility(&ids, move || {
        if let Err(err) = callback.call0(&JsValue::NULL) {
            warn!(?err, "visibility callback threw");
        }
    });
    Ok(())
}

fn js_callback(callback: Function) -> impl Fn() + 'static {
    move || {
        if let Err(err) = callback.call0(&JsValue::NULL) {
            warn!(?err, "event callback threw");
        }
    }
}

#[wasm_bindgen]
pub struct InlineForm {
    handle: InlineHandle<WebHost>,
}

#[wasm_bindgen]
impl InlineForm {
    pub fn on(&self, event: String, callback: Function) {
        self.handle.on(&event, js_callback(callback));
    }

    pub fn values(&self, values: JsValue) -> Result<(), JsValue> {
        if let Some(values) = field_values(&values)? {
            self.handle.values(values);
        }
        Ok(())
    }

    pub fn destroy(&self) {
        self.handle.destroy();
    }
}

#[wasm_bindgen(js_name = createInlineForm)]
pub fn create_inline_form(options: JsValue) -> Result<InlineForm, JsValue> {
    let form = required_form(&options)?;
    let target = element_option(&options, "target")?.ok_or_else(|| js_error("`target` is required"))?;
    let embedder = embedder()?;
    let target = embedder.with_host(|host| host.adopt(&target));

    let mut inline = InlineOptions::new(form, target);
    inline.seamless = property(&options, "seamless")?.as_bool().unwrap_or(false);
    inline.width = width_option(&options)?;
    inline.values = field_values(&property(&options, "values")?)?;
    inline.form_base = form_base_option(&options)?;
    inline.params = params_option(&options)?;

    Ok(InlineForm {
        handle: embedder.create_inline_form(inline),
    })
}

#[wasm_bindgen]
pub struct PopupForm {
    handle: PopupHandle<WebHost>,
}

#[wasm_bindgen]
impl PopupForm {
    pub fn on(&self, event: String, callback: Function) {
        self.handle.on(&event, js_callback(callback));
    }

    pub fn load(&self) {
        self.handle.load();
    }

    pub fn values(&self, values: JsValue) -> Result<(), JsValue> {
        if let Some(values) = field_values(&values)? {
            self.handle.values(values);
        }
        Ok(())
    }

    pub fn open(&self) {
        self.handle.open();
    }

    pub fn close(&self) {
        self.handle.close();
    }

    pub fn destroy(&self) {
        self.handle.destroy();
    }
}

#[wasm_bindgen(js_name = createPopup)]
pub fn create_popup(options: JsValue) -> Result<PopupForm, JsValue> {
    let form = required_form(&options)?;
    let append_to = element_option(&options, "appendTo")?;
    let embedder = embedder()?;

    let mut popup = PopupOptions::new(form);
    popup.width = width_option(&options)?;
    popup.append_to = append_to.map(|element| embedder.with_host(|host| host.adopt(&element)));
    popup.values = field_values(&property(&options, "values")?)?;
    popup.form_base = form_base_option(&options)?;
    popup.params = params_option(&options)?;

    Ok(PopupForm {
        handle: embedder.create_popup(popup),
    })
}
