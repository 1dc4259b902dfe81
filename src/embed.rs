use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

use crate::channel::{Callback, MessageChannel};
use crate::config::EmbedConfig;
use crate::drawer::{self, Drawer, DrawerState, STYLESHEET_ID};
use crate::frame::{patch, EmbedMode, FrameController, LoadState};
use crate::host::{DomPatch, ElementId, Host, HostEvent, IntersectionEntry, TimerId, WatchId, WindowId};
use crate::options::{InlineOptions, PopupOptions};
use crate::protocol::{FieldValues, InboundMessage};
use crate::visibility::VisibilityWatcher;

enum VisibilityAction {
    AssignSource(ElementId),
    Notify(Box<dyn FnOnce()>),
}

struct PopupInstance {
    modal: ElementId,
    frame: ElementId,
    drawer: Drawer,
}

struct Inner<H: Host> {
    host: H,
    config: EmbedConfig,
    frames: HashMap<ElementId, FrameController>,
    popups: HashMap<String, PopupInstance>,
    channel: MessageChannel,
    watcher: VisibilityWatcher<VisibilityAction>,
    timers: HashMap<TimerId, ElementId>,
    next_timer: u64,
    stylesheet_installed: bool,
}

/// Callbacks collected while the embedder is borrowed, run after release.
enum Deferred {
    Callbacks(Vec<Callback>),
    Notify(Box<dyn FnOnce()>),
}

impl Deferred {
    fn run(self) {
        match self {
            Self::Callbacks(callbacks) => {
                for callback in callbacks {
                    callback();
                }
            }
            Self::Notify(notify) => notify(),
        }
    }
}

/// Document state plus host events that arrived while it was borrowed.
///
/// Browsers fire some events synchronously from inside a DOM mutation (an
/// iframe inserted without `src` loads `about:blank` during the insertion).
/// Such events are queued and handled once the outermost borrow is released.
struct Shared<H: Host> {
    inner: RefCell<Inner<H>>,
    pending: RefCell<VecDeque<HostEvent>>,
}

impl<H: Host> Shared<H> {
    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner<H>) -> T) -> T {
        let result = f(&mut self.inner.borrow_mut());
        self.drain();
        result
    }

    /// Handle queued events until the queue is empty. Returns early when the
    /// state is borrowed further up the stack; that caller drains on release.
    fn drain(&self) {
        loop {
            let Ok(mut inner) = self.inner.try_borrow_mut() else {
                return;
            };
            let Some(event) = self.pending.borrow_mut().pop_front() else {
                return;
            };
            let deferred = inner.dispatch(event);
            drop(inner);
            if let Some(deferred) = deferred {
                deferred.run();
            }
        }
    }
}

/// Document-scoped owner of every embed on a page.
///
/// Cloning an `Embedder` yields another reference to the same document
/// state. Handles returned by the constructors hold only weak references.
pub struct Embedder<H: Host> {
    shared: Rc<Shared<H>>,
}

impl<H: Host> Clone for Embedder<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<H: Host> Embedder<H> {
    pub fn new(host: H, config: EmbedConfig) -> Self {
        let channel = MessageChannel::new(config.trusted_origins.clone());
        Self {
            shared: Rc::new(Shared {
                inner: RefCell::new(Inner {
                    host,
                    config,
                    frames: HashMap::new(),
                    popups: HashMap::new(),
                    channel,
                    watcher: VisibilityWatcher::default(),
                    timers: HashMap::new(),
                    next_timer: 1,
                    stylesheet_installed: false,
                }),
                pending: RefCell::new(VecDeque::new()),
            }),
        }
    }

    pub fn create_inline_form(&self, options: InlineOptions) -> InlineHandle<H> {
        let frame = self.shared.with_inner(|inner| inner.create_inline_form(options));
        InlineHandle {
            shared: Rc::downgrade(&self.shared),
            frame,
        }
    }

    pub fn create_popup(&self, options: PopupOptions) -> PopupHandle<H> {
        let form = options.form.clone();
        let modal = self.shared.with_inner(|inner| inner.create_popup(options));
        PopupHandle {
            shared: Rc::downgrade(&self.shared),
            form,
            modal,
        }
    }

    /// Run `on_visible` once, the first time any of `targets` intersects
    /// the viewport.
    pub fn observe_visibility(&self, targets: &[ElementId], on_visible: impl FnOnce() + 'static) -> WatchId {
        self.shared.with_inner(|inner| {
            inner
                .watcher
                .observe(&mut inner.host, targets, VisibilityAction::Notify(Box::new(on_visible)))
        })
    }

    /// Feed a host event in. Safe to call while the embedder is already
    /// handling a call further up the stack; the event is then handled as
    /// soon as that call returns.
    pub fn handle_event(&self, event: HostEvent) {
        self.shared.pending.borrow_mut().push_back(event);
        self.shared.drain();
    }

    pub fn config(&self) -> EmbedConfig {
        self.shared.inner.borrow().config.clone()
    }

    pub fn load_state(&self, frame: ElementId) -> Option<LoadState> {
        self.shared
            .inner
            .borrow()
            .frames
            .get(&frame)
            .map(FrameController::load_state)
    }

    pub fn drawer_state(&self, form: &str) -> Option<DrawerState> {
        self.shared
            .inner
            .borrow()
            .popups
            .get(form)
            .map(|popup| popup.drawer.state())
    }

    pub fn popup_frame(&self, form: &str) -> Option<ElementId> {
        self.shared.inner.borrow().popups.get(form).map(|popup| popup.frame)
    }

    pub fn with_host<T>(&self, f: impl FnOnce(&H) -> T) -> T {
        f(&self.shared.inner.borrow().host)
    }

    pub fn with_host_mut<T>(&self, f: impl FnOnce(&mut H) -> T) -> T {
        self.shared.with_inner(|inner| f(&mut inner.host))
    }
}

pub fn modal_id(form: &str) -> String {
    format!("fc-modal-{form}")
}

impl<H: Host> Inner<H> {
    fn dispatch(&mut self, event: HostEvent) -> Option<Deferred> {
        match event {
            HostEvent::Intersection { watch, entries } => self.on_intersection(watch, &entries),
            HostEvent::FrameLoaded { frame } => {
                self.on_frame_loaded(frame);
                None
            }
            HostEvent::Message {
                source,
                origin,
                data,
            } => self.on_message(source, &origin, &data),
            HostEvent::Timer { timer } => {
                self.on_timer(timer);
                None
            }
        }
    }

    fn create_inline_form(&mut self, options: InlineOptions) -> ElementId {
        if let Some(existing) = self.host.frame_in(options.target) {
            warn!(form = %options.form, "Formcrafts: widget already created");
            return existing;
        }

        let controller = FrameController::mount_inline(&mut self.host, &self.config, &options);
        let frame = controller.frame();
        self.frames.insert(frame, controller);
        self.watcher
            .observe(&mut self.host, &[frame], VisibilityAction::AssignSource(frame));
        debug!(form = %options.form, ?frame, "inline form created");
        frame
    }

    fn create_popup(&mut self, options: PopupOptions) -> ElementId {
        if let Some(existing) = self.popups.get(&options.form) {
            debug!(form = %options.form, "reusing popup instance");
            return existing.modal;
        }

        self.install_stylesheet();
        let width = options.width.unwrap_or(self.config.popup_width);
        let host = &mut self.host;

        let modal = host.create_element("div");
        patch(host, DomPatch::attribute(modal, "id", modal_id(&options.form)));
        patch(
            host,
            DomPatch::AddClass {
                element: modal,
                class: "fc-modal".into(),
            },
        );
        patch(host, DomPatch::attribute(modal, "aria-hidden", "true"));

        let dialog = host.create_element("div");
        patch(host, DomPatch::style(dialog, "max-width", format!("min(90vw,{width}px)")));
        patch(host, DomPatch::style(dialog, "visibility", "hidden"));
        patch(host, DomPatch::attribute(dialog, "role", "dialog"));
        patch(host, DomPatch::attribute(dialog, "aria-modal", "true"));
        patch(
            host,
            DomPatch::AddClass {
                element: dialog,
                class: "fc-modal__container".into(),
            },
        );

        let controller = FrameController::mount_popup(host, &self.config, &options, dialog);
        patch(
            host,
            DomPatch::AppendChild {
                parent: modal,
                child: dialog,
            },
        );
        let parent = options.append_to.unwrap_or_else(|| host.body());
        patch(
            host,
            DomPatch::AppendChild {
                parent,
                child: modal,
            },
        );

        let frame = controller.frame();
        self.frames.insert(frame, controller);
        self.popups.insert(
            options.form.clone(),
            PopupInstance {
                modal,
                frame,
                drawer: Drawer::from_config(&self.config),
            },
        );
        debug!(form = %options.form, ?modal, "popup created");
        modal
    }

    fn install_stylesheet(&mut self) {
        if self.stylesheet_installed {
            return;
        }
        let css = drawer::stylesheet(&self.config);
        let head = self.host.head();
        let style = self.host.create_element("style");
        patch(&mut self.host, DomPatch::attribute(style, "id", STYLESHEET_ID));
        patch(
            &mut self.host,
            DomPatch::TextContent {
                element: style,
                value: css,
            },
        );
        patch(
            &mut self.host,
            DomPatch::AppendChild {
                parent: head,
                child: style,
            },
        );
        self.stylesheet_installed = true;
    }

    fn on_intersection(&mut self, watch: WatchId, entries: &[IntersectionEntry]) -> Option<Deferred> {
        match self.watcher.handle(&mut self.host, watch, entries)? {
            VisibilityAction::AssignSource(frame) => {
                self.assign_source(frame);
                None
            }
            VisibilityAction::Notify(notify) => Some(Deferred::Notify(notify)),
        }
    }

    fn assign_source(&mut self, frame: ElementId) {
        let Some(controller) = self.frames.get_mut(&frame) else {
            return;
        };
        if !controller.assign_source(&mut self.host) {
            return;
        }
        if let Some(window) = self.host.content_window(frame) {
            self.channel.bind(window, frame);
        }
    }

    fn on_frame_loaded(&mut self, frame: ElementId) {
        let Some(controller) = self.frames.get_mut(&frame) else {
            return;
        };
        if !controller.on_frame_loaded(&mut self.host) {
            trace!(?frame, "ignoring load of blank frame document");
            return;
        }
        if !self.channel.is_bound(frame) {
            if let Some(window) = self.host.content_window(frame) {
                self.channel.bind(window, frame);
            }
        }
    }

    fn on_message(&mut self, source: Option<WindowId>, origin: &str, data: &JsonValue) -> Option<Deferred> {
        let delivery = match self.channel.accept(source, origin, data) {
            Ok(delivery) => delivery,
            Err(rejection) => {
                trace!(origin, %rejection, "dropped frame message");
                return None;
            }
        };

        let frame = delivery.frame;
        let controller = self.frames.get_mut(&frame)?;
        trace!(form = %controller.target().form, kind = delivery.message.kind(), "frame message");
        controller.handle(&mut self.host, &self.config, &delivery.message);
        let mode = controller.target().mode;
        let form = controller.target().form.clone();

        match delivery.message {
            InboundMessage::Load => Some(Deferred::Callbacks(
                self.channel.subscribers(frame, delivery.message.kind()),
            )),
            InboundMessage::Close if mode == EmbedMode::Popup => {
                self.close_popup(&form);
                None
            }
            _ => None,
        }
    }

    fn on_timer(&mut self, timer: TimerId) {
        let Some(modal) = self.timers.remove(&timer) else {
            return;
        };
        let open_class = self.config.open_class.clone();
        let Some((form, popup)) = self.popups.iter_mut().find(|(_, popup)| popup.modal == modal) else {
            return;
        };
        match popup.drawer.settle() {
            Some(DrawerState::Closed) => {
                patch(
                    &mut self.host,
                    DomPatch::RemoveClass {
                        element: modal,
                        class: open_class,
                    },
                );
                debug!(form = %form, "drawer closed");
            }
            Some(state) => debug!(form = %form, %state, "drawer settled"),
            None => {}
        }
    }

    fn schedule_settle(&mut self, modal: ElementId, delay: Duration) {
        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.timers.insert(timer, modal);
        self.host.set_timeout(timer, delay);
    }

    fn load_popup(&mut self, form: &str) {
        if let Some(frame) = self.popups.get(form).map(|popup| popup.frame) {
            self.assign_source(frame);
        }
    }

    fn open_popup(&mut self, form: &str) {
        self.load_popup(form);
        let open_class = self.config.open_class.clone();
        let Some(popup) = self.popups.get_mut(form) else {
            return;
        };
        let Some(delay) = popup.drawer.request_open() else {
            return;
        };
        let modal = popup.modal;
        patch(
            &mut self.host,
            DomPatch::AddClass {
                element: modal,
                class: open_class,
            },
        );
        patch(&mut self.host, DomPatch::attribute(modal, "aria-hidden", "false"));
        debug!(form, "drawer opening");
        self.schedule_settle(modal, delay);
    }

    fn close_popup(&mut self, form: &str) {
        let Some(popup) = self.popups.get_mut(form) else {
            return;
        };
        let Some(delay) = popup.drawer.request_close() else {
            return;
        };
        let modal = popup.modal;
        patch(&mut self.host, DomPatch::attribute(modal, "aria-hidden", "true"));
        debug!(form, "drawer closing");
        self.schedule_settle(modal, delay);
    }

    fn push_values(&mut self, frame: ElementId, values: FieldValues) {
        if let Some(controller) = self.frames.get(&frame) {
            controller.push_values(&mut self.host, values);
        }
    }

    fn destroy_frame(&mut self, frame: ElementId) {
        self.watcher.forget(&mut self.host, frame);
        self.channel.release(frame);
        self.frames.remove(&frame);
    }

    fn destroy_inline(&mut self, frame: ElementId) {
        if self.frames.contains_key(&frame) {
            self.destroy_frame(frame);
            patch(&mut self.host, DomPatch::Remove { element: frame });
            debug!(?frame, "inline form destroyed");
        }
    }

    fn destroy_popup(&mut self, form: &str, modal: ElementId) {
        let owned = self
            .popups
            .get(form)
            .is_some_and(|popup| popup.modal == modal);
        if !owned {
            return;
        }
        if let Some(popup) = self.popups.remove(form) {
            self.destroy_frame(popup.frame);
            self.timers.retain(|_, pending| *pending != modal);
            patch(&mut self.host, DomPatch::Remove { element: modal });
            debug!(form, "popup destroyed");
        }
    }
}

/// Control handle for an inline form.
///
/// After [`destroy`](Self::destroy), or once the [`Embedder`] is dropped,
/// every operation is a silent no-op.
pub struct InlineHandle<H: Host> {
    shared: Weak<Shared<H>>,
    frame: ElementId,
}

impl<H: Host> Clone for InlineHandle<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
            frame: self.frame,
        }
    }
}

impl<H: Host> InlineHandle<H> {
    pub fn frame(&self) -> ElementId {
        self.frame
    }

    fn with_live<T>(&self, f: impl FnOnce(&mut Inner<H>) -> T) -> Option<T> {
        let shared = self.shared.upgrade()?;
        shared.with_inner(|inner| inner.frames.contains_key(&self.frame).then(|| f(inner)))
    }

    pub fn on(&self, event: &str, callback: impl Fn() + 'static) {
        self.with_live(|inner| inner.channel.subscribe(self.frame, event, Rc::new(callback)));
    }

    pub fn values(&self, values: FieldValues) {
        self.with_live(|inner| inner.push_values(self.frame, values));
    }

    pub fn destroy(&self) {
        self.with_live(|inner| inner.destroy_inline(self.frame));
    }
}

/// Control handle for a popup form. Non-owning: the popup itself lives in
/// the embedder's registry, keyed by form identifier.
pub struct PopupHandle<H: Host> {
    shared: Weak<Shared<H>>,
    form: String,
    modal: ElementId,
}

impl<H: Host> Clone for PopupHandle<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
            form: self.form.clone(),
            modal: self.modal,
        }
    }
}

impl<H: Host> PopupHandle<H> {
    pub fn form(&self) -> &str {
        &self.form
    }

    pub fn modal(&self) -> ElementId {
        self.modal
    }

    /// Runs `f` with the popup's frame, if this handle still owns the popup.
    fn with_live<T>(&self, f: impl FnOnce(&mut Inner<H>, ElementId) -> T) -> Option<T> {
        let shared = self.shared.upgrade()?;
        shared.with_inner(|inner| {
            let frame = inner
                .popups
                .get(&self.form)
                .filter(|popup| popup.modal == self.modal)
                .map(|popup| popup.frame)?;
            Some(f(inner, frame))
        })
    }

    pub fn on(&self, event: &str, callback: impl Fn() + 'static) {
        self.with_live(|inner, frame| inner.channel.subscribe(frame, event, Rc::new(callback)));
    }

    /// Assign the frame source without opening the drawer.
    pub fn load(&self) {
        self.with_live(|inner, _| inner.load_popup(&self.form));
    }

    pub fn values(&self, values: FieldValues) {
        self.with_live(|inner, frame| inner.push_values(frame, values));
    }

    pub fn open(&self) {
        self.with_live(|inner, _| inner.open_popup(&self.form));
    }

    pub fn close(&self) {
        self.with_live(|inner, _| inner.close_popup(&self.form));
    }

    pub fn destroy(&self) {
        self.with_live(|inner, _| inner.destroy_popup(&self.form, self.modal));
    }
}
