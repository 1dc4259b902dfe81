use tracing::{debug, trace};
use url::Url;

use crate::config::EmbedConfig;
use crate::frame_url::build_frame_src;
use crate::host::{DomPatch, ElementId, Host};
use crate::options::{InlineOptions, PopupOptions};
use crate::protocol::{FieldValues, InboundMessage, OutboundMessage};

const FRAME_SHADOW: &str = "rgba(0, 5, 10, 0.08) 0px 0px 0px 0.5px, rgba(50, 55, 60, 0.04) 2px 3px 2px 0px, rgba(50, 50, 50, 0.03) -2px -2px 2px 0px, rgba(80, 80, 80, 0.176) 0px 7px 5px -7px";
const DEFERRED_SRC: &str = "data-src";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    Inline,
    Popup,
}

/// Load progress of a frame. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadState {
    Pending,
    SrcAssigned,
    ContentLoaded,
}

/// One logical embedded form instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedTarget {
    pub form: String,
    pub mode: EmbedMode,
    /// Source URL held back until the load is triggered.
    pub src: Url,
    pub load_state: LoadState,
    pub width: Option<u32>,
    pub seamless: bool,
}

pub(crate) fn patch(host: &mut impl Host, patch: DomPatch) {
    trace!(target: "formcrafts::dom", patch = ?patch, "apply dom patch");
    host.apply(patch);
}

/// Owns one frame element: deferred source, load handshake, sizing.
#[derive(Debug)]
pub struct FrameController {
    target: EmbedTarget,
    frame: ElementId,
    /// Inline: the caller's target element. Popup: the dialog container.
    container: ElementId,
    values: Option<FieldValues>,
    revealed: bool,
}

impl FrameController {
    pub fn mount_inline(host: &mut impl Host, config: &EmbedConfig, options: &InlineOptions) -> Self {
        let base = options.form_base.as_ref().unwrap_or(&config.form_base);
        let src = build_frame_src(base, &options.form, options.seamless, &options.params);
        let container = options.target;
        let frame = host.create_element("iframe");

        patch(host, DomPatch::style(container, "display", "flex"));
        patch(host, DomPatch::style(container, "justify-content", "stretch"));
        patch(host, DomPatch::style(container, "width", "100%"));
        let container_width = host.computed_width(container);

        patch(host, DomPatch::attribute(frame, DEFERRED_SRC, src.as_str()));
        patch(host, DomPatch::attribute(frame, "title", "Formcrafts form"));
        patch(host, DomPatch::attribute(frame, "aria-label", "Formcrafts form"));
        patch(host, DomPatch::attribute(frame, "name", "formcrafts-iframe"));
        patch(host, DomPatch::style(frame, "border", "none"));
        if let Some(width) = container_width {
            patch(host, DomPatch::style(frame, "width", width));
        }
        patch(host, DomPatch::style(frame, "position", "absolute"));
        patch(host, DomPatch::style(frame, "visibility", "hidden"));
        if let Some(width) = options.width {
            patch(host, DomPatch::style(frame, "width", format!("{width}px")));
            patch(host, DomPatch::style(frame, "max-width", "100%"));
        }
        if !options.seamless {
            patch(host, DomPatch::style(frame, "box-shadow", FRAME_SHADOW));
            patch(host, DomPatch::style(frame, "border-radius", "4px"));
        }
        patch(
            host,
            DomPatch::AppendChild {
                parent: container,
                child: frame,
            },
        );

        Self {
            target: EmbedTarget {
                form: options.form.clone(),
                mode: EmbedMode::Inline,
                src,
                load_state: LoadState::Pending,
                width: options.width,
                seamless: options.seamless,
            },
            frame,
            container,
            values: options.values.clone(),
            revealed: false,
        }
    }

    pub fn mount_popup(
        host: &mut impl Host,
        config: &EmbedConfig,
        options: &PopupOptions,
        dialog: ElementId,
    ) -> Self {
        let base = options.form_base.as_ref().unwrap_or(&config.form_base);
        let src = build_frame_src(base, &options.form, false, &options.params);
        let frame = host.create_element("iframe");

        patch(host, DomPatch::attribute(frame, DEFERRED_SRC, src.as_str()));
        patch(host, DomPatch::attribute(frame, "title", "Formcrafts popup form"));
        patch(host, DomPatch::attribute(frame, "aria-label", "Formcrafts popup form"));
        patch(host, DomPatch::attribute(frame, "name", "formcrafts-popup-iframe"));
        patch(host, DomPatch::style(frame, "border", "none"));
        patch(host, DomPatch::style(frame, "width", "100%"));
        patch(host, DomPatch::style(frame, "position", "static"));
        patch(host, DomPatch::style(frame, "transition", "height 0ms linear"));
        patch(host, DomPatch::style(frame, "will-change", "height"));
        patch(
            host,
            DomPatch::AppendChild {
                parent: dialog,
                child: frame,
            },
        );

        Self {
            target: EmbedTarget {
                form: options.form.clone(),
                mode: EmbedMode::Popup,
                src,
                load_state: LoadState::Pending,
                width: options.width,
                seamless: false,
            },
            frame,
            container: dialog,
            values: options.values.clone(),
            revealed: false,
        }
    }

    pub fn target(&self) -> &EmbedTarget {
        &self.target
    }

    pub fn frame(&self) -> ElementId {
        self.frame
    }

    pub fn container(&self) -> ElementId {
        self.container
    }

    pub fn load_state(&self) -> LoadState {
        self.target.load_state
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    /// Move the deferred URL into the live `src`. Returns `false` when the
    /// source was already assigned.
    pub fn assign_source(&mut self, host: &mut impl Host) -> bool {
        if self.target.load_state != LoadState::Pending {
            return false;
        }
        patch(host, DomPatch::remove_attribute(self.frame, DEFERRED_SRC));
        patch(host, DomPatch::attribute(self.frame, "src", self.target.src.as_str()));
        self.target.load_state = LoadState::SrcAssigned;
        debug!(form = %self.target.form, src = %self.target.src, "frame source assigned");
        true
    }

    /// Browser-level load of the frame document. Loads that happen before
    /// the source is assigned belong to the initial blank document. Every
    /// later load (reload, navigation inside the frame) repeats the handshake.
    pub fn on_frame_loaded(&mut self, host: &mut impl Host) -> bool {
        if self.target.load_state == LoadState::Pending {
            return false;
        }
        self.target.load_state = LoadState::ContentLoaded;

        match self.target.mode {
            EmbedMode::Inline => {
                patch(host, DomPatch::style(self.container, "overflow", "initial"));
                if let Some(width) = self.target.width {
                    patch(host, DomPatch::style(self.frame, "width", format!("{width}px")));
                    patch(host, DomPatch::style(self.frame, "max-width", "100%"));
                }
                patch(host, DomPatch::style(self.frame, "transition", "height 0ms linear"));
                patch(host, DomPatch::style(self.frame, "will-change", "height"));
            }
            EmbedMode::Popup => {
                patch(host, DomPatch::style(self.container, "visibility", "visible"));
            }
        }

        let page_url = host.page_url();
        host.post_message(self.frame, &OutboundMessage::Url { content: page_url });
        host.post_message(
            self.frame,
            &OutboundMessage::Values {
                content: self.values.clone(),
            },
        );
        debug!(form = %self.target.form, "frame content loaded");
        true
    }

    pub fn push_values(&self, host: &mut impl Host, values: FieldValues) {
        host.post_message(
            self.frame,
            &OutboundMessage::Values {
                content: Some(values),
            },
        );
    }

    /// Frame-local effects of a protocol message. `load` and `close` carry
    /// no frame-local effect and are handled by the embedder.
    pub fn handle(&mut self, host: &mut impl Host, config: &EmbedConfig, message: &InboundMessage) {
        match message {
            InboundMessage::Height { content } => self.apply_height(host, *content),
            InboundMessage::Background { content } => {
                if !self.target.seamless {
                    patch(host, DomPatch::style(self.frame, "background", content.as_str()));
                }
            }
            InboundMessage::Name { content } => {
                patch(host, DomPatch::attribute(self.frame, "aria-label", content.as_str()));
                patch(host, DomPatch::attribute(self.frame, "title", content.as_str()));
            }
            InboundMessage::Page => self.scroll_into_view(host, config.page_scroll_rem),
            InboundMessage::Success => {
                if self.target.mode == EmbedMode::Inline {
                    self.scroll_into_view(host, config.success_scroll_rem);
                }
            }
            InboundMessage::Load | InboundMessage::Close => {}
        }
    }

    fn apply_height(&mut self, host: &mut impl Host, height: f64) {
        if self.target.mode == EmbedMode::Inline {
            patch(host, DomPatch::clear_style(self.container, "height"));
        }
        patch(host, DomPatch::style(self.frame, "height", format!("{height}px")));
        if !self.revealed {
            patch(host, DomPatch::style(self.frame, "visibility", "visible"));
            patch(host, DomPatch::style(self.frame, "position", "static"));
            self.revealed = true;
            debug!(form = %self.target.form, height, "frame revealed");
        }
    }

    fn scroll_into_view(&self, host: &mut impl Host, offset_rem: f64) {
        let Some(top) = host.bounding_top(self.frame) else {
            return;
        };
        if top >= 0.0 && top <= host.viewport_height() {
            return;
        }
        let offset = offset_rem * host.root_font_size();
        host.scroll_by(top - offset);
    }
}
