use crate::config::FormBase;
use crate::frame_url::QueryParams;
use crate::host::ElementId;
use crate::protocol::{FieldValue, FieldValues};

/// Options for [`Embedder::create_inline_form`](crate::Embedder::create_inline_form).
#[derive(Debug, Clone, PartialEq)]
pub struct InlineOptions {
    pub form: String,
    pub target: ElementId,
    pub seamless: bool,
    /// Fixed frame width in pixels; `None` follows the container width.
    pub width: Option<u32>,
    pub values: Option<FieldValues>,
    pub form_base: Option<FormBase>,
    pub params: QueryParams,
}

impl InlineOptions {
    pub fn new(form: impl Into<String>, target: ElementId) -> Self {
        Self {
            form: form.into(),
            target,
            seamless: false,
            width: None,
            values: None,
            form_base: None,
            params: QueryParams::new(),
        }
    }

    pub fn seamless(mut self, seamless: bool) -> Self {
        self.seamless = seamless;
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values
            .get_or_insert_with(FieldValues::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn form_base(mut self, base: FormBase) -> Self {
        self.form_base = Some(base);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// Options for [`Embedder::create_popup`](crate::Embedder::create_popup).
#[derive(Debug, Clone, PartialEq)]
pub struct PopupOptions {
    pub form: String,
    /// Maximum drawer width in pixels; defaults to the configured popup width.
    pub width: Option<u32>,
    /// Parent of the popup markup; defaults to the document body.
    pub append_to: Option<ElementId>,
    pub values: Option<FieldValues>,
    pub form_base: Option<FormBase>,
    pub params: QueryParams,
}

impl PopupOptions {
    pub fn new(form: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            width: None,
            append_to: None,
            values: None,
            form_base: None,
            params: QueryParams::new(),
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn append_to(mut self, parent: ElementId) -> Self {
        self.append_to = Some(parent);
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values
            .get_or_insert_with(FieldValues::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn form_base(mut self, base: FormBase) -> Self {
        self.form_base = Some(base);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}
