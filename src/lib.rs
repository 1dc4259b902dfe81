//! Embed hosted Formcrafts forms into a page through isolated frames.
//!
//! The core is host-agnostic: an [`Embedder`] drives a [`Host`] (the page's
//! document) through DOM patches and receives everything asynchronous back as
//! [`HostEvent`]s. On `wasm32` the [`web`] module provides the browser host
//! and the JavaScript entry points.

pub mod channel;
pub mod config;
pub mod drawer;
pub mod embed;
pub mod frame;
pub mod frame_url;
pub mod host;
pub mod options;
pub mod protocol;
pub mod visibility;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use channel::{MessageChannel, Rejection, SubscriberRegistry};
pub use config::{ConfigError, EmbedConfig, FormBase};
pub use drawer::{Drawer, DrawerState};
pub use embed::{Embedder, InlineHandle, PopupHandle};
pub use frame::{EmbedMode, EmbedTarget, FrameController, LoadState};
pub use host::{DomPatch, ElementId, Host, HostEvent, IntersectionEntry, TimerId, WatchId, WindowId};
pub use options::{InlineOptions, PopupOptions};
pub use protocol::{AllowList, FieldValue, FieldValues, InboundMessage, OutboundMessage};
pub use visibility::VisibilityWatcher;
