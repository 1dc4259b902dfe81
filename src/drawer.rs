use std::fmt;
use std::time::Duration;

use crate::config::EmbedConfig;

pub const STYLESHEET_ID: &str = "fc-modal-css";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawerState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl fmt::Display for DrawerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Open/close state of a popup drawer.
///
/// `request_open` and `request_close` return the delay after which the caller
/// must call [`settle`](Self::settle); `None` means the request was a no-op.
/// Requests never queue: opening twice before the first animation finishes
/// yields a single transition.
#[derive(Debug, Clone)]
pub struct Drawer {
    state: DrawerState,
    open_duration: Duration,
    close_duration: Duration,
}

impl Drawer {
    pub fn new(open_duration: Duration, close_duration: Duration) -> Self {
        Self {
            state: DrawerState::Closed,
            open_duration,
            close_duration,
        }
    }

    pub fn from_config(config: &EmbedConfig) -> Self {
        Self::new(config.open_animation(), config.close_animation())
    }

    pub fn state(&self) -> DrawerState {
        self.state
    }

    pub fn request_open(&mut self) -> Option<Duration> {
        if self.state != DrawerState::Closed {
            return None;
        }
        self.state = DrawerState::Opening;
        Some(self.open_duration)
    }

    pub fn request_close(&mut self) -> Option<Duration> {
        if self.state != DrawerState::Open {
            return None;
        }
        self.state = DrawerState::Closing;
        Some(self.close_duration)
    }

    /// Complete a pending animation. Returns the state entered, if any.
    pub fn settle(&mut self) -> Option<DrawerState> {
        let next = match self.state {
            DrawerState::Opening => DrawerState::Open,
            DrawerState::Closing => DrawerState::Closed,
            DrawerState::Open | DrawerState::Closed => return None,
        };
        self.state = next;
        Some(next)
    }
}

/// Shared popup stylesheet. Animation durations are taken from the same
/// config values as the drawer timers.
pub fn stylesheet(config: &EmbedConfig) -> String {
    let open = config.open_animation_ms;
    let close = config.close_animation_ms;
    let class = &config.open_class;
    format!(
        ".fc-modal{{display:none;position:fixed;inset:0;z-index:2147483000;align-items:center;justify-content:center;background:rgba(0,5,10,0.55);overflow-y:auto}}\n\
.fc-modal.{class}{{display:flex}}\n\
.fc-modal__container{{width:100%;margin:5vh auto;background:transparent;border-radius:6px;overflow:hidden}}\n\
.fc-modal.{class}[aria-hidden=\"false\"]{{animation:fc-fade-in {open}ms cubic-bezier(0,0,.2,1)}}\n\
.fc-modal.{class}[aria-hidden=\"false\"] .fc-modal__container{{animation:fc-slide-in {open}ms cubic-bezier(0,0,.2,1)}}\n\
.fc-modal.{class}[aria-hidden=\"true\"]{{animation:fc-fade-out {close}ms cubic-bezier(0,0,.2,1) forwards}}\n\
.fc-modal.{class}[aria-hidden=\"true\"] .fc-modal__container{{animation:fc-slide-out {close}ms cubic-bezier(0,0,.2,1) forwards}}\n\
@keyframes fc-fade-in{{from{{opacity:0}}to{{opacity:1}}}}\n\
@keyframes fc-fade-out{{from{{opacity:1}}to{{opacity:0}}}}\n\
@keyframes fc-slide-in{{from{{transform:translateY(15%)}}to{{transform:translateY(0)}}}}\n\
@keyframes fc-slide-out{{from{{transform:translateY(0)}}to{{transform:translateY(15%)}}}}\n"
    )
}
