//! Best-effort login prefill for the launched console.
//!
//! Works against whatever top-level window the launched process shows first. Only the
//! username and server fields are touched. When no usable field pair is found, or a
//! direct set is refused, the fallback types into the focused window instead.

mod heuristic;
#[cfg(windows)]
mod win32;

use std::time::{Duration, Instant};

use thiserror::Error;

pub use heuristic::{choose_fields, keystroke_plan, pick_main_window, score_field, FieldPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width().max(0)) * i64::from(self.height().max(0))
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: usize,
    pub pid: u32,
    pub title: String,
    pub rect: Rect,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub handle: usize,
    pub class_name: String,
    pub rect: Rect,
    pub visible: bool,
    pub enabled: bool,
    pub is_password: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStroke {
    Text(String),
    Tab,
}

#[derive(Error, Debug)]
pub enum AutofillError {
    #[error("UI automation is not supported on this platform")]
    Unsupported,

    #[error("no login window appeared within {0:?}")]
    WindowNotFound(Duration),

    #[error("nothing to fill")]
    NothingToFill,

    #[error("injection failed: {0}")]
    Injection(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutofillOutcome {
    DirectSet,
    Keystrokes,
}

/// OS seam for window discovery and input injection.
pub trait UiAutomation: Send + Sync {
    fn windows_for_process(&self, pid: u32) -> Result<Vec<WindowInfo>, AutofillError>;
    fn input_fields(&self, window: &WindowInfo) -> Result<Vec<FieldInfo>, AutofillError>;
    fn set_text(&self, field: &FieldInfo, text: &str) -> Result<(), AutofillError>;
    fn focus(&self, window: &WindowInfo) -> Result<(), AutofillError>;
    fn send_keys(&self, keys: &[KeyStroke]) -> Result<(), AutofillError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AutofillTarget {
    pub username: Option<String>,
    pub server: Option<String>,
}

impl AutofillTarget {
    pub fn is_empty(&self) -> bool {
        self.username.as_deref().map_or(true, str::is_empty)
            && self.server.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AutofillSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Polls with a window but no field pair before switching to keystrokes.
    pub settle_polls: u32,
}

impl Default for AutofillSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            settle_polls: 6,
        }
    }
}

pub struct UnsupportedAutomation;

impl UiAutomation for UnsupportedAutomation {
    fn windows_for_process(&self, _pid: u32) -> Result<Vec<WindowInfo>, AutofillError> {
        Err(AutofillError::Unsupported)
    }

    fn input_fields(&self, _window: &WindowInfo) -> Result<Vec<FieldInfo>, AutofillError> {
        Err(AutofillError::Unsupported)
    }

    fn set_text(&self, _field: &FieldInfo, _text: &str) -> Result<(), AutofillError> {
        Err(AutofillError::Unsupported)
    }

    fn focus(&self, _window: &WindowInfo) -> Result<(), AutofillError> {
        Err(AutofillError::Unsupported)
    }

    fn send_keys(&self, _keys: &[KeyStroke]) -> Result<(), AutofillError> {
        Err(AutofillError::Unsupported)
    }
}

pub fn default_backend() -> Box<dyn UiAutomation> {
    #[cfg(windows)]
    {
        Box::new(win32::Win32Automation)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedAutomation)
    }
}

/// Blocks until the fields are filled, the fallback ran, or the timeout passed.
pub fn autofill(
    backend: &dyn UiAutomation,
    pid: u32,
    target: &AutofillTarget,
    settings: AutofillSettings,
) -> Result<AutofillOutcome, AutofillError> {
    if target.is_empty() {
        return Err(AutofillError::NothingToFill);
    }

    let deadline = Instant::now() + settings.timeout;
    let mut last_window: Option<WindowInfo> = None;
    let mut fieldless_polls = 0u32;

    loop {
        let windows = backend.windows_for_process(pid)?;
        if let Some(window) = pick_main_window(&windows).cloned() {
            let fields = backend.input_fields(&window)?;
            if let Some(pair) = choose_fields(&fields, &window.rect) {
                match fill_pair(backend, &pair, target) {
                    Ok(()) => {
                        tracing::info!(
                            "autofill set fields directly in window '{}'",
                            window.title
                        );
                        return Ok(AutofillOutcome::DirectSet);
                    }
                    Err(FillError::Retype(err)) => {
                        tracing::warn!("direct field set failed, typing instead: {}", err);
                        return type_into(backend, &window, target);
                    }
                    Err(FillError::PartlyFilled(err)) => {
                        tracing::warn!("could not clear a partly filled form: {}", err);
                        return Err(err);
                    }
                }
            }
            fieldless_polls += 1;
            last_window = Some(window);
            if fieldless_polls >= settings.settle_polls {
                break;
            }
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(settings.poll_interval);
    }

    match last_window {
        Some(window) => type_into(backend, &window, target),
        None => Err(AutofillError::WindowNotFound(settings.timeout)),
    }
}

enum FillError {
    /// Every field is back to empty; typing the whole plan is safe.
    Retype(AutofillError),
    /// A field keeps a directly set value; typing would duplicate it.
    PartlyFilled(AutofillError),
}

fn fill_pair(
    backend: &dyn UiAutomation,
    pair: &FieldPair,
    target: &AutofillTarget,
) -> Result<(), FillError> {
    let values = [
        (&pair.username, target.username.as_deref()),
        (&pair.server, target.server.as_deref()),
    ];
    let mut filled: Vec<&FieldInfo> = Vec::new();
    for (field, value) in values {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        if let Err(err) = backend.set_text(field, value) {
            for done in filled {
                backend.set_text(done, "").map_err(FillError::PartlyFilled)?;
            }
            return Err(FillError::Retype(err));
        }
        filled.push(field);
    }
    Ok(())
}

fn type_into(
    backend: &dyn UiAutomation,
    window: &WindowInfo,
    target: &AutofillTarget,
) -> Result<AutofillOutcome, AutofillError> {
    backend.focus(window)?;
    backend.send_keys(&keystroke_plan(target))?;
    tracing::info!("autofill typed into window '{}'", window.title);
    Ok(AutofillOutcome::Keystrokes)
}
