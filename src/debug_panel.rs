//! On-screen debug panel.
//!
//! When `debug_panel` is enabled the kiosk keeps the most recent log lines so they
//! can be shown over the video surfaces. [`DebugPanelLayer`] is a
//! `tracing_subscriber` layer that formats each event into one line and pushes it
//! into a shared [`DebugPanel`] ring buffer, newest first.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Lines kept by the panel.
pub const MAX_PANEL_ENTRIES: usize = 50;

/// A single panel line.
#[derive(Debug, Clone)]
pub struct PanelEntry {
    /// Local time of the event.
    pub timestamp: DateTime<Local>,
    /// Event level.
    pub level: Level,
    /// Message followed by its fields.
    pub message: String,
}

impl fmt::Display for PanelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>5} {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// A thread-safe, fixed-capacity line buffer.
#[derive(Debug, Clone)]
pub struct DebugPanel {
    entries: Arc<Mutex<VecDeque<PanelEntry>>>,
    capacity: usize,
}

impl Default for DebugPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugPanel {
    /// Panel with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_PANEL_ENTRIES)
    }

    /// Panel keeping at most `capacity` lines.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Add a line, dropping the oldest when full.
    pub fn push(&self, entry: PanelEntry) {
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Current lines, newest first.
    pub fn snapshot(&self) -> Vec<PanelEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Panel text as it appears on screen.
    pub fn render(&self) -> String {
        self.entries
            .lock()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of lines held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the panel is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every line.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// A layer feeding this panel.
    pub fn layer(&self) -> DebugPanelLayer {
        DebugPanelLayer {
            panel: self.clone(),
        }
    }
}

/// Collects the `message` field plus any structured fields as `key=value`.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// `tracing_subscriber` layer that mirrors events into a [`DebugPanel`].
pub struct DebugPanelLayer {
    panel: DebugPanel,
}

impl<S: Subscriber> Layer<S> for DebugPanelLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        self.panel.push(PanelEntry {
            timestamp: Local::now(),
            level: *event.metadata().level(),
            message: format!("{}{}", visitor.message, visitor.fields),
        });
    }
}
