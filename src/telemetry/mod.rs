//! Plain-text rendering of engine events and error chains for log sinks.
//!
//! Grounded on the teacher's `telemetry` module (`TelemetryFormatter`,
//! `EventRender`, ANSI color constants), adapted to the engine's flat
//! [`Event`] enum and [`LadderError`] chain instead of the teacher's
//! scoped `ErrorEvent`.

use crate::errors::LadderError;
use crate::event_bus::Event;

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

/// Rendered output for a telemetry item that can be consumed by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    #[must_use]
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
    fn render_error(&self, error: &LadderError) -> EventRender;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PlainFormatter;

impl PlainFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn format_error_chain(error: &LadderError, indent: usize) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(cause) = &error.cause {
        let indent_str = "  ".repeat(indent);
        lines.push(format!("{LINE_COLOR}{indent_str}cause: {}{RESET_COLOR}\n", cause.message));
        lines.extend(format_error_chain(cause, indent + 1));
    }
    lines
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let line = format!("{LINE_COLOR}{event}{RESET_COLOR}\n");
        EventRender {
            context: Some(format!("{CONTEXT_COLOR}{}{RESET_COLOR}", event.workflow_id())),
            lines: vec![line],
        }
    }

    fn render_error(&self, error: &LadderError) -> EventRender {
        let mut lines = vec![format!("{LINE_COLOR}error: {}{RESET_COLOR}\n", error.message)];
        lines.extend(format_error_chain(error, 1));
        if !error.details.is_null() {
            lines.push(format!("{LINE_COLOR}  details: {}{RESET_COLOR}\n", error.details));
        }
        EventRender { context: None, lines }
    }
}
