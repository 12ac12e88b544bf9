use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::services::render::{RenderEvent, Renderer};

/// Prints streamed text and status lines to the terminal.
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    /// Streamed text has been printed without a trailing newline.
    mid_line: AtomicBool,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_line(&self, out: &mut impl Write) -> std::io::Result<()> {
        if self.mid_line.swap(false, Ordering::SeqCst) {
            writeln!(out)?;
        }
        Ok(())
    }
}

impl Renderer for TerminalRenderer {
    fn render(&self, event: &RenderEvent) {
        let mut out = std::io::stdout().lock();
        let written = match event {
            RenderEvent::MessageDelta { delta, .. } => {
                self.mid_line.store(true, Ordering::SeqCst);
                write!(out, "{delta}")
            }
            RenderEvent::StreamingChanged { streaming: false } => self.end_line(&mut out),
            RenderEvent::Status { message, is_error } => self.end_line(&mut out).and_then(|_| {
                if *is_error {
                    writeln!(out, "! {message}")
                } else {
                    writeln!(out, "· {message}")
                }
            }),
            _ => Ok(()),
        };
        if let Err(err) = written.and_then(|_| out.flush()) {
            log::debug!("Terminal write failed: {}", err);
        }
    }
}
