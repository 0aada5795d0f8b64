//! Console panels: one framed transcript per session, printed to stdout.
//!
//! Each panel runs in its own task. A new entry goes on top of the
//! transcript, the panel re-measures itself, redraws, waits out the
//! configured settle time and only then reports ready for the next entry.

use chrono::{DateTime, Utc};
use session_mux::{Event, SessionId, Surface, SurfaceFactory, SurfaceSignals};
use std::collections::VecDeque;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{debug, info};
use unicode_width::UnicodeWidthStr;
use uuid::Uuid;

use crate::config::SurfaceSettings;

const TIMESTAMP_WIDTH: usize = "[00:00:00] ".len();

/// Size a panel wants after its last update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelEntry {
    #[allow(dead_code)]
    pub key: Uuid,
    pub received_at: DateTime<Utc>,
    pub text: String,
}

/// Transcript of one session, newest entry first.
#[derive(Debug)]
pub struct Panel {
    header: String,
    entries: VecDeque<PanelEntry>,
    max_entries: usize,
    padding: usize,
    geometry: Geometry,
}

impl Panel {
    pub fn new(session_id: SessionId, settings: &SurfaceSettings) -> Self {
        let mut panel = Self {
            header: format!("{} · {}", session_id, settings.title),
            entries: VecDeque::new(),
            max_entries: settings.max_entries,
            padding: settings.padding,
            geometry: Geometry::default(),
        };
        panel.geometry = panel.measure();
        panel
    }

    /// Put an event on top and return the recomputed geometry.
    pub fn push(&mut self, event: &Event) -> Geometry {
        self.entries.push_front(PanelEntry {
            key: event.key(),
            received_at: event.received_at(),
            text: event.text().into_owned(),
        });
        self.entries.truncate(self.max_entries);
        self.geometry = self.measure();
        self.geometry
    }

    #[cfg(test)]
    pub fn entries(&self) -> impl Iterator<Item = &PanelEntry> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Draw the panel as a framed block of text.
    pub fn render(&self) -> String {
        let lines = self.content_lines();
        let inner = self.inner_width(&lines);
        let rule = "─".repeat(inner + 2);

        let mut out = String::new();
        out.push_str(&format!("┌{rule}┐\n"));
        out.push_str(&framed(&self.header, inner));
        if !lines.is_empty() {
            out.push_str(&format!("├{rule}┤\n"));
        }
        for line in &lines {
            out.push_str(&framed(line, inner));
        }
        out.push_str(&format!("└{rule}┘\n"));
        out
    }

    fn content_lines(&self) -> Vec<String> {
        let indent = " ".repeat(TIMESTAMP_WIDTH);
        let mut lines = Vec::new();
        for entry in &self.entries {
            let stamp = entry.received_at.format("[%H:%M:%S] ");
            let mut parts = entry.text.lines();
            lines.push(format!("{stamp}{}", parts.next().unwrap_or_default()));
            lines.extend(parts.map(|part| format!("{indent}{part}")));
        }
        lines
    }

    fn inner_width(&self, lines: &[String]) -> usize {
        lines
            .iter()
            .map(|line| line.width())
            .chain(std::iter::once(self.header.width()))
            .max()
            .unwrap_or(0)
    }

    fn measure(&self) -> Geometry {
        let lines = self.content_lines();
        Geometry {
            width: self.inner_width(&lines) + self.padding,
            height: 1 + lines.len() + self.padding,
        }
    }
}

fn framed(line: &str, inner: usize) -> String {
    let fill = inner.saturating_sub(line.width());
    format!("│ {line}{} │\n", " ".repeat(fill))
}

enum PanelUpdate {
    Show(Event),
    Close,
}

/// Surface handle held by the session worker; drawing happens in the panel task.
pub struct ConsoleSurface {
    updates: mpsc::UnboundedSender<PanelUpdate>,
}

impl Surface for ConsoleSurface {
    fn show_next(&mut self, event: Event) {
        let _ = self.updates.send(PanelUpdate::Show(event));
    }

    fn close(&mut self) {
        let _ = self.updates.send(PanelUpdate::Close);
    }
}

pub struct ConsoleSurfaceFactory {
    settings: SurfaceSettings,
}

impl ConsoleSurfaceFactory {
    pub fn new(settings: SurfaceSettings) -> Self {
        Self { settings }
    }
}

impl SurfaceFactory for ConsoleSurfaceFactory {
    fn create_surface(&self, session_id: SessionId, signals: SurfaceSignals) -> Box<dyn Surface> {
        let (updates, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_panel(session_id, self.settings.clone(), rx, signals));
        Box::new(ConsoleSurface { updates })
    }
}

async fn run_panel(
    session_id: SessionId,
    settings: SurfaceSettings,
    mut updates: mpsc::UnboundedReceiver<PanelUpdate>,
    signals: SurfaceSignals,
) {
    let mut panel = Panel::new(session_id, &settings);
    print_frame(&panel.render());
    signals.attached();

    while let Some(update) = updates.recv().await {
        match update {
            PanelUpdate::Show(event) => {
                let geometry = panel.push(&event);
                debug!(
                    session = %session_id,
                    key = %event.key(),
                    width = geometry.width,
                    height = geometry.height,
                    "Panel updated"
                );
                print_frame(&panel.render());
                if !settings.settle.is_zero() {
                    tokio::time::sleep(settings.settle).await;
                }
                signals.ready();
            }
            PanelUpdate::Close => break,
        }
    }

    info!(session = %session_id, "Panel closed");
}

fn print_frame(frame: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(frame.as_bytes());
    let _ = stdout.flush();
}
