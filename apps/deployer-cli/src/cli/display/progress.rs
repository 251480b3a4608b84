//! Renders engine progress events as terminal lines.
//!
//! Heartbeats are not printed one by one; they are counted and the elapsed time of a remote
//! operation is appended to its completion line instead.

use std::io::Write;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::terminal::{write_styled_line_to, StyledText};
use crate::framework::progress::ProgressEvent;

/// "234ms" below a second, "2.3s" above.
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

pub struct ProgressRenderer<W> {
    writer: W,
    no_ansi: bool,
    operation_started: Option<Instant>,
    heartbeats: usize,
}

impl<W: Write> ProgressRenderer<W> {
    pub fn new(writer: W, no_ansi: bool) -> Self {
        Self {
            writer,
            no_ansi,
            operation_started: None,
            heartbeats: 0,
        }
    }

    /// Renders events until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> W {
        while let Some(event) = rx.recv().await {
            // a closed stdout must not take the deployment down with it
            let _ = self.render(event);
        }
        self.writer
    }

    pub fn render(&mut self, event: ProgressEvent) -> std::io::Result<()> {
        let (styled, details) = match event {
            ProgressEvent::Solution(text) => (StyledText::from_str("Solution").on_green().bold(), text),
            ProgressEvent::Step(text) => (StyledText::from_str("Step").cyan().bold(), text),
            ProgressEvent::Substep(text) => (StyledText::from_str(""), text),
            ProgressEvent::OperationStart(text) => {
                self.operation_started = Some(Instant::now());
                self.heartbeats = 0;
                (StyledText::from_str("Running").cyan(), text)
            }
            ProgressEvent::OperationInProgress => {
                self.heartbeats += 1;
                return Ok(());
            }
            ProgressEvent::OperationComplete(text) => {
                let details = match self.operation_started.take() {
                    Some(started) => format!(
                        "{} (after {} checks, {})",
                        text,
                        self.heartbeats,
                        format_duration(started.elapsed())
                    ),
                    None => text,
                };
                (StyledText::from_str("Done").green(), details)
            }
            ProgressEvent::TableHeader(text) => (StyledText::from_str("Plan").cyan().bold(), text),
            ProgressEvent::TableRow(first, second) => {
                (StyledText::from_str(""), format!("{first} = {second}"))
            }
            ProgressEvent::Exception(text) => (StyledText::from_str("Error").red().bold(), text),
            ProgressEvent::SolutionComplete(text) => {
                (StyledText::from_str("Finished").green().bold(), text)
            }
        };
        write_styled_line_to(&mut self.writer, &styled, &details, self.no_ansi)
    }
}
