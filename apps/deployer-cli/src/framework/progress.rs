//! Progress notifications for long running deployment jobs.
//!
//! Progress is a stream of human readable lines at solution / step / substep granularity,
//! separate from diagnostic logging. The engine sends [`ProgressEvent`]s through a
//! [`ProgressNotifier`]; whoever holds the receiving end decides how to render them. Every
//! event is mirrored to `tracing` so runs without a renderer still leave a trail in the logs.

use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Solution(String),
    Step(String),
    Substep(String),
    OperationStart(String),
    /// Heartbeat while waiting on a remote operation
    OperationInProgress,
    OperationComplete(String),
    TableHeader(String),
    TableRow(String, String),
    Exception(String),
    SolutionComplete(String),
}

impl ProgressEvent {
    fn mirror(&self) {
        match self {
            ProgressEvent::Solution(text) => info!("[solution] {}", text),
            ProgressEvent::Step(text) => info!("[step] {}", text),
            ProgressEvent::Substep(text) => info!("[substep] {}", text),
            ProgressEvent::OperationStart(text) => info!("[operation] {}", text),
            ProgressEvent::OperationInProgress => {}
            ProgressEvent::OperationComplete(text) => info!("[operation] {}", text),
            ProgressEvent::TableHeader(text) => info!("[table] {}", text),
            ProgressEvent::TableRow(first, second) => info!("[table] {} = {}", first, second),
            ProgressEvent::Exception(text) => error!("[exception] {}", text),
            ProgressEvent::SolutionComplete(text) => info!("[complete] {}", text),
        }
    }
}

/// Cloneable sending half of the progress channel
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressNotifier {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a notifier together with the receiver its events arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// A notifier that only logs.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: ProgressEvent) {
        event.mirror();
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is rendering anymore
            let _ = tx.send(event);
        }
    }

    pub fn solution(&self, text: impl Into<String>) {
        self.send(ProgressEvent::Solution(text.into()));
    }

    pub fn step(&self, text: impl Into<String>) {
        self.send(ProgressEvent::Step(text.into()));
    }

    pub fn substep(&self, text: impl Into<String>) {
        self.send(ProgressEvent::Substep(text.into()));
    }

    pub fn operation_start(&self, text: impl Into<String>) {
        self.send(ProgressEvent::OperationStart(text.into()));
    }

    pub fn operation_in_progress(&self) {
        self.send(ProgressEvent::OperationInProgress);
    }

    pub fn operation_complete(&self, text: impl Into<String>) {
        self.send(ProgressEvent::OperationComplete(text.into()));
    }

    pub fn table_header(&self, text: impl Into<String>) {
        self.send(ProgressEvent::TableHeader(text.into()));
    }

    pub fn table_row(&self, first: impl Into<String>, second: impl Into<String>) {
        self.send(ProgressEvent::TableRow(first.into(), second.into()));
    }

    pub fn exception(&self, text: impl Into<String>) {
        self.send(ProgressEvent::Exception(text.into()));
    }

    pub fn solution_complete(&self, text: impl Into<String>) {
        self.send(ProgressEvent::SolutionComplete(text.into()));
    }
}

/// Drains everything currently buffered on `rx`.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (notifier, mut rx) = ProgressNotifier::channel();

        notifier.solution("Deploy Product Sales");
        notifier.table_row("webDatasourcePath", "https://c/d/");
        notifier.operation_in_progress();

        assert_eq!(
            drain(&mut rx),
            vec![
                ProgressEvent::Solution("Deploy Product Sales".to_string()),
                ProgressEvent::TableRow("webDatasourcePath".to_string(), "https://c/d/".to_string()),
                ProgressEvent::OperationInProgress,
            ]
        );
    }

    #[test]
    fn test_sending_without_receiver_is_harmless() {
        let (notifier, rx) = ProgressNotifier::channel();
        drop(rx);
        notifier.step("still fine");
        ProgressNotifier::disabled().exception("only logged");
    }
}
