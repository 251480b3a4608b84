//! # Display Module
//!
//! User facing terminal output. Diagnostic logs go through `tracing`; everything here is
//! meant to be read by the person running the command.
//!
//! - [`Message`] and [`MessageType`] carry one line of output, rendered as a right-aligned
//!   action column followed by details.
//! - [`show_message!`] prints a message and mirrors it to the log.
//! - [`progress::ProgressRenderer`] turns the engine's progress events into lines while jobs run.

pub mod progress;
pub mod status;
pub mod terminal;

use tracing::info;

use terminal::{write_styled_line, StyledText};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Info,
    Success,
    Warning,
    Error,
    Highlight,
}

impl MessageType {
    fn styled(self, action: &str) -> StyledText {
        let text = StyledText::from_str(action);
        match self {
            MessageType::Info => text.cyan().bold(),
            MessageType::Success => text.green().bold(),
            MessageType::Warning => text.yellow().bold(),
            MessageType::Error => text.red().bold(),
            MessageType::Highlight => text.on_green().bold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub action: String,
    pub details: String,
}

impl Message {
    pub fn new(action: String, details: String) -> Self {
        Self { action, details }
    }
}

/// Colours are dropped when `NO_COLOR` is set.
pub(crate) fn no_ansi() -> bool {
    std::env::var_os("NO_COLOR").is_some()
}

pub fn show_message_wrapper(message_type: MessageType, message: Message) {
    info!("{}: {}", message.action, message.details);
    let styled = message_type.styled(&message.action);
    // Nothing sensible to do when stdout is gone
    let _ = write_styled_line(&styled, &message.details, no_ansi());
}

#[macro_export]
macro_rules! show_message {
    ($message_type:expr, $message:expr) => {
        $crate::cli::display::show_message_wrapper($message_type, $message)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_styles_differ_by_type() {
        assert_ne!(
            MessageType::Success.styled("Deploy"),
            MessageType::Error.styled("Deploy")
        );
        assert_eq!(
            MessageType::Info.styled("Deploy"),
            StyledText::from_str("Deploy").cyan().bold()
        );
    }
}
