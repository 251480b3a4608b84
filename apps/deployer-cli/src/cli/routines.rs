//! # Routines
//!
//! A routine is what a CLI command runs: a function returning [`RoutineSuccess`] or
//! [`RoutineFailure`], each carrying the message shown to the user when the command ends.
//!
//! - [`customers`] prints the customer catalog.
//! - [`exports`] inspects the local and git export stores; none of it talks to the platform.
//! - [`deploy`] turns commands into deployment requests, runs them on the job queue and
//!   renders progress until every job has reported.

pub mod customers;
pub mod deploy;
pub mod exports;

use super::display::{self, Message, MessageType};

#[derive(Debug, Clone)]
pub struct RoutineSuccess {
    pub message: Message,
    pub message_type: MessageType,
}

impl From<RoutineFailure> for anyhow::Error {
    fn from(failure: RoutineFailure) -> Self {
        if let Some(err) = failure.error {
            err
        } else {
            anyhow::anyhow!("{}: {}", failure.message.action, failure.message.details)
        }
    }
}

impl RoutineSuccess {
    pub fn success(message: Message) -> Self {
        Self {
            message,
            message_type: MessageType::Success,
        }
    }

    pub fn info(message: Message) -> Self {
        Self {
            message,
            message_type: MessageType::Info,
        }
    }

    pub fn show(&self) {
        display::show_message_wrapper(self.message_type, self.message.clone());
    }
}

#[derive(Debug)]
pub struct RoutineFailure {
    pub message: Message,
    pub message_type: MessageType,
    pub error: Option<anyhow::Error>,
}

impl RoutineFailure {
    pub fn new<F: Into<anyhow::Error>>(message: Message, error: F) -> Self {
        Self {
            message,
            message_type: MessageType::Error,
            error: Some(error.into()),
        }
    }

    /// create a RoutineFailure error without an error
    pub fn error(message: Message) -> Self {
        Self {
            message,
            message_type: MessageType::Error,
            error: None,
        }
    }
}
