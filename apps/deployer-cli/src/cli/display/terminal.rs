//! Styled terminal lines.
//!
//! Every line the CLI prints has the same shape: a right-aligned, coloured action column of
//! [`ACTION_WIDTH`] characters followed by the details. Styling goes through crossterm so it
//! works the same on every terminal the CLI runs in.

use crossterm::{
    execute,
    style::{
        Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
    },
};
use std::io::{stdout, Result as IoResult, Write};

/// Width of the action column in terminal output
pub const ACTION_WIDTH: usize = 15;

/// Builder for the styled action column.
///
/// ```rust
/// # use crate::cli::display::terminal::StyledText;
/// let styled = StyledText::from_str("Deployed").green().bold();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StyledText {
    text: String,
    foreground: Option<Color>,
    background: Option<Color>,
    bold: bool,
}

impl StyledText {
    pub fn new(text: String) -> Self {
        Self {
            text,
            foreground: None,
            background: None,
            bold: false,
        }
    }

    pub fn from_str(text: &str) -> Self {
        Self::new(text.to_string())
    }

    pub fn cyan(mut self) -> Self {
        self.foreground = Some(Color::Cyan);
        self
    }

    pub fn green(mut self) -> Self {
        self.foreground = Some(Color::Green);
        self
    }

    pub fn yellow(mut self) -> Self {
        self.foreground = Some(Color::Yellow);
        self
    }

    pub fn red(mut self) -> Self {
        self.foreground = Some(Color::Red);
        self
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn on_green(mut self) -> Self {
        self.background = Some(Color::Green);
        self
    }
}

/// Writes `[ACTION] message` to `writer`.
///
/// # Arguments
///
/// * `styled_text` - The action column; truncated to [`ACTION_WIDTH`] characters
/// * `message` - Details printed after the action
/// * `no_ansi` - Skip all colour and attribute escape codes
pub fn write_styled_line_to<W: Write>(
    writer: &mut W,
    styled_text: &StyledText,
    message: &str,
    no_ansi: bool,
) -> IoResult<()> {
    // char-aware so multi-byte text never splits
    let truncated_action: String = styled_text.text.chars().take(ACTION_WIDTH).collect();
    let padded_action = format!("{truncated_action:>ACTION_WIDTH$}");

    if !no_ansi {
        if let Some(color) = styled_text.foreground {
            execute!(writer, SetForegroundColor(color))?;
        }
        if let Some(color) = styled_text.background {
            execute!(writer, SetBackgroundColor(color))?;
        }
        if styled_text.bold {
            execute!(writer, SetAttribute(Attribute::Bold))?;
        }
    }

    execute!(writer, Print(&padded_action))?;

    if !no_ansi {
        execute!(writer, ResetColor)?;
        if styled_text.bold {
            execute!(writer, SetAttribute(Attribute::Reset))?;
        }
    }

    execute!(writer, Print(" "), Print(message), Print("\n"))?;
    Ok(())
}

pub fn write_styled_line(styled_text: &StyledText, message: &str, no_ansi: bool) -> IoResult<()> {
    let mut stdout = stdout();
    write_styled_line_to(&mut stdout, styled_text, message, no_ansi)
}
