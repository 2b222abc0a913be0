//! Terminal prompts.

use inquire::error::InquireError;
use inquire::{Confirm, Password, PasswordDisplayMode, Select, Text};

use jarvis_core::{PortError, Prompter};

#[derive(Debug, Clone, Default)]
pub struct InquirePrompter;

fn map_err(err: InquireError) -> PortError {
    match err {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => {
            PortError::Aborted("prompt cancelled by the operator".to_owned())
        }
        InquireError::NotTTY => {
            PortError::UserInput("an interactive terminal is required".to_owned())
        }
        other => PortError::Transport(format!("prompt failed: {other}")),
    }
}

impl Prompter for InquirePrompter {
    fn confirm(&self, message: &str) -> Result<bool, PortError> {
        Confirm::new(message)
            .with_default(false)
            .prompt()
            .map_err(map_err)
    }

    fn input(&self, message: &str) -> Result<String, PortError> {
        Text::new(message).prompt().map_err(map_err)
    }

    fn secret(&self, message: &str) -> Result<String, PortError> {
        Password::new(message)
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Hidden)
            .prompt()
            .map_err(map_err)
    }

    fn select(&self, message: &str, options: &[String]) -> Result<usize, PortError> {
        if options.is_empty() {
            return Err(PortError::UserInput(format!("{message}: nothing to choose from")));
        }
        Select::new(message, options.to_vec())
            .raw_prompt()
            .map(|choice| choice.index)
            .map_err(map_err)
    }
}
