#[macro_use]
mod cli;
pub mod framework;
pub mod infrastructure;
pub mod utilities;

#[cfg(test)]
pub mod test_utils;

use std::process::ExitCode;

use clap::Parser;
use cli::display::{Message, MessageType};

// Entry point for the CLI application
fn main() -> ExitCode {
    let cli_result = cli::Cli::parse();

    let user_directory = match cli::settings::setup_user_directory() {
        Ok(directory) => directory,
        Err(e) => {
            show_message!(
                MessageType::Error,
                Message {
                    action: "Init".to_string(),
                    details: format!(
                        "Failed to initialize ~/.deployer, please check your permissions: {e:?}"
                    ),
                }
            );
            return ExitCode::from(1);
        }
    };

    let config = match cli::settings::read_settings(cli_result.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            show_message!(
                MessageType::Error,
                Message::new("Config".to_string(), format!("Failed to read settings: {e}"))
            );
            return ExitCode::from(1);
        }
    };

    if let Err(e) = cli::logger::setup_logging(&config.logger, &user_directory) {
        eprintln!("Logging disabled: {e}");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            show_message!(
                MessageType::Error,
                Message::new("Runtime".to_string(), format!("Failed to start: {e}"))
            );
            return ExitCode::from(1);
        }
    };

    let result = runtime.block_on(cli::top_command_handler(config, &cli_result.command));

    match result {
        Ok(s) => {
            show_message!(s.message_type, s.message);
            ExitCode::from(0)
        }
        Err(e) => {
            show_message!(e.message_type, e.message);
            if let Some(err) = e.error {
                eprintln!("{err:?}");
            }
            ExitCode::from(1)
        }
    }
}
