use std::process::ExitCode;

use log::error;
use tokio::io::{AsyncBufReadExt, BufReader};

use support_chat::app::ChatConfig;
use support_chat::ui;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();

    let mut config = ChatConfig::load();
    if std::env::args().skip(1).any(|arg| arg == "--admin") {
        config.role = support_chat::api::models::SenderRole::Admin;
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    if !config.is_complete() {
        let mut out = tokio::io::stdout();
        config = match ui::login::complete_config(config, &mut input, &mut out).await {
            Ok(config) => config,
            Err(e) => {
                error!("setup failed: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = config.save() {
            eprintln!("Failed to save settings: {e}");
        }
    }

    match ui::main_window::run(config, input).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("support-chat: {e}");
            ExitCode::FAILURE
        }
    }
}
