use std::path::PathBuf;

use chat_sync::app::{AppConfig, ENV_LOG};
use chat_sync::session::{Command, Session};
use chat_sync::ui::render_screen;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Terminal client for the unified Slack/Gmail dashboard backend.
#[derive(Parser, Debug)]
#[command(name = "chat-sync", version, about)]
struct Args {
    /// Config file to use instead of the per-user default.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend base URL, overriding config and environment.
    #[arg(long)]
    backend_url: Option<String>,
    /// Write the effective config back to disk and exit.
    #[arg(long)]
    write_config: bool,
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(ENV_LOG, "info"))
        .filter_module("tungstenite", log::LevelFilter::Warn)
        .filter_module("tokio_tungstenite", log::LevelFilter::Warn)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .filter_module("hyper", log::LevelFilter::Warn)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path).with_env(),
        None => AppConfig::load(),
    };
    if let Some(url) = args.backend_url {
        config.backend_url = url;
    }

    if args.write_config {
        let saved = match &args.config {
            Some(path) => config.save_to(path).map(|_| path.clone()),
            None => config.save(),
        };
        match saved {
            Ok(path) => println!("wrote {}", path.display()),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut session = match Session::from_config(&config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    log::info!("connecting to {}", config.backend_url());

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Ok(command) => {
                    let quit = command == Command::Quit;
                    if commands_tx.send(command).is_err() || quit {
                        break;
                    }
                }
                Err(msg) => eprintln!("{msg}"),
            }
        }
    });

    session
        .run(commands_rx, |coordinator, notice| {
            println!("\n{}", render_screen(coordinator, notice));
        })
        .await;
}
