mod alerts;
mod app;
mod audio_feedback;
mod channel;
mod cli;
mod config;
mod error;
mod render;
mod service;
mod session;
mod upload;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use app::{Coordinator, CoordinatorEvent, Snapshot};
use channel::{ChannelConnection, EventKind, SseTransport};
use cli::{Args, Command};
use config::Config;
use service::{HttpService, RemoteService};
use upload::Document;

fn main() {
    env_logger::init();
    let args = Args::parse();
    log::info!("PII guard starting");

    let mut config = Config::load();
    args.apply(&mut config);
    if args.save_config {
        if let Err(e) = config.save() {
            log::warn!("Failed to save config: {e}");
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(run(config));
    // stdin reads park a blocking thread that never returns on its own
    runtime.shutdown_timeout(Duration::from_millis(200));
}

async fn run(config: Config) {
    // All state changes funnel through this queue into the coordinator
    let (event_tx, event_rx) = async_channel::unbounded::<CoordinatorEvent>();

    let service: Arc<dyn RemoteService> = Arc::new(HttpService::new(&config));
    let (coordinator, snapshots) = Coordinator::new(
        service,
        audio_feedback::default_sink(config.alert_sound),
        config.default_level,
        event_tx.clone(),
    );

    let transport = Arc::new(SseTransport::new(config.events.clone()));
    let channel = ChannelConnection::open(
        config.endpoint(&config.events_path),
        transport,
        config.reconnect.clone(),
    );
    for kind in EventKind::ALL {
        let sender = event_tx.clone();
        channel.subscribe(kind, move |event| {
            let _ = sender.try_send(CoordinatorEvent::Channel(event.clone()));
        });
    }
    {
        let sender = event_tx.clone();
        channel.on_status_change(move |status| {
            let _ = sender.try_send(CoordinatorEvent::ConnectionChanged(status));
        });
    }

    let printer = tokio::spawn(print_snapshots(snapshots.clone(), config.server_url.clone()));
    let input = tokio::spawn(read_commands(event_tx, snapshots, config.server_url.clone()));

    coordinator.run(event_rx).await;

    channel.close();
    input.abort();
    printer.abort();
}

async fn print_snapshots(mut snapshots: watch::Receiver<Snapshot>, origin: String) {
    while snapshots.changed().await.is_ok() {
        let text = render::render(&snapshots.borrow_and_update(), &origin);
        println!("{text}");
    }
}

/// Translate stdin lines into coordinator events.
async fn read_commands(
    sender: async_channel::Sender<CoordinatorEvent>,
    snapshots: watch::Receiver<Snapshot>,
    origin: String,
) {
    println!("{}", cli::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read stdin: {e}");
                break;
            }
        };

        let event = match cli::parse_command(&line) {
            Ok(None) => continue,
            Ok(Some(Command::Upload { path, level })) => {
                let document = match path {
                    Some(path) => match Document::from_path(&path).await {
                        Ok(document) => Some(document),
                        Err(e) => {
                            println!("Cannot read {}: {e}", path.display());
                            continue;
                        }
                    },
                    None => None,
                };
                CoordinatorEvent::SubmitUpload { document, level }
            }
            Ok(Some(Command::Send(event))) => event.into(),
            Ok(Some(Command::Status)) => {
                println!("{}", render::render(&snapshots.borrow(), &origin));
                continue;
            }
            Ok(Some(Command::Help)) => {
                println!("{}", cli::HELP);
                continue;
            }
            Ok(Some(Command::Quit)) => break,
            Err(msg) => {
                println!("{msg}");
                continue;
            }
        };

        if sender.send(event).await.is_err() {
            return;
        }
    }

    let _ = sender.send(CoordinatorEvent::Shutdown).await;
}
