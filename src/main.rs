//! ccdeck binary: shell, run loop, port lifecycle

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ccdeck::bridge::InputBridge;
use ccdeck::cli::{self, Command};
use ccdeck::config::AppConfig;
use ccdeck::deck::Deck;
use ccdeck::persistence;
use ccdeck::transport::{MidirTransport, Transport};

/// Software MIDI control surface with automatic CC allocation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "ccdeck.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Layout file to load at startup (overrides the config)
    #[arg(long)]
    layout: Option<String>,

    /// List available MIDI ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let transport = MidirTransport::new();

    if args.list_ports {
        cli::list_ports_formatted(&transport);
        return Ok(());
    }

    let mut config = AppConfig::load(&args.config).await?;
    if args.layout.is_some() {
        config.layout = args.layout.clone();
    }
    info!("starting ccdeck (tick {} Hz)", config.engine.tick_hz);

    run_app(config, transport).await?;

    info!("ccdeck shutdown complete");
    Ok(())
}

async fn run_app(config: AppConfig, transport: MidirTransport) -> Result<()> {
    let mut deck = Deck::new();
    let mut bridge: Option<InputBridge> = None;

    // Configured ports are best-effort: a missing device must not stop the
    // session from coming up
    if let Some(name) = &config.midi.output_port {
        match transport.open_output(name) {
            Ok(handle) => deck.set_output(handle),
            Err(e) => warn!("output port '{}' unavailable: {}", name, e),
        }
    }
    if let Some(name) = &config.midi.input_port {
        match transport.open_input(name) {
            Ok(handle) => bridge = Some(InputBridge::start(handle)),
            Err(e) => warn!("input port '{}' unavailable: {}", name, e),
        }
    }

    if let Some(path) = &config.layout {
        if let Err(e) = persistence::load_layout(&mut deck, path) {
            warn!("layout load failed: {:#}", e);
        }
    }

    let mut lines = spawn_shell();
    let mut tick = tokio::time::interval(config.tick_interval());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Fixed drain tick: the only place inbound MIDI mutates controls
            _ = tick.tick() => {
                if let Some(bridge) = bridge.as_mut() {
                    deck.pump(bridge);
                }
            }

            line = lines.recv() => {
                let Some(line) = line else { break };
                if !handle_line(&mut deck, &mut bridge, &transport, &line).await {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // Ordered shutdown: stop the listener (bounded join), then close the
    // output handle
    if let Some(bridge) = bridge.take() {
        bridge.shutdown().await;
    }
    deck.clear_output();

    Ok(())
}

/// Parse and run one shell line. Returns false when the session should end.
async fn handle_line(
    deck: &mut Deck,
    bridge: &mut Option<InputBridge>,
    transport: &MidirTransport,
    line: &str,
) -> bool {
    if line.trim().is_empty() {
        return true;
    }

    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(usage) => {
            println!("{usage}");
            return true;
        }
    };

    match command {
        Command::Quit => return false,
        Command::Ports => cli::list_ports_formatted(transport),
        Command::SetOutput(name) => {
            // The previous handle closes before the new port opens
            deck.clear_output();
            match transport.open_output(&name) {
                Ok(handle) => deck.set_output(handle),
                Err(e) => println!("cannot open output: {e}"),
            }
        }
        Command::SetInput(name) => match transport.open_input(&name) {
            // Last switch wins: the previous listener is stopped and
            // joined before the new one starts
            Ok(handle) => *bridge = Some(InputBridge::replace(bridge.take(), handle).await),
            Err(e) => println!("cannot open input: {e}"),
        },
        other => match cli::apply(deck, &other) {
            Ok(output) if output.is_empty() => {}
            Ok(output) => println!("{output}"),
            Err(e) => println!("error: {e:#}"),
        },
    }

    true
}

/// Read shell lines on a blocking thread, feeding the run loop
fn spawn_shell() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                warn!("cannot start shell: {}", e);
                return;
            }
        };

        loop {
            match editor.readline("ccdeck> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    let _ = tx.blocking_send("quit".to_string());
                    break;
                }
            }
        }
    });

    rx
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
