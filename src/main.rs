use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use excs_client::config::{ConfigLoader, LogFormat, LoggingConfig};
use excs_client::{CommandStationClient, DisconnectCause};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "excs-monitor",
    version,
    about = "Inspect and watch a DCC-EX EX-CommandStation over TCP.",
    long_about = "Connects to an EX-CommandStation, prints its system info, turnouts and roster, \
                  and streams push messages and connection events. Settings come from excs.toml \
                  and EXCS_* environment variables; flags override both."
)]
struct Args {
    /// Command station host name or IP address.
    #[arg(long)]
    host: Option<String>,

    /// Command station TCP port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON lines instead of text.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and print the system info.
    Info,
    /// Load and print turnouts and roster.
    Inventory,
    /// Print push messages and connection events until Ctrl-C.
    Watch,
    /// Send one command body, e.g. `send "1"` to power the tracks.
    Send {
        /// Command body without the angle brackets.
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();
    init_tracing(&config.logging);

    if let Some(host) = args.host.clone() {
        config.station.host = host;
    }
    if let Some(port) = args.port {
        config.station.port = port;
    }
    let options = config.station.client_options()?;
    debug!("Using command station at {}", options.endpoint());

    let client = CommandStationClient::new(options);

    match args.command {
        Command::Info => {
            client.connect().await?;
            let info = client.fetch_system_info().await?;
            let version_ok = client.validate_version();
            if args.json {
                println!(
                    "{}",
                    json!({ "system_info": info, "supported": version_ok.is_ok() })
                );
            } else {
                println!("EX-CommandStation {}", info.version);
                println!("  Processor:        {}", info.processor_type);
                println!("  Motor controller: {}", info.motor_controller);
                println!("  Build:            {}", info.build_number);
                if let Err(e) = version_ok {
                    println!("  Warning: {e}");
                }
            }
        }
        Command::Inventory => {
            client.setup().await?;
            print_inventory(&client, args.json);
        }
        Command::Watch => {
            client.connect().await?;
            watch(&client, args.json).await;
        }
        Command::Send { body } => {
            client.connect().await?;
            client.send_command(&body).await?;
            info!("Sent <{}>", body);
        }
    }

    client.shutdown().await;
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("excs_client={0},excs_monitor={0}", logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn print_inventory(client: &CommandStationClient, as_json: bool) {
    let turnouts = client.turnouts();
    let roster = client.roster_entries();

    if as_json {
        println!("{}", json!({ "turnouts": turnouts, "roster": roster }));
        return;
    }

    println!("Turnouts ({}):", turnouts.len());
    for turnout in &turnouts {
        println!("  {:>5}  {:<7}  {}", turnout.id, turnout.state, turnout.description);
    }
    println!("Roster ({}):", roster.len());
    for loco in &roster {
        println!("  {:>5}  {}", loco.id, loco.description);
        for function in loco.functions.values() {
            let kind = if function.is_momentary { "momentary" } else { "latching" };
            println!("         F{:<3} {} ({})", function.id, function.label, kind);
        }
    }
}

fn emit(as_json: bool, event: &str, detail: &str) {
    let now = chrono::Local::now();
    if as_json {
        println!(
            "{}",
            json!({ "timestamp": now.to_rfc3339(), "event": event, "detail": detail })
        );
    } else {
        println!("{} {:<12} {}", now.format("%H:%M:%S%.3f"), event, detail);
    }
}

async fn watch(client: &CommandStationClient, as_json: bool) {
    let _on_push = client.on_push(move |message| emit(as_json, "push", message));
    let _on_connected = client.on_connected(move || emit(as_json, "connected", ""));
    let _on_disconnected = client.on_disconnected(move |cause: &DisconnectCause| {
        emit(as_json, "disconnected", &cause.to_string())
    });

    emit(as_json, "state", &client.connection_state().to_string());
    shutdown_signal().await;
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received, shutting down");
}
