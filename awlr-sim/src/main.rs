use std::path::PathBuf;

use awlr_core::ScenarioTable;
use awlr_sim::{
    BackendClient, Config, ConnectError, ConnectionManager, MockTransport, MqttTransport,
    Simulator, Transport, TransportKind, run_command_loop, run_listener, spawn_line_reader,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "awlr-sim")]
#[command(about = "AWLR water-level station MQTT simulator")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "awlr-sim.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Interactive menu that publishes simulated readings (default)
    Simulate,
    /// Print every message published under the device topics
    Listen {
        /// Forward each message to the configured backend functions
        #[arg(long)]
        forward: bool,
    },
    /// Print the scenario table
    Scenarios,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    config.apply_env()?;

    let default_filter = if config.simulator.debug {
        "awlr_sim=debug,awlr_core=debug"
    } else {
        "awlr_sim=info,awlr_core=info"
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_owned());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.config.exists() {
        info!(path = ?cli.config, "Loaded configuration");
    } else {
        info!("No configuration file found, using defaults");
    }

    let command = cli.command.unwrap_or(Command::Simulate);
    if let Command::Scenarios = command {
        print_scenarios(&ScenarioTable::builtin());
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            cancel_on_signal.cancel();
        }
    });

    match config.broker.transport {
        TransportKind::Mqtt => {
            let transport = MqttTransport::new(&config.broker);
            run(config, transport, command, cancel).await
        }
        TransportKind::Mock => {
            info!("Using mock transport, nothing leaves this process");
            run(config, MockTransport::accepting(), command, cancel).await
        }
    }
}

async fn run<T: Transport>(
    config: Config,
    transport: T,
    command: Command,
    cancel: CancellationToken,
) -> color_eyre::Result<()> {
    match command {
        Command::Simulate => simulate(config, transport, cancel).await,
        Command::Listen { forward } => listen(config, transport, forward, cancel).await,
        Command::Scenarios => Ok(()),
    }
}

async fn simulate<T: Transport>(
    config: Config,
    transport: T,
    cancel: CancellationToken,
) -> color_eyre::Result<()> {
    let mut sim = Simulator::from_config(&config, transport, StdRng::from_os_rng())?;

    println!("{}", "=".repeat(60));
    println!("AWLR MQTT DUMMY SENSOR");
    println!("{}", "=".repeat(60));
    println!("Broker: {}", sim.connection().endpoint());
    println!("Devices: {}", sim.registry().len());
    println!("Debug: {}", if config.simulator.debug { "ON" } else { "OFF" });
    println!("{}", "=".repeat(60));

    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        result = sim.connect() => Some(result),
    };
    match connected {
        None => {
            sim.shutdown().await;
            return Ok(());
        }
        Some(Err(e)) => {
            sim.shutdown().await;
            print_connect_hints(&e);
            return Ok(());
        }
        Some(Ok(())) => {}
    }

    let stdin = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
    let mut stdout = std::io::stdout();
    let result = run_command_loop(&mut sim, stdin, &mut stdout, cancel).await;

    sim.shutdown().await;
    let exit = result?;
    info!(?exit, "Simulator stopped");
    Ok(())
}

async fn listen<T: Transport>(
    config: Config,
    transport: T,
    forward: bool,
    cancel: CancellationToken,
) -> color_eyre::Result<()> {
    let backend = match (forward, config.backend.clone()) {
        (false, _) => None,
        (true, Some(backend)) => Some(BackendClient::new(backend)),
        (true, None) => {
            return Err(eyre!(
                "--forward needs a [backend] section or BACKEND_URL to be set"
            ));
        }
    };

    let mut connection = ConnectionManager::new(transport, config.broker.ack_wait());
    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        result = connection.connect() => Some(result),
    };
    match connected {
        None => {
            connection.disconnect().await;
            return Ok(());
        }
        Some(Err(e)) => {
            connection.disconnect().await;
            print_connect_hints(&e);
            return Ok(());
        }
        Some(Ok(())) => {}
    }

    let result = run_listener(&mut connection, backend.as_ref(), cancel).await;
    connection.disconnect().await;
    result?;
    Ok(())
}

fn print_connect_hints(error: &ConnectError) {
    println!("\n[ERROR] Could not connect to MQTT broker: {error}");
    println!("Please check:");
    println!("  1. Internet connection");
    println!("  2. Broker address and port (MQTT_BROKER, MQTT_PORT)");
    println!("  3. Username and password (MQTT_USERNAME, MQTT_PASSWORD)");
    if let ConnectError::Refused { code } = error {
        println!("  Broker reason code: {code}");
    }
}

fn print_scenarios(table: &ScenarioTable) {
    for scenario in table.iter() {
        println!("{} - {}", scenario.name, scenario.description);
        println!(
            "   water level: {:.2}..={:.2} cm | rainfall: {:.1}..={:.1} mm | battery: {}..={}%",
            scenario.water_level.min,
            scenario.water_level.max,
            scenario.rainfall.min,
            scenario.rainfall.max,
            scenario.battery.min,
            scenario.battery.max,
        );
    }
}
