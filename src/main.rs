use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use log::info;
use tokio::io::{AsyncBufRead, BufReader};

mod config;
mod encoder;
mod messages;
mod monitor;
mod mqtt;
mod reader;
mod relay;
mod rfid;
mod sampler;
mod tracker;

#[derive(Parser, Debug)]
#[command(version, about = "Key box presence monitor")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the reader and send arrivals and departures to the collector
    Monitor {
        /// Stop after this many presence cycles
        #[arg(long)]
        cycles: Option<u64>,
        /// Replay script to read tags from, overriding `reader.script`
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Forward records from the collector link to the MQTT broker
    Relay {
        /// Read records from this device or file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let config = config::AppConfig::load(&cli.config)?;

    match cli.command {
        Command::Monitor { cycles, script } => run_monitor(&config, cycles, script).await,
        Command::Relay { input } => run_relay(&config, input).await,
    }
}

fn open_transport(path: Option<&Path>) -> anyhow::Result<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening transport {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

async fn run_monitor(
    config: &config::AppConfig,
    cycles: Option<u64>,
    script: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut reader_config = config.reader.clone().unwrap_or_default();
    if let Some(script) = script {
        reader_config.kind = Some(config::ReaderKind::Replay);
        reader_config.script = Some(script);
    }

    let reader: Box<dyn reader::Reader> = match reader_config.kind() {
        config::ReaderKind::Mfrc522 => {
            Box::new(rfid::open(&reader_config).context("opening MFRC522 reader")?)
        }
        config::ReaderKind::Replay => {
            let Some(script) = reader_config.script.as_deref() else {
                bail!("replay reader needs reader.script or --script");
            };
            Box::new(reader::ReplayReader::from_file(
                script,
                reader_config.repeat.unwrap_or(false),
            )?)
        }
    };

    let transport_path = config.transport.as_ref().and_then(|t| t.path.as_deref());
    let sink = encoder::EventSink::new(open_transport(transport_path)?, io::stderr());

    info!("Key box monitor started for room {}", config.room.id);

    monitor::Monitor::new(config.room.id.clone(), config.poll_interval(), reader, sink)
        .run(cycles)
        .await;

    Ok(())
}

async fn run_relay(config: &config::AppConfig, input: Option<PathBuf>) -> anyhow::Result<()> {
    let Some(mqtt_config) = config.mqtt.as_ref() else {
        bail!("relay needs an [mqtt] section in the config");
    };

    let (mqtt_client, mut eventloop) = mqtt::MqttClient::new(mqtt_config);
    tokio::task::spawn(async move {
        mqtt::MqttClient::event_loop(&mut eventloop).await;
    });

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("opening relay input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    info!("Relaying records to {}", mqtt_config.host);
    relay::run(input, &mqtt_client).await?;

    mqtt_client.disconnect().await?;
    Ok(())
}
