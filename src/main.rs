//! piwaverf - LightwaveRF hub and one-shot sender
//!
//! `piwaverf hub` serves the LightwaveRF link protocol on UDP; `piwaverf send`
//! transmits a single command.

use std::net::IpAddr;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use piwaverf::{
    Command, DryRunTransmitter, Hub, HubConfig, LogicalAddress, RadioPacket, Result,
    Transmitter, TransmitterId,
};

const DEFAULT_TRANSMITTER_ID: &str = "f1234";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Control LightwaveRF lights from a Raspberry Pi
#[derive(Parser)]
#[command(name = "piwaverf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG when given
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RadioArgs {
    /// The ID of the transmitter, five hex characters
    #[arg(short, long, default_value = DEFAULT_TRANSMITTER_ID)]
    transmitter: TransmitterId,

    /// GPIO pin driving the transmitter
    #[arg(long, default_value_t = piwaverf::core::DEFAULT_GPIO_PIN)]
    gpio: u8,

    /// Times each packet is repeated
    #[arg(long, default_value_t = piwaverf::core::DEFAULT_REPEAT)]
    repeat: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the LightwaveRF link protocol
    Hub {
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Port commands arrive on
        #[arg(short = 'P', long, default_value_t = piwaverf::core::DEFAULT_PORT)]
        port: u16,

        /// Port replies are sent to
        #[arg(long, default_value_t = piwaverf::core::DEFAULT_REPLY_PORT)]
        reply_port: u16,

        /// MAC identity reported in status notifications
        #[arg(long, default_value = piwaverf::core::DEFAULT_MAC)]
        mac: String,

        #[command(flatten)]
        radio: RadioArgs,
    },

    /// Send one command to a device
    Send {
        /// The action to take on the device
        action: Action,

        /// The ID of the room (1-8)
        #[arg(short, long, default_value_t = 1)]
        room: u8,

        /// The unit number (1-15)
        #[arg(short = 'u', long = "unit", default_value_t = 1)]
        device: u8,

        /// Dim level (0-31), only used with `dim`
        #[arg(short = 'L', long, default_value_t = 0)]
        level: u8,

        #[command(flatten)]
        radio: RadioArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Action {
    On,
    Off,
    Dim,
}

impl From<Action> for Command {
    fn from(action: Action) -> Self {
        match action {
            Action::On => Command::On,
            Action::Off => Command::Off,
            Action::Dim => Command::Dim,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match log_filter(cli.log_level.as_deref()) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("invalid log level: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let outcome = match cli.command {
        Commands::Hub {
            bind,
            port,
            reply_port,
            mac,
            radio,
        } => {
            let mut config = HubConfig::new(radio.transmitter);
            config.bind_addr = bind;
            config.port = port;
            config.reply_port = reply_port;
            config.mac = mac;
            config.gpio_pin = radio.gpio;
            config.repeat = radio.repeat;
            run_hub(config).await
        }
        Commands::Send {
            action,
            room,
            device,
            level,
            radio,
        } => send_once(action.into(), room, device, level, radio).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// An explicit level wins over RUST_LOG; with neither, logs at info
fn log_filter(level: Option<&str>) -> std::result::Result<EnvFilter, ParseError> {
    match level {
        Some(level) => EnvFilter::try_new(level),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))),
    }
}

async fn run_hub(config: HubConfig) -> Result<()> {
    let transmitter = DryRunTransmitter::new(config.gpio_pin, config.settle_delay);
    let mut hub = Hub::new(config, transmitter)?;
    hub.bind().await?;

    let handle = hub.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            handle.shutdown();
        }
    });

    hub.run().await
}

async fn send_once(
    command: Command,
    room: u8,
    device: u8,
    level: u8,
    radio: RadioArgs,
) -> Result<()> {
    let address = LogicalAddress::new(room, device)?;
    let packet = RadioPacket::build(&radio.transmitter, address, command, level)?;

    let mut transmitter =
        DryRunTransmitter::new(radio.gpio, piwaverf::core::DEFAULT_SETTLE_DELAY);
    let sent = transmitter.transmit(&packet, radio.repeat).await;
    transmitter.shutdown().await?;
    sent?;

    info!(%command, room, device, packet = %packet, "sent");
    Ok(())
}
