use std::sync::Arc;
use clap::{Parser, Subcommand};
use log::info;
use tokio::runtime::Builder;

use crate::config::io::ConfigIO;
use crate::device::transport::{open_transport, Transport};
use crate::device::types::TransportKind;
use crate::error::AppRunError;
use crate::remote::{AlertKind, Remote};

#[derive(Parser, Debug)]
#[command(name = "robot-remote", version, about = "Scan for, connect to and send text commands to a bluetooth robot")]
pub struct Args {
    /// Bluetooth transport to use, overrides the config file
    #[arg(long, value_enum)]
    pub transport: Option<TransportKind>,

    /// Log debug messages
    #[arg(short, long)]
    pub verbose: bool,

    /// Run without a window
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Print the id and name of every device that a scan finds
    Scan,

    /// Connect to a device, send one message and disconnect
    Send {
        /// Device id as printed by the scan command
        #[arg(long)]
        device: String,

        /// The message; multiple words are joined by spaces
        #[arg(required = true)]
        message: Vec<String>,
    },
}

// Prints and clears the pending alerts. The first error alert fails the command.
fn drain_alerts(remote: &mut Remote) -> Result<(), AppRunError> {
    let mut first_error: Option<String> = None;

    while let Some(alert) = remote.current_alert().cloned() {
        remote.dismiss_alert();

        match alert.kind {
            AlertKind::Notice => eprintln!("{} {}", alert.title(), alert.message),
            AlertKind::Error => {
                eprintln!("{}: {}", alert.title(), alert.message);
                first_error.get_or_insert(alert.message);
            },
        }
    }

    match first_error {
        None => Ok(()),
        Some(message) => Err(AppRunError::Alert { message }),
    }
}

pub async fn run_command(command: CliCommand, transport: &dyn Transport) -> Result<(), AppRunError> {
    let mut remote = Remote::new();

    remote.enable(transport).await;
    drain_alerts(&mut remote)?;

    remote.scan(transport).await;
    drain_alerts(&mut remote)?;

    match command {
        CliCommand::Scan => {
            for device in remote.devices().iter() {
                println!("{}\t{}", device.id, device.name);
            }
        },
        CliCommand::Send { device, message } => {
            let device = remote.devices().get(&device).cloned()
                .ok_or(AppRunError::UnknownDevice { id: device })?;

            remote.connect(transport, device).await;
            drain_alerts(&mut remote)?;

            remote.send(transport, &message.join(" ")).await;
            let sent = drain_alerts(&mut remote);

            // disconnect even if sending failed
            remote.disconnect(transport).await;
            sent?;
            drain_alerts(&mut remote)?;
            info!("Message sent");
        },
    }

    Ok(())
}

pub fn run_cli(command: CliCommand, transport_override: Option<TransportKind>) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync()?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| AppRunError::Runtime { source })?;

    runtime.block_on(async move {
        let config = config_io.read().await?;
        let kind = transport_override.unwrap_or(config.transport);
        let transport: Arc<dyn Transport> = open_transport(kind, &config)?;
        info!("Using transport {}", kind);

        run_command(command, transport.as_ref()).await
    })
}
