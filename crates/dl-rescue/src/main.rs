use std::{
    io::{Write, stdout},
    path::PathBuf,
    thread::sleep,
    time::Duration,
};

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use colored::Colorize;
use derive_more::IsVariant;
use dl_brom::{BromSession, handshake::HandshakeOpts};
use dl_port::{DeviceHandle, config};
use serialport::{SerialPortInfo, SerialPortType, available_ports};

use crate::{err::Error, loader::FileLoaderSource};

mod err;
mod flows;
mod loader;
mod logging;

type Result<T> = core::result::Result<T, Error>;

const MTK_VID: u16 = 0x0E8D;
const BROM_PID: u16 = 0x0003;
const PRELOADER_PID: u16 = 0x2000;

#[derive(Clone, Subcommand)]
enum Command {
    /// Identify the connected device and print its security state
    Identify,

    /// Boot the DA stages from an archive
    BootDa {
        /// DA archive path
        #[arg(short, long)]
        da: PathBuf,

        /// Use the DA1-driven negotiated DA2 download instead of BOOT_TO
        #[arg(long)]
        negotiated: bool,
    },

    /// Print the device partition table
    Gpt {
        #[arg(short, long)]
        da: PathBuf,
    },

    /// Read a partition into a file
    ReadPart {
        #[arg(short, long)]
        da: PathBuf,

        partition: String,
        output: PathBuf,

        /// Byte count; partition size when omitted
        #[arg(long, value_parser=maybe_hex::<u64>)]
        size: Option<u64>,
    },

    /// Write a file into a partition
    WritePart {
        #[arg(short, long)]
        da: PathBuf,

        partition: String,
        input: PathBuf,
    },

    /// Erase a partition
    ErasePart {
        #[arg(short, long)]
        da: PathBuf,

        partition: String,
    },

    /// Reboot the device out of download mode
    Reboot {
        #[arg(short, long)]
        da: PathBuf,
    },

    /// Power the device down
    Shutdown {
        #[arg(short, long)]
        da: PathBuf,
    },

    /// Query vendor information from a device in fastboot mode
    VendorInfo {
        /// Serial port of the fastboot device
        port: String,
    },
}

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Copy, Clone, IsVariant)]
enum DeviceMode {
    Brom,
    Preloader,
}

fn get_ports() -> Result<Vec<(DeviceMode, SerialPortInfo)>> {
    Ok(available_ports()?
        .into_iter()
        .filter_map(|s| match &s.port_type {
            SerialPortType::UsbPort(p) => {
                let is_target = p.pid == PRELOADER_PID || p.pid == BROM_PID;
                if p.vid == MTK_VID && is_target {
                    Some((
                        if p.pid == BROM_PID {
                            DeviceMode::Brom
                        } else {
                            DeviceMode::Preloader
                        },
                        s,
                    ))
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect())
}

fn open_port() -> Result<(DeviceMode, String)> {
    log!("Waiting for the device");
    let (mode, port) = loop {
        let ports = get_ports()?;

        if ports.len() > 1 {
            return Err(Error::MoreThanOneDevice);
        } else if ports.is_empty() {
            log!(".");
        } else {
            println!();
            break ports[0].clone();
        }

        sleep(Duration::from_millis(500));
    };

    println!("Found device at {}", &port.port_name);
    Ok((mode, port.port_name))
}

fn print_identity(session: &BromSession, device_mode: DeviceMode) -> Result<()> {
    println!(
        "Chip: {} (hw_code {:#06x}, hw_ver {:#06x}, sw_ver {:#06x})",
        session.chip().map_or("unknown", |c| c.chip_name),
        session.hw_code(),
        session.hw_ver(),
        session.sw_ver(),
    );
    println!(
        "Mode: {}",
        if device_mode.is_brom() { "BROM" } else { "preloader" }
    );

    if !session.me_id().is_empty() {
        let me_id: String = session.me_id().iter().map(|b| format!("{b:02x}")).collect();
        println!("ME ID: {me_id}");
    }
    if !session.soc_id().is_empty() {
        let soc_id: String = session.soc_id().iter().map(|b| format!("{b:02x}")).collect();
        println!("SoC ID: {soc_id}");
    }

    let config = session.target_config();
    y_n!("SBC enabled", config.sbc());
    y_n!("SLA enabled", config.sla());
    y_n!("DAA enabled", config.daa());

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if let Command::VendorInfo { port } = &cli.command {
        return flows::vendor_info(port);
    }

    let (device_mode, port_name) = open_port()?;
    let handle = DeviceHandle::open(&port_name, config::MTK_BAUD)?;
    let mut session = BromSession::new(handle.clone());

    log!("Handshaking...");
    status!(session.connect(&HandshakeOpts::default()))?;
    log!("Identifying...");
    status!(session.initialize())?;
    print_identity(&session, device_mode)?;

    log!("Disabling watchdog...");
    status!(session.disable_watchdog())?;

    let da = match &cli.command {
        Command::Identify => return Ok(()),
        Command::BootDa { da, .. }
        | Command::Gpt { da }
        | Command::ReadPart { da, .. }
        | Command::WritePart { da, .. }
        | Command::ErasePart { da, .. }
        | Command::Reboot { da }
        | Command::Shutdown { da } => da.clone(),
        Command::VendorInfo { .. } => unreachable!(),
    };

    let source = FileLoaderSource::new(da);
    let negotiated = matches!(&cli.command, Command::BootDa { negotiated: true, .. });
    let client = flows::boot_da(&mut session, &handle, &source, negotiated, None)?;

    match cli.command {
        Command::BootDa { .. } => println!("DA is up and running"),
        Command::Gpt { .. } => flows::print_gpt(&client)?,
        Command::ReadPart {
            partition,
            output,
            size,
            ..
        } => flows::read_partition(&client, &partition, size, &output)?,
        Command::WritePart {
            partition, input, ..
        } => flows::write_partition(&client, &partition, &input)?,
        Command::ErasePart { partition, .. } => {
            log!("Erasing {partition}...");
            status!(client.erase_partition(&partition))?;
        }
        Command::Reboot { .. } => {
            log!("Rebooting...");
            status!(client.reboot())?;
        }
        Command::Shutdown { .. } => {
            log!("Shutting down...");
            status!(client.shutdown())?;
        }
        Command::Identify | Command::VendorInfo { .. } => unreachable!(),
    }

    Ok(())
}

fn main() -> core::result::Result<(), String> {
    env_logger::init();
    let cli = Cli::parse();

    println!("For BROM mode hold the download key while connecting the device");
    println!("For preloader mode simply connect the device");
    run(cli).map_err(|e| e.to_string())
}
