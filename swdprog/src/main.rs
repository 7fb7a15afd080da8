// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdprog - reflash an ARM Cortex-M target over bit-banged SWD
//!
//! ```text
//! swdprog --chip 0 --swdio 24 --swclk 25 idcode
//! swdprog --chip /dev/gpiochip0 --swdio 24 --swclk 25 --speed slow flash firmware.bin
//! swdprog --chip 0 --swdio 24 --swclk 25 read 0x0 256 -o dump.bin
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdprog_core::arm::Cortex;
use swdprog_core::stm::FLASH_BASE;
use swdprog_gpio::{LinuxGpioChannel, LinuxGpioConfig, LinuxGpioError, Speed};
use swdprog_swd::recipe::flash_image;
use swdprog_swd::{DebugInterface, FlashError, FlashOptions, SwdError};

#[derive(Debug, Parser)]
#[command(name = "swdprog", version, about, long_about = None)]
struct Cli {
    /// GPIO chip, as a path (/dev/gpiochip0) or a number (0)
    #[arg(long)]
    chip: String,

    /// GPIO line connected to the target's SWDIO
    #[arg(long)]
    swdio: u32,

    /// GPIO line connected to the target's SWCLK
    #[arg(long)]
    swclk: u32,

    /// Approximate SWD clock speed
    #[arg(long, value_enum, default_value_t = CliSpeed::Medium)]
    speed: CliSpeed,

    /// Approximate SWD clock in kHz, overriding --speed
    #[arg(long)]
    khz: Option<u32>,

    /// More logging: -v for debug, -vv for trace.  RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect and print the target's IDCODE and MEM-AP IDR
    Idcode,

    /// Halt the core
    Halt,

    /// Resume the core, leaving debug enabled
    Resume,

    /// Restore the debug registers and reset the target
    Reset,

    /// Read flash and hex dump it, or save it to a file
    Read {
        /// Offset into flash (decimal or 0x hex)
        #[arg(value_parser = parse_number)]
        offset: u32,

        /// Number of bytes (decimal or 0x hex)
        #[arg(value_parser = parse_number)]
        len: u32,

        /// Write the bytes to this file instead of dumping them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Erase all of flash
    Erase,

    /// Erase flash, program an image at offset 0, verify it and restart
    Flash {
        /// Raw binary image
        image: PathBuf,

        /// Lock the flash controller after verifying
        #[arg(long)]
        lock: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliSpeed {
    Slow,
    Medium,
    Fast,
    Turbo,
}

impl From<CliSpeed> for Speed {
    fn from(value: CliSpeed) -> Self {
        match value {
            CliSpeed::Slow => Speed::Slow,
            CliSpeed::Medium => Speed::Medium,
            CliSpeed::Fast => Speed::Fast,
            CliSpeed::Turbo => Speed::Turbo,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Gpio(#[from] LinuxGpioError),

    #[error(transparent)]
    Swd(#[from] SwdError),

    #[error(transparent)]
    Flash(#[from] FlashError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn parse_number(s: &str) -> Result<u32, String> {
    let result = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    result.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn open(cli: &Cli) -> Result<DebugInterface<LinuxGpioChannel>, CliError> {
    let mut config =
        LinuxGpioConfig::new(cli.chip.as_str(), cli.swdio, cli.swclk).with_speed(cli.speed.into());
    if let Some(khz) = cli.khz {
        config = config.with_speed_khz(khz);
    }

    let channel = LinuxGpioChannel::open(&config)?;
    Ok(DebugInterface::from_channel(channel))
}

fn hex_dump(base: u32, data: &[u8]) -> Vec<String> {
    data.chunks(16)
        .enumerate()
        .map(|(ii, line)| {
            let bytes: Vec<String> = line.iter().map(|b| format!("{b:02X}")).collect();
            format!("0x{:08X}: {}", base.wrapping_add((ii * 16) as u32), bytes.join(" "))
        })
        .collect()
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let mut debug = open(cli)?;

    // The flash recipe connects for itself
    if let Command::Flash { image, lock } = &cli.command {
        let data = fs::read(image).map_err(|source| CliError::Io {
            path: image.clone(),
            source,
        })?;
        let options = FlashOptions { lock_after: *lock };
        flash_image(&mut debug, &data, &options)?;
        println!("Flashed {} bytes from {}", data.len(), image.display());
        return Ok(());
    }

    let idcode = debug.initialize()?;

    match &cli.command {
        Command::Idcode => {
            let idr = debug.swd_if().read_ap_idr()?;
            let core = Cortex::from_idcode(idcode).map_or("unknown core", |c| c.as_str());
            println!("IDCODE: {idcode} ({core})");
            println!("AP IDR: {idr}");
        }
        Command::Halt => {
            debug.halt()?;
            println!("Core halted");
        }
        Command::Resume => {
            debug.resume()?;
            println!("Core running");
        }
        Command::Reset => {
            debug.reset_registers()?;
            println!("Target reset");
        }
        Command::Read {
            offset,
            len,
            output,
        } => {
            let mut data = debug.read(*offset, *len as usize)?;
            data.truncate(*len as usize);
            match output {
                Some(path) => {
                    fs::write(path, &data).map_err(|source| CliError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    println!("Read {} bytes to {}", data.len(), path.display());
                }
                None => {
                    for line in hex_dump(FLASH_BASE.wrapping_add(*offset), &data) {
                        println!("{line}");
                    }
                }
            }
        }
        Command::Erase => {
            debug.halt()?;
            debug.unlock_flash()?;
            debug.erase_all()?;
            debug.lock_flash()?;
            debug.resume()?;
            println!("Flash erased");
        }
        Command::Flash { .. } => (),
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
