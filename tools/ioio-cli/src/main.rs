use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ioio::peripheral::DigitalOutputMode;
use ioio::{Ioio, PullMode, TcpTransport};

/// Diagnostic tool for an IOIO board reachable over TCP.
#[derive(Parser, Debug)]
#[command(name = "ioio-cli", version)]
struct Cli {
    /// Board address, host:port.
    #[arg(long, default_value = "192.168.0.5:4545")]
    addr: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the board's hardware/bootloader/firmware ids.
    Info,
    /// Blink a digital output.
    Blink {
        #[arg(long, default_value_t = 0)]
        pin: u8,
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Half-period in milliseconds.
        #[arg(long, default_value_t = 250)]
        period_ms: u64,
    },
    /// Stream an analog input to stdout.
    Analog {
        #[arg(long, default_value_t = 31)]
        pin: u8,
        #[arg(long, default_value_t = 10)]
        samples: u32,
    },
    /// Wait for a digital input to reach a level (high unless --low).
    Watch {
        #[arg(long)]
        pin: u8,
        #[arg(long)]
        low: bool,
    },
    /// Ask the board to drop all open modules.
    SoftReset,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let ioio = Ioio::new(Box::new(TcpTransport::new(cli.addr.clone())));
    ioio.wait_for_connect()
        .with_context(|| format!("connecting to {}", cli.addr))?;

    match cli.cmd {
        Cmd::Info => {
            let versions = ioio.versions()?;
            println!("hardware   {}", versions.hardware);
            println!("bootloader {}", versions.bootloader);
            println!("firmware   {}", versions.firmware);
        }
        Cmd::Blink {
            pin,
            count,
            period_ms,
        } => {
            let led = ioio.open_digital_output(pin, DigitalOutputMode::Normal, false)?;
            for _ in 0..count {
                led.write(true)?;
                thread::sleep(Duration::from_millis(period_ms));
                led.write(false)?;
                thread::sleep(Duration::from_millis(period_ms));
            }
            led.close()?;
        }
        Cmd::Analog { pin, samples } => {
            let input = ioio.open_analog_input(pin)?;
            for _ in 0..samples {
                println!("{:.3} V", input.voltage()?);
                thread::sleep(Duration::from_millis(100));
            }
        }
        Cmd::Watch { pin, low } => {
            let level = !low;
            let input = ioio.open_digital_input(pin, PullMode::Floating)?;
            log::info!("waiting for pin {pin} to go {level}");
            input.wait_for_value(level)?;
            println!("pin {pin} is {level}");
        }
        Cmd::SoftReset => {
            ioio.soft_reset()?;
            ioio.sync()?;
        }
    }

    ioio.disconnect();
    ioio.wait_for_disconnect();
    Ok(())
}
