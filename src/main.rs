use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use keithley2220_control::instrument::{Channel, Keithley2220, OutputState};
use keithley2220_control::transport::{Transport, UsbTmc};
use keithley2220_control::{monitor, report, script, shutdown, validate};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Program a Keithley 2220-30-1 DC power supply
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Voltage setting for channel 1 in volts
    #[arg(long = "v1", alias = "voltage1", value_name = "VOLTS")]
    voltage1: Option<String>,

    /// Voltage setting for channel 2 in volts
    #[arg(long = "v2", alias = "voltage2", value_name = "VOLTS")]
    voltage2: Option<String>,

    /// Current setting for channel 1 in mA
    #[arg(long = "c1", alias = "current1", value_name = "MILLIAMPS")]
    current1: Option<String>,

    /// Current setting for channel 2 in mA
    #[arg(long = "c2", alias = "current2", value_name = "MILLIAMPS")]
    current2: Option<String>,

    /// Display measurements and exit without changing anything
    #[arg(short, long)]
    status: bool,

    /// Include the programmed setpoints in the status report printed after
    /// applying settings (reading them takes remote control briefly)
    #[arg(long, conflicts_with = "status")]
    settings: bool,

    /// Enable/disable output
    #[arg(short, long, value_enum, default_value_t = OutputState::Keep)]
    output: OutputState,

    /// Flip the output state
    #[arg(long, conflicts_with = "output")]
    toggle: bool,

    /// A SCPI macro file to run
    #[arg(short, long = "macro", value_name = "FILE")]
    macro_file: Option<PathBuf>,

    /// A single command to send to the device
    #[arg(short, long, value_name = "COMMAND")]
    line: Option<String>,

    /// USB vendor and product IDs (hex)
    #[arg(
        short,
        long,
        num_args = 2,
        value_names = ["VENDOR_ID", "PRODUCT_ID"],
        value_parser = parse_hex_id,
        default_values = ["05e6", "2220"]
    )]
    usb: Vec<u16>,

    /// Log measurements to FILE until interrupted
    #[arg(long, value_name = "FILE")]
    monitor: Option<PathBuf>,

    /// USB transfer timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Enable debug logging of SCPI traffic
    #[arg(long)]
    debug: bool,
}

fn parse_hex_id(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex USB ID {s:?}: {e}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let (vendor_id, product_id) = (cli.usb[0], cli.usb[1]);
    let mut inst = Keithley2220::<UsbTmc>::connect(
        vendor_id,
        product_id,
        Duration::from_millis(cli.timeout_ms),
    )
    .await
    .context("Unable to connect to device.")?;

    // The monitor handles Ctrl-C itself; every other mode is abandoned
    // mid-sequence and falls through to the close below.
    let outcome = shutdown::or_interrupt(run(&mut inst, &cli), shutdown::interrupted()).await;
    let closed = inst.close().await;
    outcome?;
    closed
}

async fn run<T: Transport>(inst: &mut Keithley2220<T>, cli: &Cli) -> Result<()> {
    println!("{}", inst.idn().await?);

    if cli.status {
        return print_status(inst, cli.settings).await;
    }

    if let Some(path) = &cli.monitor {
        monitor::record(inst, path).await?;
        return Ok(());
    }

    inst.enter_remote().await?;

    if let Some(path) = &cli.macro_file {
        println!("Macro specified");
        script::run_macro(inst, path).await?;
        return Ok(());
    }

    if let Some(command) = &cli.line {
        println!("{command}");
        if let Some(reply) = inst.send_raw(command).await? {
            println!("   {reply}");
        }
    }

    let voltages = [(Channel::Ch1, &cli.voltage1), (Channel::Ch2, &cli.voltage2)];
    for (channel, text) in voltages {
        if let Some(volts) = text.as_deref().and_then(validate::parse_voltage) {
            info!("setting {} voltage to {volts} V", channel.label());
            inst.set_voltage(channel, volts).await?;
        }
    }

    let currents = [(Channel::Ch1, &cli.current1), (Channel::Ch2, &cli.current2)];
    for (channel, text) in currents {
        if let Some(milliamps) = text.as_deref().and_then(validate::parse_current) {
            info!("setting {} current to {milliamps} mA", channel.label());
            inst.set_current(channel, milliamps).await?;
        }
    }

    if cli.toggle {
        let enabled = inst.toggle_output().await?;
        println!("Output {}", if enabled { "enabled" } else { "disabled" });
    } else {
        inst.set_output(cli.output).await?;
    }

    inst.sync().await?;
    print_status(inst, cli.settings).await
}

async fn print_status<T: Transport>(inst: &mut Keithley2220<T>, with_settings: bool) -> Result<()> {
    let measurements = inst.read_measurements().await?;
    let output_enabled = inst.read_output_enabled().await?;
    let setpoints = if with_settings {
        Some(inst.read_settings().await?)
    } else {
        None
    };
    println!(
        "{}",
        report::render_status(&measurements, setpoints.as_ref(), output_enabled)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn status_mode_cannot_read_setpoints() {
        assert!(Cli::try_parse_from(["keithley2220", "-s", "--settings"]).is_err());
        assert!(Cli::try_parse_from(["keithley2220", "--settings"]).is_ok());
    }

    #[test]
    fn usb_ids_default_and_parse_as_hex() {
        let cli = Cli::try_parse_from(["keithley2220", "-s"]).unwrap();
        assert_eq!(cli.usb, vec![0x05e6, 0x2220]);

        let cli = Cli::try_parse_from(["keithley2220", "-u", "0x1ab1", "0E11"]).unwrap();
        assert_eq!(cli.usb, vec![0x1ab1, 0x0e11]);
    }
}
