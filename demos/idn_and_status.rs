use anyhow::Result;
use keithley2220_control::instrument::{Channel, Keithley2220};
use keithley2220_control::transport::usbtmc::DEFAULT_TIMEOUT;
use keithley2220_control::transport::UsbTmc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut inst = Keithley2220::<UsbTmc>::connect(0x05e6, 0x2220, DEFAULT_TIMEOUT).await?;

    let idn = inst.idn().await?;
    println!("IDN: {}", idn.trim());

    let setpoints = inst.read_settings().await?;
    let measurements = inst.read_measurements().await?;
    for channel in Channel::ALL {
        let set = setpoints.channel(channel);
        let meas = measurements.channel(channel);
        println!("{}:", channel.label());
        println!("  Set      : {:.3} V / {:.3} A", set.voltage_v, set.current_a);
        println!(
            "  Measured : {:.3} V / {:.3} A / {:.3} W",
            meas.voltage_v, meas.current_a, meas.power_w
        );
    }

    let output_on = inst.read_output_enabled().await?;
    println!("Output   : {}", if output_on { "ON" } else { "OFF" });

    inst.close().await?;
    Ok(())
}
