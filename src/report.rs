//! Human-readable status text and tab-separated log rows.

use crate::instrument::{Channel, Measurements, Sample, Setpoints};
use std::fmt::Write;

/// Column names of the monitor log, one per field of [`log_row`].
pub const LOG_COLUMNS: [&str; 8] = [
    "Time",
    "CH1 Voltage (V)",
    "CH1 Current (A)",
    "CH1 Power (W)",
    "CH2 Voltage (V)",
    "CH2 Current (A)",
    "CH2 Power (W)",
    "Output enabled",
];

pub fn render_status(
    measurements: &Measurements,
    setpoints: Option<&Setpoints>,
    output_enabled: bool,
) -> String {
    let mut out = String::from("Device status:\n");
    for channel in Channel::ALL {
        let reading = measurements.channel(channel);
        // Writing into a String cannot fail.
        let _ = writeln!(out, "Channel {}:", channel.number());
        let _ = writeln!(out, "    Voltage = {:.3}V", reading.voltage_v);
        let _ = writeln!(out, "    Current = {:.3}A", reading.current_a);
        let _ = writeln!(out, "    Power   = {:.3}W", reading.power_w);
        if let Some(setpoints) = setpoints {
            let set = setpoints.channel(channel);
            let _ = writeln!(
                out,
                "    Set     = {:.3}V / {:.3}A",
                set.voltage_v, set.current_a
            );
        }
        out.push('\n');
    }
    out.push_str(if output_enabled {
        "Output is on\n"
    } else {
        "Output is off\n"
    });
    out
}

pub fn log_header() -> String {
    format!("{}\n", LOG_COLUMNS.join("\t"))
}

/// Console row: the seven measurement columns without the timestamp.
pub fn sample_row(sample: &Sample) -> String {
    let mut fields = Vec::with_capacity(LOG_COLUMNS.len() - 1);
    for channel in Channel::ALL {
        let reading = sample.measurements.channel(channel);
        fields.push(format!("{:.3}", reading.voltage_v));
        fields.push(format!("{:.3}", reading.current_a));
        fields.push(format!("{:.3}", reading.power_w));
    }
    fields.push(u8::from(sample.output_enabled).to_string());
    fields.join("\t")
}

/// Log-file row: Unix time with two decimals, then the console row.
pub fn log_row(unix_time: f64, sample: &Sample) -> String {
    format!("{unix_time:.2}\t{}\n", sample_row(sample))
}
