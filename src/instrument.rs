use crate::error::ProtocolError;
use crate::transport::{Transport, UsbTmc};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Ch1,
    Ch2,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Ch1, Channel::Ch2];

    pub fn number(self) -> u8 {
        match self {
            Channel::Ch1 => 1,
            Channel::Ch2 => 2,
        }
    }

    /// Position of this channel in the comma-separated `ALL` replies.
    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Ch1 => "CH1",
            Channel::Ch2 => "CH2",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum OutputState {
    On,
    Off,
    #[default]
    Keep,
}

impl OutputState {
    fn as_scpi(self) -> Option<&'static str> {
        match self {
            OutputState::On => Some("OUTPut 1"),
            OutputState::Off => Some("OUTPut 0"),
            OutputState::Keep => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelReading {
    pub voltage_v: f64,
    pub current_a: f64,
    pub power_w: f64,
}

/// Measured values for both channels, indexed by [`Channel::index`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurements {
    pub channels: [ChannelReading; 2],
}

impl Measurements {
    pub fn channel(&self, channel: Channel) -> &ChannelReading {
        &self.channels[channel.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelSetpoint {
    pub voltage_v: f64,
    pub current_a: f64,
}

/// Configured targets for both channels, as opposed to measured values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Setpoints {
    pub channels: [ChannelSetpoint; 2],
}

impl Setpoints {
    pub fn channel(&self, channel: Channel) -> &ChannelSetpoint {
        &self.channels[channel.index()]
    }
}

/// One monitor tick: three `MEAS` queries plus `OUTPUT?`, issued back to back.
/// The device does not guarantee the four replies describe the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub measurements: Measurements,
    pub output_enabled: bool,
}

/// Session with a Keithley 2220-30-1 dual-channel supply.
///
/// Channel selection (`INST:NSEL`/`INST:SEL`) is state on the device, so it is
/// never exposed: every channel-scoped operation selects its channel right
/// before the command that depends on it.
pub struct Keithley2220<T: Transport = UsbTmc> {
    inner: T,
    remote: bool,
}

impl Keithley2220<UsbTmc> {
    pub async fn connect(vendor_id: u16, product_id: u16, timeout: Duration) -> Result<Self> {
        let inner = UsbTmc::open(vendor_id, product_id, timeout)?;
        Ok(Self::new(inner))
    }
}

impl<T: Transport> Keithley2220<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            remote: false,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Close the session, handing the front panel back first if the session
    /// had taken it. Taking `self` guarantees the transport is closed once.
    pub async fn close(mut self) -> Result<()> {
        let local = if self.remote {
            self.return_to_local().await
        } else {
            Ok(())
        };
        self.inner.close().await?;
        local
    }

    pub async fn idn(&mut self) -> Result<String> {
        self.query("*IDN?").await
    }

    /// Lock the front panel for programmatic control.
    pub async fn enter_remote(&mut self) -> Result<()> {
        if self.remote {
            return Ok(());
        }
        info!("entering remote control");
        self.write("SYSTEM:REMOTE").await?;
        self.remote = true;
        Ok(())
    }

    pub async fn return_to_local(&mut self) -> Result<()> {
        info!("returning to local control");
        self.write("SYSTem:LOCal").await?;
        self.remote = false;
        Ok(())
    }

    /// Wait for pending operations (`*OPC`).
    pub async fn sync(&mut self) -> Result<()> {
        self.write("*OPC").await
    }

    /// Enable the output and program `volts` on `channel`. The value is sent
    /// as-is; range checks belong to the caller (see [`crate::validate`]).
    pub async fn set_voltage(&mut self, channel: Channel, volts: f64) -> Result<()> {
        self.write("OUTPut 1").await?;
        self.select_numbered(channel).await?;
        self.write(&format!("VOLT {volts}")).await
    }

    /// Enable the output and program `milliamps` on `channel`.
    pub async fn set_current(&mut self, channel: Channel, milliamps: f64) -> Result<()> {
        self.write("OUTPut 1").await?;
        self.select_numbered(channel).await?;
        self.write(&format!("CURRENT {milliamps}mA")).await
    }

    pub async fn set_output(&mut self, state: OutputState) -> Result<()> {
        match state.as_scpi() {
            Some(command) => self.write(command).await,
            None => Ok(()),
        }
    }

    /// Flip the output state and return the new one.
    pub async fn toggle_output(&mut self) -> Result<bool> {
        let enabled = !self.read_output_enabled().await?;
        let state = if enabled {
            OutputState::On
        } else {
            OutputState::Off
        };
        self.set_output(state).await?;
        Ok(enabled)
    }

    pub async fn read_output_enabled(&mut self) -> Result<bool> {
        let resp = self.query("OUTPUT?").await?;
        Ok(resp == "1")
    }

    /// Read the programmed voltage and current of both channels.
    ///
    /// A session that is not already remote only holds the front panel for
    /// the duration of the two channel reads.
    pub async fn read_settings(&mut self) -> Result<Setpoints> {
        let bracket = !self.remote;
        if bracket {
            self.enter_remote().await?;
        }

        let mut setpoints = Setpoints::default();
        for channel in Channel::ALL {
            self.select_named(channel).await?;
            let voltage_v = parse_f64("VOLT?", &self.query("VOLT?").await?)?;
            let current_a = parse_f64("CURR?", &self.query("CURR?").await?)?;
            setpoints.channels[channel.index()] = ChannelSetpoint {
                voltage_v,
                current_a,
            };
        }

        if bracket {
            self.return_to_local().await?;
        }
        Ok(setpoints)
    }

    pub async fn read_measurements(&mut self) -> Result<Measurements> {
        let voltage = self.query_pair("MEAS:VOLT:DC? ALL").await?;
        let current = self.query_pair("MEAS:CURRENT:DC? ALL").await?;
        let power = self.query_pair("MEAS:POW? ALL").await?;

        let mut measurements = Measurements::default();
        for channel in Channel::ALL {
            let i = channel.index();
            measurements.channels[i] = ChannelReading {
                voltage_v: voltage[i],
                current_a: current[i],
                power_w: power[i],
            };
        }
        Ok(measurements)
    }

    pub async fn sample(&mut self) -> Result<Sample> {
        Ok(Sample {
            measurements: self.read_measurements().await?,
            output_enabled: self.read_output_enabled().await?,
        })
    }

    /// Send a command verbatim; commands containing `?` are queries and
    /// their reply is returned.
    pub async fn send_raw(&mut self, command: &str) -> Result<Option<String>> {
        if command.contains('?') {
            Ok(Some(self.query(command).await?))
        } else {
            self.write(command).await?;
            Ok(None)
        }
    }

    async fn select_numbered(&mut self, channel: Channel) -> Result<()> {
        self.write(&format!("INST:NSEL {}", channel.number())).await
    }

    async fn select_named(&mut self, channel: Channel) -> Result<()> {
        self.write(&format!("INST:SEL {}", channel.label())).await
    }

    async fn query_pair(&mut self, command: &str) -> Result<[f64; 2]> {
        let resp = self.query(command).await?;
        Ok(parse_pair(command, &resp)?)
    }

    async fn write(&mut self, command: &str) -> Result<()> {
        debug!("SCPI write  -> {command}");
        self.inner
            .write(command)
            .await
            .with_context(|| format!("failed to send {command:?}"))
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        debug!("SCPI query  -> {command}");
        let resp = self
            .inner
            .ask(command)
            .await
            .with_context(|| format!("query {command:?} failed"))?;
        debug!("SCPI result <- {resp}");

        if resp.is_empty() {
            return Err(ProtocolError::EmptyResponse {
                command: command.to_string(),
            }
            .into());
        }
        Ok(resp)
    }
}

fn parse_f64(command: &str, field: &str) -> Result<f64, ProtocolError> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| ProtocolError::InvalidNumber {
            command: command.to_string(),
            field: field.to_string(),
        })
}

/// Parse a `ch1,ch2` reply into exactly two numbers.
fn parse_pair(command: &str, reply: &str) -> Result<[f64; 2], ProtocolError> {
    let fields: Vec<&str> = reply.trim().split(',').collect();
    match fields.as_slice() {
        [first, second] => Ok([parse_f64(command, first)?, parse_f64(command, second)?]),
        _ => Err(ProtocolError::FieldCount {
            command: command.to_string(),
            expected: 2,
            found: fields.len(),
            reply: reply.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_parses_both_channels() {
        assert_eq!(
            parse_pair("MEAS:VOLT:DC? ALL", "1.000,2.000").unwrap(),
            [1.0, 2.0]
        );
        assert_eq!(
            parse_pair("MEAS:POW? ALL", " 0.125 , 3.5\n").unwrap(),
            [0.125, 3.5]
        );
    }

    #[test]
    fn pair_requires_exactly_two_fields() {
        let err = parse_pair("MEAS:VOLT:DC? ALL", "1.000").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FieldCount {
                command: "MEAS:VOLT:DC? ALL".to_string(),
                expected: 2,
                found: 1,
                reply: "1.000".to_string(),
            }
        );
        assert!(matches!(
            parse_pair("MEAS:VOLT:DC? ALL", "1,2,3"),
            Err(ProtocolError::FieldCount { found: 3, .. })
        ));
    }

    #[test]
    fn pair_rejects_non_numeric_fields() {
        assert!(matches!(
            parse_pair("MEAS:CURRENT:DC? ALL", "1.0,abc"),
            Err(ProtocolError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn channel_indices_follow_reply_order() {
        assert_eq!(Channel::Ch1.index(), 0);
        assert_eq!(Channel::Ch2.index(), 1);
        assert_eq!(Channel::Ch2.label(), "CH2");
    }
}
