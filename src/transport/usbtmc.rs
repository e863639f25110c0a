//! USB Test & Measurement Class transport.
//!
//! Only the subset needed for SCPI text exchange is implemented: device
//! dependent messages in both directions over the bulk endpoints. No
//! interrupt endpoint, no USB488 status byte, no abort/clear handshakes.

use super::Transport;
use crate::error::{ConnectionError, ProtocolError};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use nusb::transfer::{Direction, EndpointType, RequestBuffer};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

const USBTMC_CLASS: u8 = 0xFE;
const USBTMC_SUBCLASS: u8 = 0x03;

const HEADER_LEN: usize = 12;
const DEV_DEP_MSG_OUT: u8 = 1;
const REQUEST_DEV_DEP_MSG_IN: u8 = 2;
const DEV_DEP_MSG_IN: u8 = 2;
const EOM: u8 = 0x01;

/// Largest reply chunk requested per bulk-IN transfer.
const MAX_READ: u32 = 4096;
/// Bulk-IN buffer: payload plus header, rounded up to a multiple of 512.
const READ_BUFFER: usize = 4608;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct UsbTmc {
    /// `None` once closed.
    interface: Option<nusb::Interface>,
    bulk_in: u8,
    bulk_out: u8,
    tag: u8,
    timeout: Duration,
}

impl UsbTmc {
    /// Open the first device matching `vendor_id:product_id` and claim its
    /// USBTMC interface.
    pub fn open(vendor_id: u16, product_id: u16, timeout: Duration) -> Result<Self> {
        let info = nusb::list_devices()
            .context("failed to enumerate USB devices")?
            .find(|dev| dev.vendor_id() == vendor_id && dev.product_id() == product_id)
            .ok_or(ConnectionError::DeviceNotFound {
                vendor_id,
                product_id,
            })?;

        let device = info
            .open()
            .with_context(|| format!("failed to open USB device {vendor_id:04x}:{product_id:04x}"))?;

        let config = device
            .active_configuration()
            .context("failed to read active USB configuration")?;

        let alt = config
            .interface_alt_settings()
            .find(|alt| alt.class() == USBTMC_CLASS && alt.subclass() == USBTMC_SUBCLASS)
            .ok_or(ConnectionError::NoTmcInterface)?;

        let bulk_endpoint = |direction: Direction| {
            alt.endpoints()
                .find(|ep| ep.transfer_type() == EndpointType::Bulk && ep.direction() == direction)
                .map(|ep| ep.address())
        };
        let bulk_in = bulk_endpoint(Direction::In).ok_or(ConnectionError::MissingEndpoint("IN"))?;
        let bulk_out =
            bulk_endpoint(Direction::Out).ok_or(ConnectionError::MissingEndpoint("OUT"))?;
        let number = alt.interface_number();

        let interface = device
            .claim_interface(number)
            .with_context(|| format!("failed to claim USBTMC interface {number}"))?;

        info!(
            "opened USBTMC device {vendor_id:04x}:{product_id:04x} \
             (interface {number}, bulk in 0x{bulk_in:02x}, bulk out 0x{bulk_out:02x})"
        );

        Ok(Self {
            interface: Some(interface),
            bulk_in,
            bulk_out,
            tag: 0,
            timeout,
        })
    }

    fn next_tag(&mut self) -> u8 {
        self.tag = next_tag(self.tag);
        self.tag
    }

    fn interface(&self) -> Result<&nusb::Interface> {
        self.interface
            .as_ref()
            .ok_or_else(|| anyhow!("USBTMC device is closed"))
    }

    async fn bulk_out(&mut self, message: Vec<u8>) -> Result<()> {
        let transfer = self.interface()?.bulk_out(self.bulk_out, message);
        let completion = timeout(self.timeout, transfer)
            .await
            .context("USBTMC bulk-out timed out")?;
        completion.into_result().context("USBTMC bulk-out failed")?;
        Ok(())
    }

    async fn bulk_in(&mut self) -> Result<Vec<u8>> {
        let transfer = self
            .interface()?
            .bulk_in(self.bulk_in, RequestBuffer::new(READ_BUFFER));
        let completion = timeout(self.timeout, transfer)
            .await
            .context("USBTMC bulk-in timed out")?;
        Ok(completion.into_result().context("USBTMC bulk-in failed")?)
    }
}

#[async_trait]
impl Transport for UsbTmc {
    async fn write(&mut self, command: &str) -> Result<()> {
        let tag = self.next_tag();
        let mut line = command.as_bytes().to_vec();
        line.push(b'\n');
        self.bulk_out(encode_message_out(tag, &line)).await
    }

    async fn read(&mut self) -> Result<String> {
        let mut payload = Vec::new();
        loop {
            let tag = self.next_tag();
            self.bulk_out(encode_request_in(tag, MAX_READ)).await?;
            let packet = self.bulk_in().await?;
            let (chunk, end) = decode_message_in(tag, &packet)?;
            payload.extend_from_slice(chunk);
            if end {
                break;
            }
        }
        let raw = String::from_utf8(payload).context("device reply is not valid UTF-8")?;
        let reply = raw.trim_matches(char::from(0)).trim().to_string();
        debug!("USBTMC read <- {reply:?}");
        Ok(reply)
    }

    async fn close(&mut self) -> Result<()> {
        match self.interface.take() {
            Some(interface) => {
                info!("closing USBTMC device");
                drop(interface);
                Ok(())
            }
            None => Err(anyhow!("USBTMC device already closed")),
        }
    }
}

/// bTag runs 1..=255 and never takes the value 0.
fn next_tag(tag: u8) -> u8 {
    if tag == u8::MAX { 1 } else { tag + 1 }
}

fn header(msg_id: u8, tag: u8, transfer_size: u32, attributes: u8) -> [u8; HEADER_LEN] {
    let size = transfer_size.to_le_bytes();
    [
        msg_id, tag, !tag, 0x00, size[0], size[1], size[2], size[3], attributes, 0x00, 0x00, 0x00,
    ]
}

/// A complete DEV_DEP_MSG_OUT transfer, padded to a 4-byte boundary.
fn encode_message_out(tag: u8, data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_LEN + data.len() + 3);
    message.extend_from_slice(&header(DEV_DEP_MSG_OUT, tag, data.len() as u32, EOM));
    message.extend_from_slice(data);
    while message.len() % 4 != 0 {
        message.push(0);
    }
    message
}

fn encode_request_in(tag: u8, max_len: u32) -> Vec<u8> {
    header(REQUEST_DEV_DEP_MSG_IN, tag, max_len, 0x00).to_vec()
}

/// Split a DEV_DEP_MSG_IN transfer into its payload and EOM flag.
fn decode_message_in(tag: u8, packet: &[u8]) -> Result<(&[u8], bool), ProtocolError> {
    if packet.len() < HEADER_LEN {
        return Err(ProtocolError::Framing(format!(
            "short bulk-in transfer ({} bytes)",
            packet.len()
        )));
    }
    if packet[0] != DEV_DEP_MSG_IN {
        return Err(ProtocolError::Framing(format!(
            "unexpected MsgID {}",
            packet[0]
        )));
    }
    if packet[1] != tag || packet[2] != !tag {
        return Err(ProtocolError::Framing(format!(
            "bTag mismatch: sent {tag}, got {}",
            packet[1]
        )));
    }
    let size = u32::from_le_bytes([packet[4], packet[5], packet[6], packet[7]]) as usize;
    let available = packet.len() - HEADER_LEN;
    if size > available {
        return Err(ProtocolError::Framing(format!(
            "header announces {size} bytes but only {available} arrived"
        )));
    }
    let end = packet[8] & EOM != 0;
    Ok((&packet[HEADER_LEN..HEADER_LEN + size], end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_skips_zero_on_wrap() {
        assert_eq!(next_tag(0), 1);
        assert_eq!(next_tag(41), 42);
        assert_eq!(next_tag(255), 1);
    }

    #[test]
    fn message_out_has_header_and_padding() {
        let message = encode_message_out(7, b"*IDN?\n");
        assert_eq!(&message[..4], &[DEV_DEP_MSG_OUT, 7, !7u8, 0]);
        assert_eq!(&message[4..8], &6u32.to_le_bytes());
        assert_eq!(message[8], EOM);
        assert_eq!(&message[12..18], b"*IDN?\n");
        assert_eq!(message.len(), 20);
        assert!(message[18..].iter().all(|&b| b == 0));
    }

    #[test]
    fn aligned_message_is_not_padded() {
        let message = encode_message_out(1, b"VOLT");
        assert_eq!(message.len(), HEADER_LEN + 4);
    }

    #[test]
    fn request_in_announces_max_length() {
        let request = encode_request_in(3, MAX_READ);
        assert_eq!(request.len(), HEADER_LEN);
        assert_eq!(request[0], REQUEST_DEV_DEP_MSG_IN);
        assert_eq!(&request[4..8], &MAX_READ.to_le_bytes());
        assert_eq!(request[8], 0);
    }

    #[test]
    fn decode_reads_payload_and_eom() {
        let mut packet = header(DEV_DEP_MSG_IN, 9, 4, EOM).to_vec();
        packet.extend_from_slice(b"1\n\0\0extra");
        let (payload, end) = decode_message_in(9, &packet).unwrap();
        assert_eq!(payload, b"1\n\0\0");
        assert!(end);
    }

    #[test]
    fn decode_rejects_bad_frames() {
        assert!(decode_message_in(1, &[2, 1, 254]).is_err());

        let wrong_tag = header(DEV_DEP_MSG_IN, 5, 0, EOM);
        assert!(matches!(
            decode_message_in(6, &wrong_tag),
            Err(ProtocolError::Framing(_))
        ));

        let truncated = header(DEV_DEP_MSG_IN, 1, 10, EOM);
        assert!(decode_message_in(1, &truncated).is_err());
    }
}
